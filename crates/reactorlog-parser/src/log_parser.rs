use crate::errors::ParserError;
use crate::formats::schema::{GcSchema, LvSchema};
use crate::formats::{GcLogParser, LvLogParser};
use crate::model::{GcTable, LvTable, ParsedLog};

pub trait LogParser {
    type Table;

    fn name(&self) -> &'static str;
    fn parse(&self, content: &str) -> Result<ParsedLog<Self::Table>, ParserError>;
}

pub fn parse_lv_log(content: &str, schema: &LvSchema) -> Result<ParsedLog<LvTable>, ParserError> {
    LvLogParser::new(schema).parse(content)
}

pub fn parse_gc_log(content: &str, schema: &GcSchema) -> Result<ParsedLog<GcTable>, ParserError> {
    GcLogParser::new(schema).parse(content)
}
