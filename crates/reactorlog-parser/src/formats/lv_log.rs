use crate::errors::ParserError;
use crate::log_parser::LogParser;
use crate::model::{LvTable, ParsedLog};

use super::schema::LvSchema;
use super::{read_table, TableSpec};

/// Parser for the reactor controller export: metadata lines, a header line, a units line,
/// then delimited data rows.
pub struct LvLogParser<'a> {
    schema: &'a LvSchema,
}

impl<'a> LvLogParser<'a> {
    const NAME: &'static str = "LV";

    pub fn new(schema: &'a LvSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &LvSchema {
        self.schema
    }
}

impl LogParser for LvLogParser<'_> {
    type Table = LvTable;

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn parse(&self, content: &str) -> Result<ParsedLog<LvTable>, ParserError> {
        let schema = self.schema;
        let delimiter = schema.validate(Self::NAME)?;
        let spec = TableSpec {
            parser: Self::NAME,
            delimiter,
            metadata_lines: schema.metadata_lines,
            units_lines: schema.units_lines,
            timestamp_column: &schema.timestamp_column,
            timestamp_format: &schema.timestamp_format,
            timestamp_output: &schema.timestamp_output,
            numeric_fields: &schema.numeric_fields,
            header_required: schema.required_fields(),
            row_required: schema.required_fields(),
        };

        let (df, report) = read_table(&spec, content)?;
        Ok(ParsedLog {
            table: LvTable::new(df, &schema.timestamp_output, &schema.relative_time_field),
            report,
        })
    }
}
