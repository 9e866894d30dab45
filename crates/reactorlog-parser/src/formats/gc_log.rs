use crate::errors::ParserError;
use crate::log_parser::LogParser;
use crate::model::{GcTable, ParsedLog};

use super::schema::GcSchema;
use super::{read_table, TableSpec};

/// Parser for the gas chromatograph export: a header line followed by delimited rows.
/// Rows survive missing numeric values; only the timestamp must parse.
pub struct GcLogParser<'a> {
    schema: &'a GcSchema,
}

impl<'a> GcLogParser<'a> {
    const NAME: &'static str = "GC";

    pub fn new(schema: &'a GcSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &GcSchema {
        self.schema
    }
}

impl LogParser for GcLogParser<'_> {
    type Table = GcTable;

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn parse(&self, content: &str) -> Result<ParsedLog<GcTable>, ParserError> {
        let schema = self.schema;
        let delimiter = schema.validate(Self::NAME)?;
        let spec = TableSpec {
            parser: Self::NAME,
            delimiter,
            metadata_lines: 0,
            units_lines: 0,
            timestamp_column: &schema.timestamp_column,
            timestamp_format: &schema.timestamp_format,
            timestamp_output: &schema.timestamp_output,
            numeric_fields: &schema.numeric_fields,
            header_required: &schema.required_fields,
            row_required: &[],
        };

        let (df, report) = read_table(&spec, content)?;
        Ok(ParsedLog {
            table: GcTable::new(df, &schema.timestamp_output),
            report,
        })
    }
}
