use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParserError {
    #[error("{parser} header is missing required fields: {}", missing.join(", "))]
    SchemaMismatch {
        parser: &'static str,
        missing: Vec<String>,
    },

    #[error("{parser} log ended before header line {line_index}")]
    MissingHeader {
        parser: &'static str,
        line_index: usize,
    },

    #[error("{parser} schema is invalid: {message}")]
    InvalidSchema {
        parser: &'static str,
        message: String,
    },

    #[error("{parser} CSV error: {source}")]
    Csv {
        parser: &'static str,
        #[source]
        source: csv::Error,
    },

    #[error("{parser} validation error: {message}")]
    Validation {
        parser: &'static str,
        message: String,
    },
}

impl ParserError {
    /// Field names a `SchemaMismatch` reported as absent from the header.
    pub fn missing_fields(&self) -> &[String] {
        match self {
            ParserError::SchemaMismatch { missing, .. } => missing,
            _ => &[],
        }
    }
}
