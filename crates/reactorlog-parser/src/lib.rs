pub mod errors;
pub mod formats;
pub mod model;
mod log_parser;

pub use errors::ParserError;
pub use formats::schema::{GcSchema, LvSchema, DEFAULT_TIMESTAMP_COLUMN};
pub use formats::{GcLogParser, LvLogParser};
pub use log_parser::{parse_gc_log, parse_lv_log, LogParser};
pub use model::{GcTable, LvTable, ParseReport, ParsedLog};
