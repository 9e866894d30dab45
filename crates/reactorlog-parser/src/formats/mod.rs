pub(crate) mod common;
mod gc_log;
mod lv_log;
pub mod schema;

pub use gc_log::GcLogParser;
pub use lv_log::LvLogParser;

pub(crate) use common::{read_table, TableSpec};
