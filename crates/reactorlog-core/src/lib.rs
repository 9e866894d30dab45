pub mod alignment;
pub mod config;
pub mod error;
pub mod export;
pub mod merge_policy;
pub mod pipeline;
pub mod plots;
pub mod report_store;
pub mod segmentation;

pub use alignment::{align, nearest_matches, AlignError, AlignedTable};
pub use config::{AlignmentConfig, ChannelConfig, ProcessingConfig};
pub use error::{AlignmentScope, ReactorError, Result};
pub use merge_policy::{MergePolicy, RenameMap};
pub use pipeline::{process_run, RunInputs, RunOutcome, RunResult, SkipReason, SkippedOutput, StageAlignment};
pub use report_store::ReportStore;
pub use segmentation::{segment, stage_labels, SegmentationError, SegmentedLog, STAGE_COLUMN};

pub use reactorlog_parser::{GcSchema, GcTable, LvSchema, LvTable, ParseReport, ParserError};
