use polars::prelude::DataFrame;
use serde::Serialize;
use tracing::{debug, info, warn};

use reactorlog_parser::{parse_gc_log, parse_lv_log, GcTable, ParseReport};

use crate::alignment::{align, AlignedTable};
use crate::config::ProcessingConfig;
use crate::error::{AlignmentScope, ReactorError, Result};
use crate::merge_policy::MergePolicy;
use crate::segmentation::{segment, SegmentedLog};

/// Named raw contents of one controller log and one chromatograph log.
#[derive(Debug, Clone, Copy)]
pub struct RunInputs<'a> {
    pub lv_name: &'a str,
    pub lv_content: &'a str,
    pub gc_name: &'a str,
    pub gc_content: &'a str,
}

#[derive(Debug)]
pub enum RunOutcome {
    /// The controller log had no usable rows; nothing was segmented or aligned.
    Empty { file: String, report: ParseReport },
    Completed(Box<RunResult>),
}

#[derive(Debug, Clone)]
pub struct RunResult {
    pub lv_report: ParseReport,
    pub gc_report: ParseReport,
    pub segmented: SegmentedLog,
    pub gc: GcTable,
    pub overall: AlignedTable,
    pub stages: Vec<StageAlignment>,
    pub skipped: Vec<SkippedOutput>,
}

impl RunResult {
    pub fn stage_count(&self) -> u32 {
        self.segmented.stage_count()
    }
}

#[derive(Debug, Clone)]
pub struct StageAlignment {
    pub stage: u32,
    pub aligned: AlignedTable,
}

/// An output the run could not fill in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedOutput {
    pub scope: AlignmentScope,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The stage slice held no controller rows.
    NoLvRows,
    /// No chromatograph reading fell within tolerance of any row; GC columns are all null.
    NoGcMatches,
}

/// Parses both logs, segments the controller log and aligns it against the chromatograph
/// log once overall and once per stage.
pub fn process_run(inputs: RunInputs<'_>, config: &ProcessingConfig) -> Result<RunOutcome> {
    let lv = parse_lv_log(inputs.lv_content, &config.lv).map_err(|source| ReactorError::Parse {
        file: inputs.lv_name.to_string(),
        source,
    })?;
    info!(
        file = inputs.lv_name,
        rows_read = lv.report.rows_read,
        rows_kept = lv.report.rows_kept,
        dropped_invalid_timestamp = lv.report.dropped_invalid_timestamp,
        dropped_missing_numeric = lv.report.dropped_missing_numeric,
        "parsed LV log"
    );
    if lv.is_empty() {
        warn!(file = inputs.lv_name, "LV log has no usable rows");
        return Ok(RunOutcome::Empty {
            file: inputs.lv_name.to_string(),
            report: lv.report,
        });
    }

    let gc = parse_gc_log(inputs.gc_content, &config.gc).map_err(|source| ReactorError::Parse {
        file: inputs.gc_name.to_string(),
        source,
    })?;
    info!(
        file = inputs.gc_name,
        rows_read = gc.report.rows_read,
        rows_kept = gc.report.rows_kept,
        dropped_invalid_timestamp = gc.report.dropped_invalid_timestamp,
        "parsed GC log"
    );
    if gc.is_empty() {
        warn!(
            file = inputs.gc_name,
            "GC log has no usable rows; GC columns will be empty"
        );
    }

    let segmented = segment(&lv.table)?;
    info!(stages = segmented.stage_count(), rows = segmented.height(), "segmented LV log");

    let policy = MergePolicy::from(&config.alignment);
    let tolerance = config.alignment.tolerance();
    let gc_table = gc.table;
    let mut skipped = Vec::new();

    let align_scope = |left: &DataFrame, scope: AlignmentScope| {
        align(
            left,
            segmented.timestamp_column(),
            gc_table.df(),
            gc_table.timestamp_column(),
            tolerance,
            &policy,
        )
        .map_err(|source| ReactorError::Alignment { scope, source })
    };

    let overall = align_scope(segmented.df(), AlignmentScope::Overall)?;
    debug!(
        rows = overall.height(),
        matched = overall.matched_rows(),
        "overall alignment"
    );
    if overall.matched_rows() == 0 {
        skipped.push(SkippedOutput {
            scope: AlignmentScope::Overall,
            reason: SkipReason::NoGcMatches,
        });
    }

    let mut stages = Vec::with_capacity(segmented.stage_count() as usize);
    for (stage, frame) in segmented.stages() {
        let scope = AlignmentScope::Stage(stage);
        if frame.height() == 0 {
            skipped.push(SkippedOutput {
                scope,
                reason: SkipReason::NoLvRows,
            });
            continue;
        }
        let aligned = align_scope(&frame, scope)?;
        debug!(
            stage,
            rows = aligned.height(),
            matched = aligned.matched_rows(),
            "stage alignment"
        );
        if aligned.matched_rows() == 0 {
            skipped.push(SkippedOutput {
                scope,
                reason: SkipReason::NoGcMatches,
            });
        }
        stages.push(StageAlignment { stage, aligned });
    }

    Ok(RunOutcome::Completed(Box::new(RunResult {
        lv_report: lv.report,
        gc_report: gc.report,
        segmented,
        gc: gc_table,
        overall,
        stages,
        skipped,
    })))
}
