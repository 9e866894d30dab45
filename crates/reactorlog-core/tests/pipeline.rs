use std::fs;
use std::path::PathBuf;

use polars::prelude::*;
use reactorlog_core::{
    process_run, AlignmentScope, ProcessingConfig, ReactorError, RunInputs, RunOutcome, RunResult,
    SkipReason, SkippedOutput, STAGE_COLUMN,
};

fn parser_fixture(name: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../reactorlog-parser/tests/data")
        .join(name);
    fs::read_to_string(&path)
        .unwrap_or_else(|err| panic!("failed to read fixture {}: {}", path.display(), err))
}

const LV_HEADER: &str = "DateTime\tRelativeTime\tH2 Actual Flow\tN2 Actual Flow\tT Heater 1\tPressure setpoint\tN2 poisoning set-point";

/// Rows are `(time, relative_time, temperature)` on 2 May 2025.
fn lv_log(rows: &[(&str, f64, f64)]) -> String {
    let mut content = format!("meta\nmeta\n{LV_HEADER}\nunits\n");
    for (time, relative, temp) in rows {
        content.push_str(&format!("02/05/25 {time}\t{relative}\t30\t10\t{temp}\t10\t0\n"));
    }
    content
}

/// Rows are `(time, nh3)` on 2 May 2025.
fn gc_log(rows: &[(&str, f64)]) -> String {
    let mut content = String::from("Date\tH2\tNH3\n");
    for (time, nh3) in rows {
        content.push_str(&format!("02.05.2025 {time}\t70\t{nh3}\n"));
    }
    content
}

fn run(lv: &str, gc: &str) -> Result<RunOutcome, ReactorError> {
    process_run(
        RunInputs {
            lv_name: "lv.txt",
            lv_content: lv,
            gc_name: "gc.txt",
            gc_content: gc,
        },
        &ProcessingConfig::default(),
    )
}

fn completed(outcome: RunOutcome) -> RunResult {
    match outcome {
        RunOutcome::Completed(result) => *result,
        RunOutcome::Empty { file, .. } => panic!("unexpected empty outcome for {file}"),
    }
}

fn f64_column(df: &DataFrame, name: &str) -> Vec<Option<f64>> {
    df.column(name)
        .unwrap_or_else(|_| panic!("column {name}"))
        .f64()
        .expect("float column")
        .into_iter()
        .collect()
}

#[test]
fn relative_time_resets_split_stages() {
    let lv = lv_log(&[
        ("10:00:00", 0.0, 300.0),
        ("10:01:00", 1.0, 301.0),
        ("10:02:00", 2.0, 302.0),
        ("10:03:00", 0.0, 400.0),
        ("10:04:00", 1.0, 401.0),
    ]);
    let result = completed(run(&lv, &gc_log(&[("10:00:30", 1.0)])).expect("run"));

    assert_eq!(result.stage_count(), 2);
    assert_eq!(result.segmented.labels(), &[1, 1, 1, 2, 2]);
    let stages: Vec<Option<u32>> = result
        .segmented
        .df()
        .column(STAGE_COLUMN)
        .expect("Stage column")
        .u32()
        .expect("u32 stages")
        .into_iter()
        .collect();
    assert_eq!(stages, vec![Some(1), Some(1), Some(1), Some(2), Some(2)]);

    assert_eq!(result.stages.len(), 2);
    assert_eq!(result.stages[0].stage, 1);
    assert_eq!(result.stages[0].aligned.height(), 3);
    assert_eq!(result.stages[1].aligned.height(), 2);
    assert_eq!(
        f64_column(result.stages[1].aligned.df(), "T Heater 1"),
        vec![Some(400.0), Some(401.0)]
    );
}

#[test]
fn nearest_reading_inside_tolerance_wins() {
    let lv = lv_log(&[("10:00:00", 0.0, 300.0)]);
    let gc = gc_log(&[("09:56:00", 1.0), ("10:06:00", 2.0)]);
    let result = completed(run(&lv, &gc).expect("run"));

    assert_eq!(f64_column(result.overall.df(), "NH3"), vec![Some(1.0)]);
    assert_eq!(result.overall.matches(), &[Some(0)]);
    assert_eq!(result.stages[0].aligned.matches(), &[Some(0)]);
}

#[test]
fn readings_outside_tolerance_leave_gc_fields_empty() {
    let lv = lv_log(&[("10:00:00", 0.0, 300.0), ("10:30:00", 60.0, 310.0)]);
    let gc = gc_log(&[("09:54:00", 1.0), ("10:35:00", 2.0)]);
    let result = completed(run(&lv, &gc).expect("run"));

    assert_eq!(f64_column(result.overall.df(), "NH3"), vec![None, Some(2.0)]);
    assert_eq!(f64_column(result.overall.df(), "H2"), vec![None, Some(70.0)]);
}

#[test]
fn empty_gc_log_keeps_every_lv_row() {
    let lv = lv_log(&[
        ("10:00:00", 0.0, 300.0),
        ("10:05:00", 5.0, 301.0),
        ("10:10:00", 0.0, 302.0),
    ]);
    let result = completed(run(&lv, "Date\tH2\tNH3\n").expect("run"));

    assert_eq!(result.overall.height(), 3);
    assert_eq!(f64_column(result.overall.df(), "NH3"), vec![None, None, None]);
    assert_eq!(result.overall.matched_rows(), 0);
    assert_eq!(result.stages.len(), 2);
    assert!(result.skipped.contains(&SkippedOutput {
        scope: AlignmentScope::Overall,
        reason: SkipReason::NoGcMatches,
    }));
    assert!(result.skipped.contains(&SkippedOutput {
        scope: AlignmentScope::Stage(2),
        reason: SkipReason::NoGcMatches,
    }));
}

#[test]
fn gc_without_nh3_column_fails_naming_the_field() {
    let lv = lv_log(&[("10:00:00", 0.0, 300.0)]);
    let err = run(&lv, "Date\tH2\n02.05.2025 10:00:00\t70\n").expect_err("must fail");

    match &err {
        ReactorError::Parse { file, .. } => assert_eq!(file, "gc.txt"),
        other => panic!("unexpected error {other}"),
    }
    assert_eq!(err.missing_fields(), ["NH3".to_string()]);
}

#[test]
fn lv_without_usable_rows_is_an_empty_outcome() {
    let lv = lv_log(&[]);
    match run(&lv, &gc_log(&[("10:00:00", 1.0)])).expect("run") {
        RunOutcome::Empty { file, report } => {
            assert_eq!(file, "lv.txt");
            assert_eq!(report.rows_kept, 0);
        }
        RunOutcome::Completed(_) => panic!("expected an empty outcome"),
    }
}

#[test]
fn shared_column_names_get_side_suffixes() {
    let lv = "m\nm\nDateTime\tRelativeTime\tH2 Actual Flow\tN2 Actual Flow\tT Heater 1\tPressure setpoint\tN2 poisoning set-point\tComment\nu\n\
              02/05/25 10:00:00\t0\t30\t10\t300\t10\t0\tlv note\n";
    let gc = "Date\tComment\tNH3\n02.05.2025 10:01:00\tgc note\t1.5\n";
    let result = completed(run(lv, gc).expect("run"));
    let df = result.overall.df();

    assert!(df.column("Comment").is_err());
    let lv_note = df.column("Comment_LV").expect("left comment");
    let gc_note = df.column("Comment_GC").expect("right comment");
    assert_eq!(lv_note.str().expect("text").get(0), Some("lv note"));
    assert_eq!(gc_note.str().expect("text").get(0), Some("gc note"));
    assert_eq!(df.column("Date").expect("Date").len(), 1);
}

#[test]
fn processes_the_sample_logs() {
    let result = completed(
        run(
            &parser_fixture("LV_run42.txt"),
            &parser_fixture("GC_run42.txt"),
        )
        .expect("run"),
    );

    assert_eq!(result.lv_report.rows_kept, 5);
    assert_eq!(result.gc_report.rows_kept, 4);
    assert_eq!(result.stage_count(), 2);
    assert_eq!(result.overall.height(), 5);
    assert_eq!(
        result.overall.matches(),
        &[Some(0), Some(1), Some(1), Some(2), Some(3)]
    );
    assert_eq!(
        f64_column(result.overall.df(), "NH3"),
        vec![Some(1.3), None, None, Some(1.5), Some(1.6)]
    );

    let columns = result.overall.df().get_column_names_str();
    assert_eq!(columns.first().copied(), Some("RelativeTime"));
    assert!(columns.contains(&"Date"));
    assert!(columns.contains(&"Sample"));
    assert_eq!(result.stages[0].aligned.height(), 3);
    assert_eq!(result.stages[1].aligned.height(), 2);
    assert!(result.skipped.is_empty());
}
