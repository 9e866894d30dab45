use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use comfy_table::{presets::UTF8_FULL, Table};
use reactorlog_core::report_store::{ComparisonPlot, ContentEntry, FileContent, COMPARISON_DIR};
use reactorlog_core::{process_run, ParseReport, ProcessingConfig, ReportStore, RunInputs, RunOutcome};
use tracing::{info, warn};

#[derive(Args, Debug)]
pub struct ProcessArgs {
    /// Reactor controller (LV) log
    #[arg(long)]
    pub lv: PathBuf,
    /// Gas chromatograph (GC) log
    #[arg(long)]
    pub gc: PathBuf,
    /// Text put in front of the report folder's timestamp
    #[arg(long)]
    pub prefix: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum ReportsCommand {
    /// List reports, newest first
    List,
    /// Show the files of one report and its stage comparisons
    Show { name: String },
    Rename { name: String, new_name: String },
    Delete { name: String },
    /// Print the folder tree of a report with file sizes
    Tree { name: String },
    /// Print a text file stored inside a report
    Cat { name: String, path: String },
    /// Remove one file from a report
    RemoveFile { name: String, path: String },
}

#[derive(Args, Debug)]
pub struct CompareArgs {
    #[arg(long)]
    pub report: String,
    #[arg(long, value_delimiter = ',', required = true)]
    pub stages: Vec<u32>,
    #[arg(long)]
    pub prefix: Option<String>,
}

#[derive(Args, Debug)]
pub struct CombineArgs {
    #[arg(long)]
    pub report: String,
    #[arg(long, value_delimiter = ',', required = true)]
    pub stages: Vec<u32>,
    /// Destination CSV; printed to stdout when omitted
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct CrossCompareArgs {
    /// Stored comparison as `<report>/<file name>`; repeatable
    #[arg(long = "plot", value_parser = parse_plot_ref)]
    pub plots: Vec<ComparisonPlot>,
    /// Report whose stages are added as current traces
    #[arg(long, requires = "stages")]
    pub report: Option<String>,
    #[arg(long, value_delimiter = ',', requires = "report")]
    pub stages: Vec<u32>,
}

/// `run_a/stages_comparison_plot_20250502101500.json` or the same with the
/// `comparison_plots/` folder spelled out.
fn parse_plot_ref(raw: &str) -> Result<ComparisonPlot, String> {
    let (report, rest) = raw
        .split_once('/')
        .ok_or_else(|| format!("expected <report>/<file>, got '{raw}'"))?;
    let name = rest
        .strip_prefix(COMPARISON_DIR)
        .and_then(|r| r.strip_prefix('/'))
        .unwrap_or(rest);
    if report.is_empty() || name.is_empty() || name.contains('/') {
        return Err(format!("expected <report>/<file>, got '{raw}'"));
    }
    Ok(ComparisonPlot {
        report: report.to_string(),
        name: name.to_string(),
        path: format!("{COMPARISON_DIR}/{name}"),
    })
}

fn table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table
}

fn parse_report_row(table: &mut Table, label: &str, report: &ParseReport) {
    table.add_row(vec![
        label.to_string(),
        report.rows_read.to_string(),
        report.rows_kept.to_string(),
        report.dropped_invalid_timestamp.to_string(),
        report.dropped_missing_numeric.to_string(),
        report.dropped_malformed.to_string(),
    ]);
}

pub fn process(store: &ReportStore, config: &ProcessingConfig, args: ProcessArgs) -> Result<()> {
    let lv_content = fs::read_to_string(&args.lv)
        .with_context(|| format!("failed to read {}", args.lv.display()))?;
    let gc_content = fs::read_to_string(&args.gc)
        .with_context(|| format!("failed to read {}", args.gc.display()))?;
    let lv_name = args.lv.display().to_string();
    let gc_name = args.gc.display().to_string();

    let outcome = process_run(
        RunInputs {
            lv_name: &lv_name,
            lv_content: &lv_content,
            gc_name: &gc_name,
            gc_content: &gc_content,
        },
        config,
    )?;
    let run = match outcome {
        RunOutcome::Completed(run) => run,
        RunOutcome::Empty { file, report } => {
            bail!(
                "{file} has no usable rows ({} read, {} kept)",
                report.rows_read,
                report.rows_kept
            );
        }
    };

    let manifest = store.write_run(&run, config, args.prefix.as_deref())?;

    let mut summary = table();
    summary.set_header(vec!["log", "read", "kept", "bad timestamp", "missing value", "malformed"]);
    parse_report_row(&mut summary, "LV", &run.lv_report);
    parse_report_row(&mut summary, "GC", &run.gc_report);
    println!("{summary}");

    let mut stages = table();
    stages.set_header(vec!["stage", "rows", "matched GC rows"]);
    for stage in &run.stages {
        stages.add_row(vec![
            stage.stage.to_string(),
            stage.aligned.height().to_string(),
            stage.aligned.matched_rows().to_string(),
        ]);
    }
    println!("{stages}");

    for skipped in &run.skipped {
        warn!(scope = %skipped.scope, reason = ?skipped.reason, "output left empty");
    }
    println!("Report written to {}", store.root().join(&manifest.report).display());
    Ok(())
}

pub fn reports(store: &ReportStore, command: ReportsCommand) -> Result<()> {
    match command {
        ReportsCommand::List => {
            let reports = store.list_reports()?;
            if reports.is_empty() {
                println!("No reports in {}", store.root().display());
                return Ok(());
            }
            let mut listing = table();
            listing.set_header(vec!["report", "stages"]);
            for name in reports {
                let stages = match store.load_report(&name) {
                    Ok(manifest) => manifest.stage_count.to_string(),
                    Err(err) => {
                        warn!(report = %name, error = %err, "unreadable report");
                        "-".to_string()
                    }
                };
                listing.add_row(vec![name, stages]);
            }
            println!("{listing}");
        }
        ReportsCommand::Show { name } => {
            let manifest = store.load_report(&name)?;
            let mut files = table();
            files.set_header(vec!["step", "plot", "csv", "json"]);
            let cell = |path: &Option<String>| path.clone().unwrap_or_else(|| "-".to_string());
            files.add_row(vec![
                "overall".to_string(),
                cell(&manifest.overall_plot),
                cell(&manifest.overall_csv),
                "-".to_string(),
            ]);
            for step in &manifest.steps {
                files.add_row(vec![
                    step.step.to_string(),
                    cell(&step.plot),
                    cell(&step.csv),
                    cell(&step.json),
                ]);
            }
            println!("{files}");
            for plot in store.list_comparison_plots(&name)? {
                println!("comparison: {}", plot.path);
            }
        }
        ReportsCommand::Rename { name, new_name } => {
            let renamed = store.rename_report(&name, &new_name)?;
            println!("Report renamed from {name} to {renamed}");
        }
        ReportsCommand::Delete { name } => {
            store.delete_report(&name)?;
            println!("Report {name} deleted");
        }
        ReportsCommand::Tree { name } => {
            let mut tree = table();
            tree.set_header(vec!["path", "size"]);
            fn add_rows(tree: &mut Table, entries: &[ContentEntry]) {
                for entry in entries {
                    match entry {
                        ContentEntry::Folder { path, children, .. } => {
                            tree.add_row(vec![format!("{path}/"), String::new()]);
                            add_rows(tree, children);
                        }
                        ContentEntry::File {
                            path, size_display, ..
                        } => {
                            tree.add_row(vec![path.clone(), size_display.clone()]);
                        }
                    }
                }
            }
            add_rows(&mut tree, &store.report_contents(&name)?);
            println!("{tree}");
        }
        ReportsCommand::Cat { name, path } => match store.read_report_file(&name, &path)? {
            FileContent::Text { content } => print!("{content}"),
            FileContent::Binary { size } => {
                bail!("{path} is a binary file ({size} bytes)")
            }
        },
        ReportsCommand::RemoveFile { name, path } => {
            store.delete_report_file(&name, &path)?;
            println!("Deleted {path} from {name}");
        }
    }
    Ok(())
}

pub fn compare(store: &ReportStore, config: &ProcessingConfig, args: CompareArgs) -> Result<()> {
    let plot = store.compare_stages(&args.report, &args.stages, args.prefix.as_deref(), config)?;
    println!("Comparison written to {}/{}", args.report, plot.path);
    Ok(())
}

pub fn combine(store: &ReportStore, config: &ProcessingConfig, args: CombineArgs) -> Result<()> {
    let csv = store.combine_stages(&args.report, &args.stages, &config.lv.timestamp_output)?;
    match args.out {
        Some(path) => {
            fs::write(&path, csv).with_context(|| format!("failed to write {}", path.display()))?;
            info!(path = %path.display(), "wrote combined stages");
        }
        None => print!("{csv}"),
    }
    Ok(())
}

pub fn cross_compare(
    store: &ReportStore,
    config: &ProcessingConfig,
    args: CrossCompareArgs,
) -> Result<()> {
    let current = args
        .report
        .as_deref()
        .map(|report| (report, args.stages.as_slice()));
    let cross = store.cross_compare(&args.plots, current, config)?;
    println!(
        "Cross comparison with {} traces written to {}",
        cross.figure.data.len(),
        cross.path
    );
    Ok(())
}
