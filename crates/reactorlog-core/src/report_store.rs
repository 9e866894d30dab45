use std::cmp::Reverse;
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Component, Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::ProcessingConfig;
use crate::error::{ReactorError, Result};
use crate::export::{read_json_records, write_csv, write_json_records, write_records_csv, Record};
use crate::pipeline::RunResult;
use crate::plots::{
    cross_comparison_plot, overall_plot, stage_comparison_plot, stage_plot, CurrentStages, Figure,
    SourcePlot, StageRecords,
};

pub const OVERALL_CSV: &str = "overall_merged_data.csv";
pub const OVERALL_PLOT: &str = "overall_plot.json";
pub const COMPARISON_DIR: &str = "comparison_plots";
pub const CROSS_COMPARISON_DIR: &str = "cross_comparisons";
pub const COMPARISON_MARKER: &str = "stages_comparison_plot_";

const FOLDER_STAMP: &str = "%Y%m%d_%H%M%S";
const FOLDER_STAMP_LEN: usize = 15;
const PLOT_STAMP: &str = "%Y%m%d%H%M%S";
const BINARY_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "pdf"];

/// Files written for one run, as paths relative to the report folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportManifest {
    pub report: String,
    pub overall_plot: Option<String>,
    pub overall_csv: Option<String>,
    pub steps: Vec<StepFiles>,
    pub stage_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFiles {
    pub step: u32,
    pub plot: Option<String>,
    pub csv: Option<String>,
    pub json: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentEntry {
    Folder {
        name: String,
        path: String,
        children: Vec<ContentEntry>,
    },
    File {
        name: String,
        path: String,
        size: u64,
        size_display: String,
    },
}

impl ContentEntry {
    pub fn name(&self) -> &str {
        match self {
            ContentEntry::Folder { name, .. } | ContentEntry::File { name, .. } => name,
        }
    }

    fn is_folder(&self) -> bool {
        matches!(self, ContentEntry::Folder { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FileContent {
    Text { content: String },
    Binary { size: u64 },
}

/// A stage comparison figure stored inside a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonPlot {
    pub report: String,
    pub name: String,
    /// Relative to the report folder.
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrossComparison {
    /// Relative to the store root.
    pub path: String,
    pub figure: Figure,
}

/// Reads and writes report folders under one root directory.
#[derive(Debug, Clone)]
pub struct ReportStore {
    root: PathBuf,
    clock: fn() -> NaiveDateTime,
}

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

impl ReportStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            clock: local_now,
        }
    }

    pub fn with_clock(mut self, clock: fn() -> NaiveDateTime) -> Self {
        self.clock = clock;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn report_dir(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || sanitize_name(name) != name || name == CROSS_COMPARISON_DIR {
            return Err(ReactorError::InvalidReportPath(name.to_string()));
        }
        Ok(self.root.join(name))
    }

    fn existing_report_dir(&self, name: &str) -> Result<PathBuf> {
        let dir = self.report_dir(name)?;
        if !dir.is_dir() {
            return Err(ReactorError::ReportNotFound(name.to_string()));
        }
        Ok(dir)
    }

    /// Creates the folder for a new report. Fails with `ReportExists` if the name is taken.
    fn claim_report_dir(&self, name: &str) -> Result<PathBuf> {
        let dir = self.report_dir(name)?;
        fs::create_dir_all(&self.root)?;
        match fs::create_dir(&dir) {
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(ReactorError::ReportExists(name.to_string()))
            }
            other => {
                other?;
                Ok(dir)
            }
        }
    }

    /// Writes the overall and per-stage outputs of a run into a new
    /// `[prefix_]YYYYMMDD_HHMMSS` folder and returns its manifest.
    pub fn write_run(
        &self,
        run: &RunResult,
        config: &ProcessingConfig,
        prefix: Option<&str>,
    ) -> Result<ReportManifest> {
        let stamp = (self.clock)().format(FOLDER_STAMP).to_string();
        let name = match prefix.map(sanitize_name).filter(|p| !p.is_empty()) {
            Some(prefix) => format!("{prefix}_{stamp}"),
            None => stamp,
        };
        let dir = self.claim_report_dir(&name)?;
        fill_new_dir(&dir, |dir| write_run_files(dir, run, config))?;

        info!(
            report = %name,
            stages = run.stages.len(),
            rows = run.overall.height(),
            "wrote report"
        );
        self.load_report(&name)
    }

    /// Report folder names, newest first. Folders without a trailing timestamp sort last.
    pub fn list_reports(&self) -> Result<Vec<String>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut reports = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name != CROSS_COMPARISON_DIR {
                reports.push(name);
            }
        }
        reports.sort_by_cached_key(|name| Reverse((folder_stamp(name), name.clone())));
        Ok(reports)
    }

    pub fn load_report(&self, name: &str) -> Result<ReportManifest> {
        let dir = self.existing_report_dir(name)?;
        let existing = |relative: String| dir.join(&relative).is_file().then_some(relative);

        let pattern = format!(
            "{}/step_*",
            glob::Pattern::escape(&dir.to_string_lossy())
        );
        let mut steps: Vec<u32> = Vec::new();
        for entry in glob::glob(&pattern)?.flatten() {
            if !entry.is_dir() {
                continue;
            }
            let folder = entry
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            match folder.strip_prefix("step_").and_then(|n| n.parse::<u32>().ok()) {
                Some(step) => steps.push(step),
                None => warn!(report = name, folder = %folder, "skipping unrecognised step folder"),
            }
        }
        steps.sort_unstable();

        let steps: Vec<StepFiles> = steps
            .into_iter()
            .map(|step| StepFiles {
                step,
                plot: existing(format!("step_{step}/step_{step}_plot.json")),
                csv: existing(format!("step_{step}/step_{step}_data.csv")),
                json: existing(format!("step_{step}/step_{step}_data.json")),
            })
            .collect();

        Ok(ReportManifest {
            report: name.to_string(),
            overall_plot: existing(OVERALL_PLOT.to_string()),
            overall_csv: existing(OVERALL_CSV.to_string()),
            stage_count: steps.len(),
            steps,
        })
    }

    /// Returns the sanitised new name.
    pub fn rename_report(&self, old: &str, new: &str) -> Result<String> {
        let old_dir = self.existing_report_dir(old)?;
        let new_name = sanitize_name(new);
        let new_dir = self.report_dir(&new_name)?;
        if new_dir.exists() {
            return Err(ReactorError::ReportExists(new_name));
        }
        fs::rename(&old_dir, &new_dir)?;
        info!(from = old, to = %new_name, "renamed report");
        Ok(new_name)
    }

    pub fn delete_report(&self, name: &str) -> Result<()> {
        let dir = self.existing_report_dir(name)?;
        fs::remove_dir_all(&dir)?;
        info!(report = name, "deleted report");
        Ok(())
    }

    /// Folder tree of a report: folders first, then files, each group by name.
    pub fn report_contents(&self, name: &str) -> Result<Vec<ContentEntry>> {
        let dir = self.existing_report_dir(name)?;
        directory_tree(&dir, Path::new(""))
    }

    pub fn read_report_file(&self, name: &str, relative: &str) -> Result<FileContent> {
        let path = self.report_file(name, relative)?;
        let size = fs::metadata(&path)?.len();
        let binary_extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| BINARY_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if binary_extension {
            return Ok(FileContent::Binary { size });
        }
        match String::from_utf8(fs::read(&path)?) {
            Ok(content) => Ok(FileContent::Text { content }),
            Err(_) => Ok(FileContent::Binary { size }),
        }
    }

    pub fn delete_report_file(&self, name: &str, relative: &str) -> Result<()> {
        let path = self.report_file(name, relative)?;
        fs::remove_file(&path)?;
        info!(report = name, file = relative, "deleted report file");
        Ok(())
    }

    fn report_file(&self, name: &str, relative: &str) -> Result<PathBuf> {
        let dir = self.existing_report_dir(name)?;
        let path = dir.join(checked_relative(relative)?);
        if !path.is_file() {
            return Err(ReactorError::ReportFileNotFound {
                report: name.to_string(),
                path: relative.to_string(),
            });
        }
        Ok(path)
    }

    fn stage_records(&self, dir: &Path, name: &str, stages: &[u32]) -> Result<Vec<StageRecords>> {
        let mut found = Vec::new();
        for &stage in stages {
            let path = dir
                .join(format!("step_{stage}"))
                .join(format!("step_{stage}_data.json"));
            if !path.is_file() {
                warn!(report = name, stage, "stage data not found");
                continue;
            }
            let records = read_json_records(&fs::read_to_string(&path)?)?;
            found.push(StageRecords { stage, records });
        }
        Ok(found)
    }

    /// Concatenates the selected stages' records into one CSV, ordered by `timestamp_column`.
    pub fn combine_stages(
        &self,
        name: &str,
        stages: &[u32],
        timestamp_column: &str,
    ) -> Result<String> {
        let dir = self.existing_report_dir(name)?;
        let found = self.stage_records(&dir, name, stages)?;
        if found.is_empty() {
            return Err(ReactorError::NoStageData(name.to_string()));
        }

        let mut records: Vec<Record> = found.into_iter().flat_map(|s| s.records).collect();
        // ISO timestamps order lexically; rows without one go last.
        records.sort_by(|a, b| {
            let key = |record: &Record| {
                let value = record.get(timestamp_column).and_then(|v| v.as_str());
                (value.is_none(), value.map(str::to_string))
            };
            key(a).cmp(&key(b))
        });

        let mut buffer = Vec::new();
        write_records_csv(&records, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    /// Plots the selected stages against relative time and stores the figure under
    /// `comparison_plots/`.
    pub fn compare_stages(
        &self,
        name: &str,
        stages: &[u32],
        prefix: Option<&str>,
        config: &ProcessingConfig,
    ) -> Result<ComparisonPlot> {
        let dir = self.existing_report_dir(name)?;
        let found = self.stage_records(&dir, name, stages)?;
        if found.is_empty() {
            return Err(ReactorError::NoStageData(name.to_string()));
        }

        let figure = stage_comparison_plot(
            &found,
            &config.lv.relative_time_field,
            &config.channels,
            &config.alignment,
        )?;
        if figure.is_empty() {
            return Err(ReactorError::NoComparisonSources);
        }

        let stamp = (self.clock)().format(PLOT_STAMP).to_string();
        let file_name = match prefix.map(sanitize_name).filter(|p| !p.is_empty()) {
            Some(prefix) => format!("{prefix}_{COMPARISON_MARKER}{stamp}.json"),
            None => format!("{COMPARISON_MARKER}{stamp}.json"),
        };
        let comparison_dir = dir.join(COMPARISON_DIR);
        fs::create_dir_all(&comparison_dir)?;
        write_json(&comparison_dir.join(&file_name), &figure)?;
        info!(report = name, file = %file_name, stages = found.len(), "wrote stage comparison");

        Ok(ComparisonPlot {
            report: name.to_string(),
            path: format!("{COMPARISON_DIR}/{file_name}"),
            name: file_name,
        })
    }

    pub fn list_comparison_plots(&self, name: &str) -> Result<Vec<ComparisonPlot>> {
        let dir = self.existing_report_dir(name)?.join(COMPARISON_DIR);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut plots = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let Ok(file_name) = entry.file_name().into_string() else {
                continue;
            };
            if entry.file_type()?.is_file()
                && file_name.contains(COMPARISON_MARKER)
                && file_name.ends_with(".json")
            {
                plots.push(ComparisonPlot {
                    report: name.to_string(),
                    path: format!("{COMPARISON_DIR}/{file_name}"),
                    name: file_name,
                });
            }
        }
        plots.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(plots)
    }

    pub fn list_all_comparison_plots(&self) -> Result<Vec<ComparisonPlot>> {
        let mut plots = Vec::new();
        for report in self.list_reports()? {
            if self.report_dir(&report).is_err() {
                continue;
            }
            plots.extend(self.list_comparison_plots(&report)?);
        }
        Ok(plots)
    }

    /// Combines stored comparison figures with selected stages of one report into a new
    /// figure under `cross_comparisons/`.
    pub fn cross_compare(
        &self,
        plots: &[ComparisonPlot],
        current: Option<(&str, &[u32])>,
        config: &ProcessingConfig,
    ) -> Result<CrossComparison> {
        let has_current = current.is_some_and(|(_, stages)| !stages.is_empty());
        if plots.is_empty() && !has_current {
            return Err(ReactorError::NoComparisonSources);
        }

        let mut sources = Vec::new();
        for plot in plots {
            let path = match self.report_file(&plot.report, &plot.path) {
                Ok(path) => path,
                Err(err) => {
                    warn!(report = %plot.report, path = %plot.path, error = %err, "skipping comparison plot");
                    continue;
                }
            };
            match serde_json::from_str::<Figure>(&fs::read_to_string(&path)?) {
                Ok(figure) => sources.push(SourcePlot {
                    report: plot.report.clone(),
                    figure,
                }),
                Err(err) => {
                    warn!(report = %plot.report, path = %plot.path, error = %err, "unreadable comparison plot");
                }
            }
        }

        let current = match current.filter(|_| has_current) {
            Some((report, stages)) => {
                let dir = self.existing_report_dir(report)?;
                Some(CurrentStages {
                    report: report.to_string(),
                    stages: self.stage_records(&dir, report, stages)?,
                })
            }
            None => None,
        };

        let figure = cross_comparison_plot(
            &sources,
            current.as_ref(),
            &config.lv.relative_time_field,
            &config.channels,
            &config.alignment,
        )?;
        if figure.is_empty() {
            return Err(ReactorError::NoComparisonSources);
        }

        let stamp = (self.clock)().format(FOLDER_STAMP).to_string();
        let folder = format!("cross_comp_{stamp}");
        let file_name = format!("cross_comparison_plot_{stamp}.json");
        let out_dir = self.root.join(CROSS_COMPARISON_DIR).join(&folder);
        fs::create_dir_all(&out_dir)?;
        write_json(&out_dir.join(&file_name), &figure)?;
        info!(folder = %folder, traces = figure.data.len(), "wrote cross comparison");

        Ok(CrossComparison {
            path: format!("{CROSS_COMPARISON_DIR}/{folder}/{file_name}"),
            figure,
        })
    }
}

/// Keeps ASCII letters, digits, `-`, `_` and `.`, turns whitespace into `_` and trims
/// leading and trailing `.`/`_`.
pub fn sanitize_name(raw: &str) -> String {
    let mapped: String = raw
        .trim()
        .chars()
        .filter_map(|c| {
            if c.is_whitespace() {
                Some('_')
            } else if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                Some(c)
            } else {
                None
            }
        })
        .collect();
    mapped.trim_matches(|c| c == '.' || c == '_').to_string()
}

fn folder_stamp(name: &str) -> Option<NaiveDateTime> {
    let start = name.len().checked_sub(FOLDER_STAMP_LEN)?;
    let tail = name.get(start..)?;
    NaiveDateTime::parse_from_str(tail, FOLDER_STAMP).ok()
}

/// Rejects absolute paths and any `..` component.
fn checked_relative(relative: &str) -> Result<PathBuf> {
    let mut clean = PathBuf::new();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => return Err(ReactorError::InvalidReportPath(relative.to_string())),
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(ReactorError::InvalidReportPath(relative.to_string()));
    }
    Ok(clean)
}

fn directory_tree(dir: &Path, relative: &Path) -> Result<Vec<ContentEntry>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let child_relative = relative.join(&name);
        let path = child_relative.to_string_lossy().replace('\\', "/");
        if entry.file_type()?.is_dir() {
            entries.push(ContentEntry::Folder {
                children: directory_tree(&entry.path(), &child_relative)?,
                name,
                path,
            });
        } else {
            let size = entry.metadata()?.len();
            entries.push(ContentEntry::File {
                name,
                path,
                size,
                size_display: display_size(size),
            });
        }
    }
    entries.sort_by(|a, b| {
        (!a.is_folder(), a.name()).cmp(&(!b.is_folder(), b.name()))
    });
    Ok(entries)
}

fn display_size(size: u64) -> String {
    const KB: f64 = 1024.0;
    let bytes = size as f64;
    if bytes > KB * KB {
        format!("{:.2} MB", bytes / (KB * KB))
    } else if bytes > KB {
        format!("{:.2} KB", bytes / KB)
    } else {
        format!("{size} bytes")
    }
}

/// Runs `fill` against a freshly created `dir`; on failure the folder is removed so no
/// partial report is left behind.
fn fill_new_dir<F>(dir: &Path, fill: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
{
    let result = fill(dir);
    if result.is_err() {
        if let Err(e) = fs::remove_dir_all(dir) {
            warn!(dir = %dir.display(), error = %e, "could not remove partial report");
        }
    }
    result
}

fn write_run_files(dir: &Path, run: &RunResult, config: &ProcessingConfig) -> Result<()> {
    let overall = &run.overall;
    write_csv(overall.df(), create_file(&dir.join(OVERALL_CSV))?)?;
    let figure = overall_plot(
        overall.df(),
        overall.timestamp_column(),
        &config.channels,
        &config.alignment,
    )?;
    write_json(&dir.join(OVERALL_PLOT), &figure)?;

    for stage in &run.stages {
        let step = format!("step_{}", stage.stage);
        let step_dir = dir.join(&step);
        fs::create_dir_all(&step_dir)?;

        let aligned = &stage.aligned;
        write_csv(aligned.df(), create_file(&step_dir.join(format!("{step}_data.csv")))?)?;
        write_json_records(
            aligned.df(),
            create_file(&step_dir.join(format!("{step}_data.json")))?,
        )?;
        let figure = stage_plot(
            aligned.df(),
            aligned.timestamp_column(),
            stage.stage,
            &config.channels,
            &config.alignment,
        )?;
        write_json(&step_dir.join(format!("{step}_plot.json")), &figure)?;
    }
    Ok(())
}

fn create_file(path: &Path) -> Result<BufWriter<File>> {
    Ok(BufWriter::new(File::create(path)?))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut writer = create_file(path)?;
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_keeps_a_safe_alphabet() {
        assert_eq!(sanitize_name(" my run #3 "), "my_run_3");
        assert_eq!(sanitize_name("../../etc"), "etc");
        assert_eq!(sanitize_name("__a.b-c__"), "a.b-c");
        assert_eq!(sanitize_name("///"), "");
    }

    #[test]
    fn relative_paths_stay_inside() {
        assert_eq!(
            checked_relative("./step_1/step_1_data.csv").expect("path"),
            PathBuf::from("step_1/step_1_data.csv")
        );
        assert!(checked_relative("../other/file.csv").is_err());
        assert!(checked_relative("/etc/passwd").is_err());
        assert!(checked_relative("step_1/../../x").is_err());
        assert!(checked_relative("").is_err());
    }

    #[test]
    fn folder_stamps_parse_from_the_name_tail() {
        assert!(folder_stamp("20250502_101500").is_some());
        assert!(folder_stamp("trial_20250502_101500").is_some());
        assert!(folder_stamp("renamed").is_none());
        assert!(folder_stamp("ab_2025").is_none());
    }

    #[test]
    fn sizes_display_like_a_file_browser() {
        assert_eq!(display_size(10), "10 bytes");
        assert_eq!(display_size(2048), "2.00 KB");
        assert_eq!(display_size(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn claiming_a_taken_name_fails() {
        let tmp = tempfile::TempDir::new().expect("tempdir");
        let store = ReportStore::new(tmp.path().join("nested").join("reports"));
        let dir = store.claim_report_dir("run_1").expect("first claim");
        assert!(dir.is_dir());
        let err = store.claim_report_dir("run_1").expect_err("taken");
        assert!(matches!(err, ReactorError::ReportExists(ref name) if name == "run_1"));
    }

    #[test]
    fn failed_fill_removes_the_folder() {
        let tmp = tempfile::TempDir::new().expect("tempdir");
        let dir = tmp.path().join("run_1");
        fs::create_dir(&dir).expect("dir");

        let err = fill_new_dir(&dir, |dir| {
            fs::write(dir.join(OVERALL_CSV), "Date\n")?;
            fs::create_dir(dir.join("step_1"))?;
            Err(ReactorError::ReportExists("step_1".to_string()))
        })
        .expect_err("fill fails");
        assert!(matches!(err, ReactorError::ReportExists(_)));
        assert!(!dir.exists());

        fs::create_dir(&dir).expect("dir again");
        fill_new_dir(&dir, |dir| Ok(fs::write(dir.join(OVERALL_CSV), "Date\n")?)).expect("fill");
        assert!(dir.join(OVERALL_CSV).is_file());
    }
}
