use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use reactorlog_core::export::{write_records_csv, Record};
use reactorlog_core::report_store::ComparisonPlot;
use reactorlog_core::{process_run, ReactorError, RunInputs, RunOutcome};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::response::{blocking, success, ApiError, ApiResult};
use super::AppState;

type SharedState = State<Arc<AppState>>;

struct Upload {
    file_name: String,
    content: String,
}

fn is_txt(file_name: &str) -> bool {
    file_name
        .rsplit_once('.')
        .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case("txt"))
}

/// Multipart fields `lv_file` and `gc_file` (both `.txt`) plus an optional
/// `report_prefix_text`.
pub async fn process(
    State(state): SharedState,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let mut lv: Option<Upload> = None;
    let mut gc: Option<Upload> = None;
    let mut prefix = String::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "lv_file" | "gc_file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content = field.text().await?;
                let upload = Upload { file_name, content };
                if name == "lv_file" {
                    lv = Some(upload);
                } else {
                    gc = Some(upload);
                }
            }
            "report_prefix_text" => prefix = field.text().await?.trim().to_string(),
            other => warn!(field = other, "ignoring unknown upload field"),
        }
    }

    let (Some(lv), Some(gc)) = (lv, gc) else {
        return Err(ApiError::bad_request("Missing LV or GC file in request."));
    };
    if lv.file_name.is_empty() || gc.file_name.is_empty() {
        return Err(ApiError::bad_request("No selected file(s)."));
    }
    if !is_txt(&lv.file_name) || !is_txt(&gc.file_name) {
        return Err(ApiError::bad_request("Invalid file type"));
    }
    info!(lv = %lv.file_name, gc = %gc.file_name, "processing upload");

    blocking(move || {
        let outcome = process_run(
            RunInputs {
                lv_name: &lv.file_name,
                lv_content: &lv.content,
                gc_name: &gc.file_name,
                gc_content: &gc.content,
            },
            &state.config,
        )?;
        let run = match outcome {
            RunOutcome::Completed(run) => run,
            RunOutcome::Empty { file, report } => {
                return Ok((
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(json!({
                        "success": false,
                        "message": format!("No usable rows in {file}"),
                        "parse_report": report,
                    })),
                ));
            }
        };

        let prefix = Some(prefix.as_str()).filter(|p| !p.is_empty());
        let manifest = state.store.write_run(&run, &state.config, prefix)?;
        Ok((
            StatusCode::OK,
            success(json!({
                "report": manifest.report,
                "manifest": manifest,
                "stage_count": run.stage_count(),
                "lv_report": run.lv_report,
                "gc_report": run.gc_report,
                "skipped": run.skipped,
            })),
        ))
    })
    .await
}

pub async fn list_reports(State(state): SharedState) -> ApiResult<Json<Value>> {
    let reports = blocking(move || state.store.list_reports()).await?;
    Ok(success(json!({ "reports": reports })))
}

pub async fn load_report(
    State(state): SharedState,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    let (manifest, plots) = blocking(move || {
        let manifest = state.store.load_report(&name)?;
        let plots = state.store.list_comparison_plots(&name)?;
        Ok((manifest, plots))
    })
    .await?;
    Ok(success(json!({ "manifest": manifest, "comparison_plots": plots })))
}

pub async fn delete_report(
    State(state): SharedState,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    let deleted = name.clone();
    blocking(move || state.store.delete_report(&name)).await?;
    Ok(success(json!({ "message": format!("Report {deleted} deleted") })))
}

pub async fn report_contents(
    State(state): SharedState,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    let contents = blocking(move || state.store.report_contents(&name)).await?;
    Ok(success(json!({ "contents": contents })))
}

pub async fn read_report_file(
    State(state): SharedState,
    Path((name, path)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    let file = blocking(move || state.store.read_report_file(&name, &path)).await?;
    Ok(success(json!({ "file": file })))
}

pub async fn delete_report_file(
    State(state): SharedState,
    Path((name, path)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    let message = format!("Deleted {path} from {name}");
    blocking(move || state.store.delete_report_file(&name, &path)).await?;
    Ok(success(json!({ "message": message })))
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub new_name: String,
}

pub async fn rename_report(
    State(state): SharedState,
    Path(name): Path<String>,
    Json(request): Json<RenameRequest>,
) -> ApiResult<Json<Value>> {
    if request.new_name.trim().is_empty() {
        return Err(ApiError::bad_request("Missing new report name."));
    }
    let old = name.clone();
    let renamed = blocking(move || state.store.rename_report(&name, &request.new_name)).await?;
    Ok(success(json!({
        "message": format!("Report renamed from {old} to {renamed}"),
        "report": renamed,
    })))
}

#[derive(Debug, Deserialize)]
pub struct StagesRequest {
    pub stages: Vec<u32>,
    #[serde(default)]
    pub prefix: Option<String>,
}

fn require_stages(stages: &[u32]) -> ApiResult<()> {
    if stages.is_empty() {
        return Err(ApiError::bad_request("No stages selected."));
    }
    Ok(())
}

pub async fn compare_stages(
    State(state): SharedState,
    Path(name): Path<String>,
    Json(request): Json<StagesRequest>,
) -> ApiResult<Json<Value>> {
    require_stages(&request.stages)?;
    let plot = blocking(move || {
        state.store.compare_stages(
            &name,
            &request.stages,
            request.prefix.as_deref(),
            &state.config,
        )
    })
    .await?;
    Ok(success(json!({ "comparison_plot": plot })))
}

fn csv_attachment(file_name: &str, csv: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={file_name}"),
            ),
        ],
        csv,
    )
        .into_response()
}

pub async fn combine_stages(
    State(state): SharedState,
    Path(name): Path<String>,
    Json(request): Json<StagesRequest>,
) -> ApiResult<Response> {
    require_stages(&request.stages)?;
    let file_name = format!("combined_stages_{name}.csv");
    let csv = blocking(move || {
        let timestamp = state.config.lv.timestamp_output.clone();
        state
            .store
            .combine_stages(&name, &request.stages, &timestamp)
    })
    .await?;
    Ok(csv_attachment(&file_name, csv))
}

pub async fn list_comparison_plots(
    State(state): SharedState,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    let plots = blocking(move || state.store.list_comparison_plots(&name)).await?;
    Ok(success(json!({ "comparison_plots": plots })))
}

pub async fn list_all_comparison_plots(State(state): SharedState) -> ApiResult<Json<Value>> {
    let plots = blocking(move || state.store.list_all_comparison_plots()).await?;
    Ok(success(json!({ "comparison_plots": plots })))
}

#[derive(Debug, Deserialize)]
pub struct CurrentSelection {
    pub report: String,
    pub stages: Vec<u32>,
}

#[derive(Debug, Deserialize)]
pub struct CrossComparisonRequest {
    #[serde(default)]
    pub plots: Vec<ComparisonPlot>,
    #[serde(default)]
    pub current: Option<CurrentSelection>,
}

pub async fn cross_compare(
    State(state): SharedState,
    Json(request): Json<CrossComparisonRequest>,
) -> ApiResult<Json<Value>> {
    let cross = blocking(move || {
        let current = request
            .current
            .as_ref()
            .map(|selection| (selection.report.as_str(), selection.stages.as_slice()));
        state
            .store
            .cross_compare(&request.plots, current, &state.config)
    })
    .await?;
    Ok(success(json!({ "path": cross.path, "figure": cross.figure })))
}

/// Turns the points currently shown in a cross-comparison view into a CSV download.
pub async fn cross_comparison_csv(Json(rows): Json<Vec<Record>>) -> ApiResult<Response> {
    if rows.is_empty() {
        return Err(ApiError::bad_request("No data provided for CSV export."));
    }
    let csv = blocking(move || {
        let mut buffer = Vec::new();
        write_records_csv(&rows, &mut buffer)?;
        Ok::<_, ReactorError>(String::from_utf8_lossy(&buffer).into_owned())
    })
    .await?;
    Ok(csv_attachment("cross_comparison_visible_data.csv", csv))
}
