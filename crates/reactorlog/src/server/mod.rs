mod response;
mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use reactorlog_core::{ProcessingConfig, ReportStore};
use tokio::net::TcpListener;
use tracing::info;

pub use response::ApiError;

/// Controller logs from long runs exceed axum's 2 MB default.
const UPLOAD_LIMIT_BYTES: usize = 64 * 1024 * 1024;

pub struct AppState {
    pub store: ReportStore,
    pub config: ProcessingConfig,
}

impl AppState {
    pub fn new(store: ReportStore, config: ProcessingConfig) -> Self {
        Self { store, config }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/process", post(routes::process))
        .route("/reports", get(routes::list_reports))
        .route(
            "/reports/{name}",
            get(routes::load_report).delete(routes::delete_report),
        )
        .route("/reports/{name}/contents", get(routes::report_contents))
        .route(
            "/reports/{name}/files/{*path}",
            get(routes::read_report_file).delete(routes::delete_report_file),
        )
        .route("/reports/{name}/rename", post(routes::rename_report))
        .route("/reports/{name}/compare", post(routes::compare_stages))
        .route("/reports/{name}/combine", post(routes::combine_stages))
        .route(
            "/reports/{name}/comparison-plots",
            get(routes::list_comparison_plots),
        )
        .route("/comparison-plots", get(routes::list_all_comparison_plots))
        .route("/cross-comparison", post(routes::cross_compare))
        .route("/cross-comparison/csv", post(routes::cross_comparison_csv))
        .layer(DefaultBodyLimit::max(UPLOAD_LIMIT_BYTES))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(
        address = %listener.local_addr()?,
        reports = %state.store.root().display(),
        "listening"
    );
    axum::serve(listener, router(state).into_make_service()).await?;
    Ok(())
}
