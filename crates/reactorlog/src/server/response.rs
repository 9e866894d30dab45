use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use reactorlog_core::ReactorError;
use serde_json::{json, Map, Value};

/// A failed request: the status code plus the `{ success: false, message }` body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    missing: Vec<String>,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            missing: Vec::new(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ReactorError> for ApiError {
    fn from(err: ReactorError) -> Self {
        let status = match &err {
            ReactorError::Parse { .. }
            | ReactorError::InvalidReportPath(_)
            | ReactorError::NoComparisonSources
            | ReactorError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            ReactorError::ReportNotFound(_)
            | ReactorError::ReportFileNotFound { .. }
            | ReactorError::NoStageData(_) => StatusCode::NOT_FOUND,
            ReactorError::ReportExists(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        } else {
            tracing::warn!(error = %err, "request rejected");
        }
        Self {
            status,
            missing: err.missing_fields().to_vec(),
            message: err.to_string(),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self::new(err.status(), format!("invalid upload: {}", err.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({ "success": false, "message": self.message });
        if !self.missing.is_empty() {
            body["missing_fields"] = json!(self.missing);
        }
        (self.status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// `{ success: true, ...payload }`. Non-object payloads are ignored.
pub fn success(payload: Value) -> Json<Value> {
    let mut body = Map::new();
    body.insert("success".to_string(), Value::Bool(true));
    if let Value::Object(fields) = payload {
        body.extend(fields);
    }
    Json(Value::Object(body))
}

/// Runs synchronous core work on the blocking pool.
pub async fn blocking<T, F>(work: F) -> ApiResult<T>
where
    F: FnOnce() -> Result<T, ReactorError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(err) => {
            tracing::error!(error = %err, "blocking task failed");
            Err(ApiError::internal(format!("worker task failed: {err}")))
        }
    }
}
