use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use dbs_api::{MigrationReport, MigrationStatus};
use dbs_migrate::MigrationError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// The HTTP-boundary error type, mapping `MigrationError` categories onto
/// status codes per §7's error taxonomy.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Migration(#[from] MigrationError),
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
}

/// Status code for a `MigrationError`, per §7's taxonomy. Shared by
/// `ApiError::into_response` (the generic JSON-error endpoints) and
/// `migration_error_report` (the `/dbs/submit`/`/dbs/process` endpoints,
/// whose contract is a `MigrationReport` body even on failure).
fn status_for(e: &MigrationError) -> StatusCode {
    match e {
        MigrationError::Validation(_) => StatusCode::BAD_REQUEST,
        MigrationError::AlreadyQueued { .. } => StatusCode::CONFLICT,
        MigrationError::NotFound(_) => StatusCode::NOT_FOUND,
        MigrationError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        MigrationError::RemoteUnavailable(_) => StatusCode::BAD_GATEWAY,
        MigrationError::IllegalTransition(_) => {
            error!(error = %e, "illegal status transition reached the HTTP boundary");
            StatusCode::INTERNAL_SERVER_ERROR
        }
        MigrationError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        MigrationError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::MissingField(_) => StatusCode::BAD_REQUEST,
            ApiError::Migration(e) => status_for(e),
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// §6's submit/process contract: a `MigrationReport` body on both success
/// and failure, with the status code chosen per `status_for`.
pub fn migration_error_report(e: MigrationError) -> (StatusCode, Json<MigrationReport>) {
    let status = status_for(&e);
    (status, Json(MigrationReport::failed(MigrationStatus::Failed, e.to_string())))
}
