use crate::error::{migration_error_report, ApiError};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use dbs_api::{MigrationReport, MigrationStatus, RequestFilter};
use dbs_migrate::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::instrument;

pub type SharedEngine = Arc<Engine>;

#[derive(Debug, Deserialize)]
pub struct SubmitBody {
    pub migration_url: String,
    pub migration_input: String,
    pub create_by: String,
}

/// §6: submit responds with a `MigrationReport` on both acceptance and
/// failure — `ApiError`'s generic `{"error": ...}` body is for the
/// non-report endpoints only.
#[instrument(skip(engine))]
pub async fn submit(
    State(engine): State<SharedEngine>,
    Json(body): Json<SubmitBody>,
) -> (StatusCode, Json<MigrationReport>) {
    match engine
        .submit
        .submit(&body.migration_url, &body.migration_input, &body.create_by)
        .await
    {
        Ok(report) => (StatusCode::OK, Json(report)),
        Err(e) => migration_error_report(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ProcessBody {
    pub migration_request_id: Option<i64>,
    /// Accepted for compatibility with the source's field name.
    pub migration_rqst_id: Option<i64>,
    pub timeout: Option<u64>,
    #[serde(default)]
    pub report: bool,
}

#[instrument(skip(engine))]
pub async fn process(
    State(engine): State<SharedEngine>,
    Json(body): Json<ProcessBody>,
) -> (StatusCode, Json<MigrationReport>) {
    let request_id = match body.migration_request_id.or(body.migration_rqst_id) {
        Some(id) => id,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(MigrationReport::failed(
                    MigrationStatus::Failed,
                    "missing required field 'migration_request_id'",
                )),
            )
        }
    };
    let timeout = body.timeout.unwrap_or(engine.config.default_timeout_secs);

    match engine.process.process(request_id, timeout, body.report).await {
        Ok(report) => (StatusCode::OK, Json(report)),
        Err(e) => migration_error_report(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub migration_request_id: Option<i64>,
    pub migration_input: Option<String>,
    pub migration_url: Option<String>,
    pub dataset: Option<String>,
    pub block_name: Option<String>,
    pub user: Option<String>,
    pub create_by: Option<String>,
    #[serde(default)]
    pub oldest: bool,
}

impl From<StatusQuery> for RequestFilter {
    fn from(q: StatusQuery) -> Self {
        RequestFilter {
            request_id: q.migration_request_id,
            input: q.migration_input,
            url: q.migration_url,
            dataset: q.dataset,
            block_name: q.block_name,
            user: q.user,
            create_by: q.create_by,
            oldest: q.oldest,
        }
    }
}

#[instrument(skip(engine))]
pub async fn status(
    State(engine): State<SharedEngine>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<Value>, ApiError> {
    let rows = engine.status.status(&query.into()).await?;
    Ok(Json(json!(rows)))
}

#[instrument(skip(engine))]
pub async fn total(State(engine): State<SharedEngine>) -> Result<Json<Value>, ApiError> {
    let count = engine.status.total().await?;
    Ok(Json(json!({ "total": count })))
}

#[derive(Debug, Deserialize)]
pub struct RemoveBody {
    pub migration_rqst_id: i64,
    pub create_by: String,
}

#[instrument(skip(engine))]
pub async fn remove(
    State(engine): State<SharedEngine>,
    Json(body): Json<RemoveBody>,
) -> Result<Json<Value>, ApiError> {
    let removed = engine.status.remove(body.migration_rqst_id, &body.create_by).await?;
    Ok(Json(json!({ "removed": removed })))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
pub struct BlocksQuery {
    pub block_name: Option<String>,
    pub dataset: Option<String>,
}

#[instrument(skip(engine))]
pub async fn blocks(
    State(engine): State<SharedEngine>,
    Query(query): Query<BlocksQuery>,
) -> Result<Json<Value>, ApiError> {
    let selector = query.block_name.or(query.dataset).ok_or(ApiError::MissingField("block_name"))?;
    let names = engine.catalog.list_blocks(&selector).await?;
    Ok(Json(json!(names
        .into_iter()
        .map(|block_name| json!({ "block_name": block_name }))
        .collect::<Vec<_>>())))
}

#[derive(Debug, Deserialize)]
pub struct BlockParentsQuery {
    pub block_name: String,
}

#[instrument(skip(engine))]
pub async fn block_parents(
    State(engine): State<SharedEngine>,
    Query(query): Query<BlockParentsQuery>,
) -> Result<Json<Value>, ApiError> {
    let names = engine.catalog.list_parents(&query.block_name).await?;
    Ok(Json(json!(names
        .into_iter()
        .map(|parent_block_name| json!({ "parent_block_name": parent_block_name }))
        .collect::<Vec<_>>())))
}

#[derive(Debug, Deserialize)]
pub struct DatasetParentsQuery {
    pub dataset: String,
}

#[instrument(skip(engine))]
pub async fn dataset_parents(
    State(engine): State<SharedEngine>,
    Query(query): Query<DatasetParentsQuery>,
) -> Result<Json<Value>, ApiError> {
    let names = engine.catalog.list_parents(&query.dataset).await?;
    Ok(Json(json!(names
        .into_iter()
        .map(|parent_dataset| json!({ "parent_dataset": parent_dataset }))
        .collect::<Vec<_>>())))
}

#[derive(Debug, Deserialize)]
pub struct BlockDumpQuery {
    pub block_name: String,
}

#[instrument(skip(engine))]
pub async fn blockdump(
    State(engine): State<SharedEngine>,
    Query(query): Query<BlockDumpQuery>,
) -> Result<Json<Value>, ApiError> {
    let dump = engine.catalog.fetch_blockdump(&query.block_name).await?;
    Ok(Json(json!(dump)))
}
