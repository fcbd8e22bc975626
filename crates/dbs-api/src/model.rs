use crate::status::MigrationStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row per user-visible submission *and* one row per block in the
/// expanded plan (§9 "one-row-per-block inflation" — preserved as-is
/// against the existing schema).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationRequest {
    pub request_id: i64,
    pub input: String,
    pub url: String,
    pub status: MigrationStatus,
    pub retry_count: i32,
    pub create_by: String,
    pub creation_date: DateTime<Utc>,
    pub last_modified_by: String,
    pub last_modification_date: DateTime<Utc>,
}

/// A work-item row tied to a `request_id`. Uniqueness: (request_id, block_name).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationBlock {
    pub block_id: i64,
    pub request_id: i64,
    pub block_name: String,
    pub order: i64,
    pub status: MigrationStatus,
    pub create_by: String,
    pub creation_date: DateTime<Utc>,
    pub last_modified_by: String,
    pub last_modification_date: DateTime<Utc>,
}

/// Query filter accepted by `C3::list_requests` / the `/dbs/status` endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestFilter {
    pub request_id: Option<i64>,
    pub input: Option<String>,
    pub url: Option<String>,
    pub dataset: Option<String>,
    pub block_name: Option<String>,
    pub user: Option<String>,
    pub create_by: Option<String>,
    #[serde(default)]
    pub oldest: bool,
}

/// Response envelope returned by submit/process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationReport {
    pub migration_request_ids: Vec<i64>,
    pub report: String,
    pub status: String,
    pub error: Option<String>,
}

impl MigrationReport {
    pub fn ok(ids: Vec<i64>, status: MigrationStatus, report: impl Into<String>) -> Self {
        Self {
            migration_request_ids: ids,
            report: report.into(),
            status: status.as_str().to_string(),
            error: None,
        }
    }

    pub fn already_fulfilled() -> Self {
        Self {
            migration_request_ids: Vec::new(),
            report: "input already fulfilled: nothing to migrate".to_string(),
            status: MigrationStatus::InProgress.as_str().to_string(),
            error: None,
        }
    }

    pub fn failed(status: MigrationStatus, error: impl Into<String>) -> Self {
        Self {
            migration_request_ids: Vec::new(),
            report: String::new(),
            status: status.as_str().to_string(),
            error: Some(error.into()),
        }
    }
}
