use crate::catalog::Catalog;
use crate::error::{MigrationError, Result};
use crate::store::Store;
use dbs_api::{MigrationReport, MigrationStatus};
use dbs_remote::RemoteClient;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// Pulls one work item, fetches its `blockdump` from the source, invokes
/// the bulk-insert collaborator, and records the outcome, subject to a
/// timeout (C5).
pub struct Processor {
    client: Arc<RemoteClient>,
    store: Store,
    catalog: Catalog,
}

impl Processor {
    pub fn new(client: Arc<RemoteClient>, store: Store, catalog: Catalog) -> Self {
        Self { client, store, catalog }
    }

    #[instrument(skip(self))]
    pub async fn process(
        &self,
        request_id: i64,
        timeout_secs: u64,
        report_flag: bool,
    ) -> Result<MigrationReport> {
        let outcome = tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            self.process_inner(request_id),
        )
        .await;

        let status = match outcome {
            Ok(result) => result?,
            Err(_) => {
                warn!(request_id, timeout_secs, "processor deadline exceeded, row left IN_PROGRESS");
                return Err(MigrationError::Timeout(timeout_secs));
            }
        };

        if report_flag {
            Ok(MigrationReport::ok(
                vec![request_id],
                status,
                format!("request {} processed", request_id),
            ))
        } else {
            Ok(MigrationReport::ok(vec![request_id], status, String::new()))
        }
    }

    /// Fetch → transition → insert → transition, per §4.5. The bulk-insert
    /// is its own transaction at the data plane; the status update is a
    /// second, separate one — the crash window between the two is handled
    /// by `Store::reconcile_stranded`, not here.
    async fn process_inner(&self, request_id: i64) -> Result<MigrationStatus> {
        let request = self.store.fetch_request(request_id).await?;
        self.store
            .update_status(request_id, MigrationStatus::InProgress)
            .await?;

        let block = self.store.fetch_block_for_request(request_id).await?;

        let dump = match self.client.fetch_blockdump(&request.url, &block.block_name).await {
            Ok(dump) => dump,
            Err(e) => {
                error!(request_id, block = %block.block_name, error = %e, "blockdump fetch failed");
                self.store.update_status(request_id, MigrationStatus::Failed).await?;
                return Err(MigrationError::RemoteUnavailable(e));
            }
        };

        let create_by = if dump.dataset.create_by.is_empty() {
            request.create_by.clone()
        } else {
            dump.dataset.create_by.clone()
        };
        match self.catalog.insert_bulk_blocks(&dump, &create_by).await {
            Ok(()) => {
                self.store
                    .update_status(request_id, MigrationStatus::Completed)
                    .await?;
                info!(request_id, block = %block.block_name, "migration completed");
                Ok(MigrationStatus::Completed)
            }
            Err(e) => {
                error!(request_id, block = %block.block_name, error = %e, "bulk insert failed");
                self.store.update_status(request_id, MigrationStatus::Failed).await?;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbs_api::MigrationStatus as Status;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn test_processor() -> (Processor, Store, Catalog, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("process.db");
        let conn = crate::db::open(db_path.to_str().unwrap()).await.expect("open db");
        let store = Store::new(conn.clone()).await.expect("init store");
        let catalog = Catalog::new(conn).await.expect("init catalog");
        let processor = Processor::new(Arc::new(RemoteClient::new()), store.clone(), catalog.clone());
        (processor, store, catalog, dir)
    }

    fn blockdump_body(block_name: &str, dataset_create_by: &str) -> serde_json::Value {
        serde_json::json!({
            "dataset": {
                "dataset": "/A/B/RECO",
                "is_dataset_valid": true,
                "create_by": dataset_create_by,
            },
            "block": {
                "block_name": block_name,
                "dataset": "/A/B/RECO",
                "open_for_writing": 0,
                "create_by": "unused",
            },
            "files": [],
            "file_lumis": [],
            "block_parent_list": [],
            "dataset_parent_list": [],
        })
    }

    #[tokio::test]
    async fn happy_path_completes_and_installs_block() {
        let (processor, store, catalog, _dir) = test_processor().await;
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blockdump"))
            .respond_with(ResponseTemplate::new(200).set_body_json(blockdump_body("/A/B/C#1", "alice")))
            .mount(&server)
            .await;

        let ids = store
            .submit_plan(&server.uri(), &["/A/B/C#1".to_string()], "alice")
            .await
            .unwrap();
        let request_id = ids[0];

        let report = processor.process(request_id, 30, false).await.expect("process succeeds");
        assert_eq!(report.status, "COMPLETED");
        assert!(report.error.is_none());

        let request = store.fetch_request(request_id).await.unwrap();
        assert_eq!(request.status, Status::Completed);
        assert!(catalog.block_exists("/A/B/C#1").await.unwrap());
    }

    #[tokio::test]
    async fn create_by_falls_back_to_submitter_when_dataset_create_by_is_empty() {
        let (processor, store, catalog, _dir) = test_processor().await;
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blockdump"))
            .respond_with(ResponseTemplate::new(200).set_body_json(blockdump_body("/A/B/C#1", "")))
            .mount(&server)
            .await;

        let ids = store
            .submit_plan(&server.uri(), &["/A/B/C#1".to_string()], "alice")
            .await
            .unwrap();
        let request_id = ids[0];
        processor.process(request_id, 30, false).await.expect("process succeeds");

        let dump = catalog.fetch_blockdump("/A/B/C#1").await.unwrap();
        assert_eq!(dump.block.create_by, "alice");
    }

    #[tokio::test]
    async fn blockdump_fetch_failure_leaves_row_failed_and_catalog_untouched() {
        let (processor, store, catalog, _dir) = test_processor().await;
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blockdump"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let ids = store
            .submit_plan(&server.uri(), &["/A/B/C#1".to_string()], "alice")
            .await
            .unwrap();
        let request_id = ids[0];

        let err = processor.process(request_id, 30, false).await.expect_err("fetch fails");
        assert!(matches!(err, MigrationError::RemoteUnavailable(_)));

        let request = store.fetch_request(request_id).await.unwrap();
        assert_eq!(request.status, Status::Failed);
        assert!(!catalog.block_exists("/A/B/C#1").await.unwrap());
    }
}
