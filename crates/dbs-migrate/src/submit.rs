use crate::closure::ClosureResolver;
use crate::error::{MigrationError, Result};
use crate::store::Store;
use dbs_api::{validate_migration_input, validate_url, MigrationReport, MigrationStatus};
use tracing::{info, instrument};

/// Accepts a submit call, drives the closure resolver, and writes the
/// resulting work plan through the request store inside a single
/// transaction (C4).
pub struct SubmissionController {
    resolver: ClosureResolver,
    store: Store,
    local_base_url: String,
}

impl SubmissionController {
    pub fn new(resolver: ClosureResolver, store: Store, local_base_url: String) -> Self {
        Self {
            resolver,
            store,
            local_base_url,
        }
    }

    #[instrument(skip(self), fields(migration_input, create_by))]
    pub async fn submit(
        &self,
        migration_url: &str,
        migration_input: &str,
        create_by: &str,
    ) -> Result<MigrationReport> {
        validate_url(migration_url)?;
        validate_migration_input(migration_input)?;

        let plan = self
            .resolver
            .resolve(migration_url, &self.local_base_url, migration_input)
            .await;

        if plan.is_empty() {
            info!(migration_input, "already fulfilled, nothing to migrate");
            return Ok(MigrationReport::already_fulfilled());
        }

        // The dedup predicate is checked per expanded block rather than
        // against the raw `migration_input`: a dataset input never appears
        // verbatim in `migration_requests.input` (only the blocks it
        // expands to do, per the one-row-per-block inflation), so checking
        // the unresolved input would never catch an in-flight dataset
        // resubmission.
        for block in &plan {
            if self.store.already_queued(block, create_by).await? {
                return Err(MigrationError::AlreadyQueued {
                    input: block.clone(),
                    create_by: create_by.to_string(),
                });
            }
        }

        let ids = self.store.submit_plan(migration_url, &plan, create_by).await?;
        info!(migration_input, blocks = plan.len(), "submission queued");

        Ok(MigrationReport::ok(
            ids,
            MigrationStatus::Pending,
            format!("queued {} block(s) for migration", plan.len()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::closure::ClosureResolver;
    use dbs_remote::RemoteClient;
    use std::sync::Arc;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn rejects_malformed_input_before_touching_the_store() {
        assert!(validate_migration_input("not-a-dataset").is_err());
    }

    async fn test_controller(local_url: &str) -> (SubmissionController, Store, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("submit.db");
        let conn = crate::db::open(db_path.to_str().unwrap()).await.expect("open db");
        let store = Store::new(conn).await.expect("init store");
        let resolver = ClosureResolver::new(Arc::new(RemoteClient::new()));
        let controller = SubmissionController::new(resolver, store.clone(), local_url.to_string());
        (controller, store, dir)
    }

    fn blocks_json(names: &[&str]) -> serde_json::Value {
        serde_json::json!(names.iter().map(|n| serde_json::json!({ "block_name": n })).collect::<Vec<_>>())
    }

    async fn empty_parents(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/blockparents"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(server)
            .await;
    }

    /// S1: the block is already present locally, so submit is a no-op.
    #[tokio::test]
    async fn already_present_locally_is_a_no_op() {
        let local = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blocks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(blocks_json(&["/A/B/C#1"])))
            .mount(&local)
            .await;

        let (controller, store, _dir) = test_controller(&local.uri()).await;
        let report = controller
            .submit("http://source.invalid", "/A/B/C#1", "alice")
            .await
            .expect("submit succeeds");

        assert!(report.migration_request_ids.is_empty());
        assert_eq!(store.total().await.unwrap(), 0);
    }

    /// S2: a single block with no parents enqueues exactly one row.
    #[tokio::test]
    async fn single_block_no_parents_enqueues_one_row() {
        let local = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blocks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(blocks_json(&[])))
            .mount(&local)
            .await;
        empty_parents(&local).await;

        let source = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blocks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(blocks_json(&["/A/B/C#1"])))
            .mount(&source)
            .await;
        empty_parents(&source).await;

        let (controller, store, _dir) = test_controller(&local.uri()).await;
        let report = controller
            .submit(&source.uri(), "/A/B/C#1", "alice")
            .await
            .expect("submit succeeds");

        assert_eq!(report.migration_request_ids.len(), 1);
        let request_id = report.migration_request_ids[0];
        let request = store.fetch_request(request_id).await.unwrap();
        assert_eq!(request.input, "/A/B/C#1");
        assert_eq!(request.status, MigrationStatus::Pending);
        let block = store.fetch_block_for_request(request_id).await.unwrap();
        assert_eq!(block.block_name, "/A/B/C#1");
        assert_eq!(block.order, 0);
    }

    /// S3: a three-deep ancestor chain enqueues all three blocks, ancestors
    /// ordered before their descendants.
    #[tokio::test]
    async fn three_deep_chain_orders_ancestors_first() {
        let local = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blocks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(blocks_json(&[])))
            .mount(&local)
            .await;
        empty_parents(&local).await;

        let source = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blocks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(blocks_json(&["/A/B/C#1"])))
            .mount(&source)
            .await;
        Mock::given(method("GET"))
            .and(path("/blockparents"))
            .and(query_param("block_name", "/A/B/C#1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([{ "parent_block_name": "/A/B/C#2" }])),
            )
            .mount(&source)
            .await;
        Mock::given(method("GET"))
            .and(path("/blockparents"))
            .and(query_param("block_name", "/A/B/C#2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([{ "parent_block_name": "/A/B/C#3" }])),
            )
            .mount(&source)
            .await;
        Mock::given(method("GET"))
            .and(path("/blockparents"))
            .and(query_param("block_name", "/A/B/C#3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&source)
            .await;

        let (controller, store, _dir) = test_controller(&local.uri()).await;
        let report = controller
            .submit(&source.uri(), "/A/B/C#1", "alice")
            .await
            .expect("submit succeeds");

        assert_eq!(report.migration_request_ids.len(), 3);
        let mut blocks = Vec::new();
        for id in &report.migration_request_ids {
            blocks.push(store.fetch_block_for_request(*id).await.unwrap());
        }
        blocks.sort_by_key(|b| b.order);
        assert_eq!(
            blocks.iter().map(|b| b.block_name.as_str()).collect::<Vec<_>>(),
            vec!["/A/B/C#3", "/A/B/C#2", "/A/B/C#1"]
        );
    }

    /// Regression test for the dataset-dedup fix: resubmitting an in-flight
    /// dataset input must be rejected even though `migration_requests.input`
    /// only ever stores the expanded block name, never the dataset itself.
    #[tokio::test]
    async fn resubmitting_an_in_flight_dataset_is_rejected_as_already_queued() {
        let local = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/datasetparents"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&local)
            .await;
        Mock::given(method("GET"))
            .and(path("/blocks"))
            .and(query_param("dataset", "/A/B/RECO"))
            .respond_with(ResponseTemplate::new(200).set_body_json(blocks_json(&[])))
            .mount(&local)
            .await;

        let source = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/datasetparents"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&source)
            .await;
        Mock::given(method("GET"))
            .and(path("/blocks"))
            .and(query_param("dataset", "/A/B/RECO"))
            .respond_with(ResponseTemplate::new(200).set_body_json(blocks_json(&["/A/B/RECO#1"])))
            .mount(&source)
            .await;

        let (controller, _store, _dir) = test_controller(&local.uri()).await;

        let first = controller
            .submit(&source.uri(), "/A/B/RECO", "alice")
            .await
            .expect("first submission queues the residual block");
        assert_eq!(first.migration_request_ids.len(), 1);

        let err = controller
            .submit(&source.uri(), "/A/B/RECO", "alice")
            .await
            .expect_err("second submission while the first is still pending must be rejected");
        assert!(matches!(err, MigrationError::AlreadyQueued { .. }));
    }
}
