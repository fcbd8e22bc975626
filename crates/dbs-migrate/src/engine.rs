use crate::catalog::Catalog;
use crate::closure::ClosureResolver;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::process::Processor;
use crate::status_api::StatusApi;
use crate::store::Store;
use crate::submit::SubmissionController;
use dbs_remote::RemoteClient;
use std::sync::Arc;

/// Constructor-wired collaborator set: remote client, closure resolver,
/// request store, local catalog, and the three component facades built
/// from them. No dependency-injection container — six collaborators is a
/// fixed, small set (§10.5).
pub struct Engine {
    pub submit: SubmissionController,
    pub process: Processor,
    pub status: StatusApi,
    pub catalog: Catalog,
    pub store: Store,
    pub config: EngineConfig,
}

impl Engine {
    pub async fn new(config: EngineConfig) -> Result<Self> {
        let conn = crate::db::open(&config.database_path).await?;
        let store = Store::new(conn.clone()).await?;
        let catalog = Catalog::new(conn).await?;

        let client = Arc::new(RemoteClient::new());
        let resolver = ClosureResolver::new(client.clone());

        let submit = SubmissionController::new(resolver, store.clone(), config.local_base_url.clone());
        let process = Processor::new(client, store.clone(), catalog.clone());
        let status = StatusApi::new(store.clone());

        Ok(Self {
            submit,
            process,
            status,
            catalog,
            store,
            config,
        })
    }

    /// Scan `IN_PROGRESS` rows and reconcile any whose block already landed
    /// locally. Exposed as a maintenance entry point, not run inline inside
    /// `process` (§9).
    pub async fn reconcile_stranded(&self) -> Result<u64> {
        self.store.reconcile_stranded(&self.catalog).await
    }
}
