use crate::error::{RemoteError, Result};
use crate::models::{BlockParentRow, BlockRow, DatasetParentRow};
use dbs_api::BulkBlocks;
use tracing::{debug, error};

/// Fetches block/dataset lists and parent edges from any DBS instance over
/// HTTP+JSON. A single client is reused for both the configured remote
/// source and the engine's own `localhost` branch (see §4.7 of the design).
#[derive(Clone)]
pub struct RemoteClient {
    client: reqwest::Client,
}

impl Default for RemoteClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");
        Self { client }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!(url, "dbs-remote: GET");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| RemoteError::Connect {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            error!(url, %status, "dbs-remote: non-success status");
            return Err(RemoteError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.json::<T>().await.map_err(|source| RemoteError::Decode {
            url: url.to_string(),
            source,
        })
    }

    /// `list_blocks(U, V) -> [block_name]`, restricted to `open_for_writing=0`.
    /// Block queries hit `/blocks?block_name=…`, dataset queries hit `/blocks?dataset=…`.
    pub async fn list_blocks(&self, base_url: &str, input: &str) -> Result<Vec<String>> {
        let is_block = dbs_api::is_block_name(input);
        let param = if is_block { "block_name" } else { "dataset" };
        let url = format!(
            "{}/blocks?{}={}&open_for_writing=0",
            base_url.trim_end_matches('/'),
            param,
            urlencoding::encode(input)
        );
        let rows: Vec<BlockRow> = self.get_json(&url).await?;
        Ok(rows.into_iter().map(|r| r.block_name).collect())
    }

    /// `list_parents(U, V) -> [parent_name]`. Blocks hit `/blockparents`,
    /// datasets hit `/datasetparents`.
    pub async fn list_parents(&self, base_url: &str, input: &str) -> Result<Vec<String>> {
        if dbs_api::is_block_name(input) {
            let url = format!(
                "{}/blockparents?block_name={}",
                base_url.trim_end_matches('/'),
                urlencoding::encode(input)
            );
            let rows: Vec<BlockParentRow> = self.get_json(&url).await?;
            Ok(rows.into_iter().map(|r| r.parent_block_name).collect())
        } else {
            let url = format!(
                "{}/datasetparents?dataset={}",
                base_url.trim_end_matches('/'),
                urlencoding::encode(input)
            );
            let rows: Vec<DatasetParentRow> = self.get_json(&url).await?;
            Ok(rows.into_iter().map(|r| r.parent_dataset).collect())
        }
    }

    /// `fetch_blockdump(U, block) -> BulkBlocks`.
    pub async fn fetch_blockdump(&self, base_url: &str, block: &str) -> Result<BulkBlocks> {
        let url = format!(
            "{}/blockdump?block_name={}",
            base_url.trim_end_matches('/'),
            urlencoding::encode(block)
        );
        self.get_json(&url).await
    }
}
