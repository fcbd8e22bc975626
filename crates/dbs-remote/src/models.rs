use serde::Deserialize;

/// One row of a `GET /blocks?...` response.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockRow {
    pub block_name: String,
}

/// One row of a `GET /blockparents?block_name=...` response.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockParentRow {
    pub parent_block_name: String,
}

/// One row of a `GET /datasetparents?dataset=...` response.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetParentRow {
    pub parent_dataset: String,
}
