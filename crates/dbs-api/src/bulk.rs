use serde::{Deserialize, Serialize};

/// The full payload fetched from `GET {url}/blockdump?block_name=…` and
/// consumed by the bulk-insert collaborator (C7). Mirrors the original
/// schema's dataset/block/file/file-lumi/parentage shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkBlocks {
    pub dataset: DatasetRecord,
    pub block: BlockRecord,
    #[serde(default)]
    pub files: Vec<FileRecord>,
    #[serde(default)]
    pub file_lumis: Vec<FileLumiRecord>,
    #[serde(default)]
    pub block_parent_list: Vec<BlockParent>,
    #[serde(default)]
    pub dataset_parent_list: Vec<DatasetParent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub dataset: String,
    #[serde(default = "default_true")]
    pub is_dataset_valid: bool,
    pub create_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockRecord {
    pub block_name: String,
    pub dataset: String,
    #[serde(default)]
    pub open_for_writing: i32,
    pub create_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub logical_file_name: String,
    pub block_name: String,
    pub create_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileLumiRecord {
    pub logical_file_name: String,
    pub run_num: i64,
    pub lumi_section_num: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockParent {
    pub block_name: String,
    pub parent_block_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetParent {
    pub dataset: String,
    pub parent_dataset: String,
}

fn default_true() -> bool {
    true
}
