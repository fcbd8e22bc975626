use crate::error::{MigrationError, Result};
use dbs_api::{BlockParent, BlockRecord, BulkBlocks, DatasetParent, DatasetRecord, FileLumiRecord, FileRecord};
use turso::Value;

fn store_err(e: impl std::fmt::Display) -> MigrationError {
    MigrationError::Store(e.to_string())
}

/// The destination-side collaborator (C7): a minimal normalized schema of
/// datasets/blocks/files/parentage backing `insert_bulk_blocks` and the
/// engine's own `localhost` branch of the remote contracts.
#[derive(Clone)]
pub struct Catalog {
    conn: turso::Connection,
}

impl Catalog {
    pub async fn new(conn: turso::Connection) -> Result<Self> {
        let catalog = Self { conn };
        catalog.init_schema().await?;
        Ok(catalog)
    }

    async fn init_schema(&self) -> Result<()> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS datasets (
                dataset TEXT PRIMARY KEY,
                is_dataset_valid INTEGER NOT NULL,
                create_by TEXT NOT NULL,
                creation_date TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS blocks (
                block_name TEXT PRIMARY KEY,
                dataset TEXT NOT NULL,
                open_for_writing INTEGER NOT NULL DEFAULT 0,
                create_by TEXT NOT NULL,
                creation_date TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS files (
                logical_file_name TEXT PRIMARY KEY,
                block_name TEXT NOT NULL,
                create_by TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS file_lumis (
                logical_file_name TEXT NOT NULL,
                run_num INTEGER NOT NULL,
                lumi_section_num INTEGER NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS block_parents (
                block_name TEXT NOT NULL,
                parent_block_name TEXT NOT NULL,
                UNIQUE(block_name, parent_block_name)
            )",
            "CREATE TABLE IF NOT EXISTS dataset_parents (
                dataset TEXT NOT NULL,
                parent_dataset TEXT NOT NULL,
                UNIQUE(dataset, parent_dataset)
            )",
        ];
        for sql in statements {
            self.conn.execute(sql, ()).await.map_err(store_err)?;
        }
        Ok(())
    }

    /// Insert one block's complete payload as a single transaction:
    /// upserts the dataset row, inserts the block row (conflicting with an
    /// existing, divergent block surfaces as `StoreError`), and inserts
    /// files, file-lumis, and parentage edges.
    pub async fn insert_bulk_blocks(&self, payload: &BulkBlocks, create_by: &str) -> Result<()> {
        self.conn.execute("BEGIN", ()).await.map_err(store_err)?;

        if let Err(e) = self.insert_bulk_blocks_inner(payload, create_by).await {
            let _ = self.conn.execute("ROLLBACK", ()).await;
            return Err(e);
        }

        self.conn.execute("COMMIT", ()).await.map_err(store_err)?;
        Ok(())
    }

    async fn insert_bulk_blocks_inner(&self, payload: &BulkBlocks, create_by: &str) -> Result<()> {
        self.upsert_dataset(&payload.dataset).await?;
        self.insert_block_row(&payload.block, create_by).await?;

        for file in &payload.files {
            self.insert_file(file).await?;
        }
        for lumi in &payload.file_lumis {
            self.insert_file_lumi(lumi).await?;
        }
        for edge in &payload.block_parent_list {
            self.insert_block_parent(edge).await?;
        }
        for edge in &payload.dataset_parent_list {
            self.insert_dataset_parent(edge).await?;
        }
        Ok(())
    }

    async fn upsert_dataset(&self, dataset: &DatasetRecord) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let mut stmt = self
            .conn
            .prepare(
                "INSERT INTO datasets (dataset, is_dataset_valid, create_by, creation_date)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT(dataset) DO NOTHING",
            )
            .await
            .map_err(store_err)?;
        stmt.execute(vec![
            Value::Text(dataset.dataset.clone()),
            Value::Integer(if dataset.is_dataset_valid { 1 } else { 0 }),
            Value::Text(dataset.create_by.clone()),
            Value::Text(now),
        ])
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn insert_block_row(&self, block: &BlockRecord, create_by: &str) -> Result<()> {
        let mut probe = self
            .conn
            .prepare("SELECT dataset FROM blocks WHERE block_name = ?")
            .await
            .map_err(store_err)?;
        let mut rows = probe
            .query(vec![Value::Text(block.block_name.clone())])
            .await
            .map_err(store_err)?;
        if let Some(row) = rows.next().await.map_err(store_err)? {
            let existing_dataset = match row.get_value(0).map_err(store_err)? {
                Value::Text(d) => d,
                other => return Err(MigrationError::Store(format!("unexpected dataset type {:?}", other))),
            };
            if existing_dataset != block.dataset {
                return Err(MigrationError::Store(format!(
                    "block '{}' already present under dataset '{}', refusing to overwrite with '{}'",
                    block.block_name, existing_dataset, block.dataset
                )));
            }
            return Ok(());
        }

        let now = chrono::Utc::now().to_rfc3339();
        let mut stmt = self
            .conn
            .prepare(
                "INSERT INTO blocks (block_name, dataset, open_for_writing, create_by, creation_date)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .await
            .map_err(store_err)?;
        stmt.execute(vec![
            Value::Text(block.block_name.clone()),
            Value::Text(block.dataset.clone()),
            Value::Integer(block.open_for_writing as i64),
            Value::Text(create_by.to_string()),
            Value::Text(now),
        ])
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn insert_file(&self, file: &FileRecord) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare(
                "INSERT INTO files (logical_file_name, block_name, create_by)
                 VALUES (?, ?, ?)
                 ON CONFLICT(logical_file_name) DO NOTHING",
            )
            .await
            .map_err(store_err)?;
        stmt.execute(vec![
            Value::Text(file.logical_file_name.clone()),
            Value::Text(file.block_name.clone()),
            Value::Text(file.create_by.clone()),
        ])
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn insert_file_lumi(&self, lumi: &FileLumiRecord) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare(
                "INSERT INTO file_lumis (logical_file_name, run_num, lumi_section_num)
                 VALUES (?, ?, ?)",
            )
            .await
            .map_err(store_err)?;
        stmt.execute(vec![
            Value::Text(lumi.logical_file_name.clone()),
            Value::Integer(lumi.run_num),
            Value::Integer(lumi.lumi_section_num),
        ])
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn insert_block_parent(&self, edge: &BlockParent) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare(
                "INSERT INTO block_parents (block_name, parent_block_name)
                 VALUES (?, ?)
                 ON CONFLICT(block_name, parent_block_name) DO NOTHING",
            )
            .await
            .map_err(store_err)?;
        stmt.execute(vec![
            Value::Text(edge.block_name.clone()),
            Value::Text(edge.parent_block_name.clone()),
        ])
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn insert_dataset_parent(&self, edge: &DatasetParent) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare(
                "INSERT INTO dataset_parents (dataset, parent_dataset)
                 VALUES (?, ?)
                 ON CONFLICT(dataset, parent_dataset) DO NOTHING",
            )
            .await
            .map_err(store_err)?;
        stmt.execute(vec![
            Value::Text(edge.dataset.clone()),
            Value::Text(edge.parent_dataset.clone()),
        ])
        .await
        .map_err(store_err)?;
        Ok(())
    }

    /// `list_blocks(selector)`: block names for `selector`, restricted to
    /// `open_for_writing=0`. A `#` in `selector` marks a block-name query;
    /// otherwise it is a dataset query.
    pub async fn list_blocks(&self, selector: &str) -> Result<Vec<String>> {
        let sql = if dbs_api::is_block_name(selector) {
            "SELECT block_name FROM blocks WHERE block_name = ? AND open_for_writing = 0"
        } else {
            "SELECT block_name FROM blocks WHERE dataset = ? AND open_for_writing = 0"
        };
        let mut stmt = self.conn.prepare(sql).await.map_err(store_err)?;
        let mut rows = stmt
            .query(vec![Value::Text(selector.to_string())])
            .await
            .map_err(store_err)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(store_err)? {
            match row.get_value(0).map_err(store_err)? {
                Value::Text(name) => out.push(name),
                other => return Err(MigrationError::Store(format!("unexpected block_name type {:?}", other))),
            }
        }
        Ok(out)
    }

    /// `list_parents(selector)`: parent names, dispatching on block vs
    /// dataset the same way `list_blocks` does.
    pub async fn list_parents(&self, selector: &str) -> Result<Vec<String>> {
        let sql = if dbs_api::is_block_name(selector) {
            "SELECT parent_block_name FROM block_parents WHERE block_name = ?"
        } else {
            "SELECT parent_dataset FROM dataset_parents WHERE dataset = ?"
        };
        let mut stmt = self.conn.prepare(sql).await.map_err(store_err)?;
        let mut rows = stmt
            .query(vec![Value::Text(selector.to_string())])
            .await
            .map_err(store_err)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(store_err)? {
            match row.get_value(0).map_err(store_err)? {
                Value::Text(name) => out.push(name),
                other => return Err(MigrationError::Store(format!("unexpected parent name type {:?}", other))),
            }
        }
        Ok(out)
    }

    /// `fetch_blockdump(block)`: the full payload for one block, assembled
    /// from the normalized tables.
    pub async fn fetch_blockdump(&self, block_name: &str) -> Result<BulkBlocks> {
        let block = self.fetch_block_record(block_name).await?;
        let dataset = self.fetch_dataset_record(&block.dataset).await?;
        let files = self.fetch_files(block_name).await?;
        let mut file_lumis = Vec::new();
        for file in &files {
            file_lumis.extend(self.fetch_file_lumis(&file.logical_file_name).await?);
        }
        let block_parent_list = self.fetch_block_parents(block_name).await?;
        let dataset_parent_list = self.fetch_dataset_parents(&block.dataset).await?;

        Ok(BulkBlocks {
            dataset,
            block,
            files,
            file_lumis,
            block_parent_list,
            dataset_parent_list,
        })
    }

    async fn fetch_block_record(&self, block_name: &str) -> Result<BlockRecord> {
        let mut stmt = self
            .conn
            .prepare("SELECT block_name, dataset, open_for_writing, create_by FROM blocks WHERE block_name = ?")
            .await
            .map_err(store_err)?;
        let mut rows = stmt
            .query(vec![Value::Text(block_name.to_string())])
            .await
            .map_err(store_err)?;
        let row = rows
            .next()
            .await
            .map_err(store_err)?
            .ok_or_else(|| MigrationError::NotFound(format!("block {}", block_name)))?;

        Ok(BlockRecord {
            block_name: as_text(&row, 0)?,
            dataset: as_text(&row, 1)?,
            open_for_writing: as_i64(&row, 2)? as i32,
            create_by: as_text(&row, 3)?,
        })
    }

    async fn fetch_dataset_record(&self, dataset: &str) -> Result<DatasetRecord> {
        let mut stmt = self
            .conn
            .prepare("SELECT dataset, is_dataset_valid, create_by FROM datasets WHERE dataset = ?")
            .await
            .map_err(store_err)?;
        let mut rows = stmt
            .query(vec![Value::Text(dataset.to_string())])
            .await
            .map_err(store_err)?;
        let row = rows
            .next()
            .await
            .map_err(store_err)?
            .ok_or_else(|| MigrationError::NotFound(format!("dataset {}", dataset)))?;

        Ok(DatasetRecord {
            dataset: as_text(&row, 0)?,
            is_dataset_valid: as_i64(&row, 1)? != 0,
            create_by: as_text(&row, 2)?,
        })
    }

    async fn fetch_files(&self, block_name: &str) -> Result<Vec<FileRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT logical_file_name, block_name, create_by FROM files WHERE block_name = ?")
            .await
            .map_err(store_err)?;
        let mut rows = stmt
            .query(vec![Value::Text(block_name.to_string())])
            .await
            .map_err(store_err)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(store_err)? {
            out.push(FileRecord {
                logical_file_name: as_text(&row, 0)?,
                block_name: as_text(&row, 1)?,
                create_by: as_text(&row, 2)?,
            });
        }
        Ok(out)
    }

    async fn fetch_file_lumis(&self, logical_file_name: &str) -> Result<Vec<FileLumiRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT logical_file_name, run_num, lumi_section_num FROM file_lumis WHERE logical_file_name = ?")
            .await
            .map_err(store_err)?;
        let mut rows = stmt
            .query(vec![Value::Text(logical_file_name.to_string())])
            .await
            .map_err(store_err)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(store_err)? {
            out.push(FileLumiRecord {
                logical_file_name: as_text(&row, 0)?,
                run_num: as_i64(&row, 1)?,
                lumi_section_num: as_i64(&row, 2)?,
            });
        }
        Ok(out)
    }

    async fn fetch_block_parents(&self, block_name: &str) -> Result<Vec<BlockParent>> {
        let mut stmt = self
            .conn
            .prepare("SELECT block_name, parent_block_name FROM block_parents WHERE block_name = ?")
            .await
            .map_err(store_err)?;
        let mut rows = stmt
            .query(vec![Value::Text(block_name.to_string())])
            .await
            .map_err(store_err)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(store_err)? {
            out.push(BlockParent {
                block_name: as_text(&row, 0)?,
                parent_block_name: as_text(&row, 1)?,
            });
        }
        Ok(out)
    }

    async fn fetch_dataset_parents(&self, dataset: &str) -> Result<Vec<DatasetParent>> {
        let mut stmt = self
            .conn
            .prepare("SELECT dataset, parent_dataset FROM dataset_parents WHERE dataset = ?")
            .await
            .map_err(store_err)?;
        let mut rows = stmt
            .query(vec![Value::Text(dataset.to_string())])
            .await
            .map_err(store_err)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(store_err)? {
            out.push(DatasetParent {
                dataset: as_text(&row, 0)?,
                parent_dataset: as_text(&row, 1)?,
            });
        }
        Ok(out)
    }

    /// True if `block_name` already has a row in the local catalog, used by
    /// `Store::reconcile_stranded`.
    pub async fn block_exists(&self, block_name: &str) -> Result<bool> {
        let mut stmt = self
            .conn
            .prepare("SELECT 1 FROM blocks WHERE block_name = ?")
            .await
            .map_err(store_err)?;
        let mut rows = stmt
            .query(vec![Value::Text(block_name.to_string())])
            .await
            .map_err(store_err)?;
        Ok(rows.next().await.map_err(store_err)?.is_some())
    }
}

fn as_i64(row: &turso::Row, idx: usize) -> Result<i64> {
    match row.get_value(idx).map_err(store_err)? {
        Value::Integer(v) => Ok(v),
        other => Err(MigrationError::Store(format!("column {}: expected integer, got {:?}", idx, other))),
    }
}

fn as_text(row: &turso::Row, idx: usize) -> Result<String> {
    match row.get_value(idx).map_err(store_err)? {
        Value::Text(v) => Ok(v),
        other => Err(MigrationError::Store(format!("column {}: expected text, got {:?}", idx, other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_catalog() -> (Catalog, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("catalog.db");
        let conn = crate::db::open(path.to_str().unwrap()).await.expect("open db");
        let catalog = Catalog::new(conn).await.expect("init catalog");
        (catalog, dir)
    }

    fn sample_payload() -> BulkBlocks {
        BulkBlocks {
            dataset: DatasetRecord {
                dataset: "/A/B/RECO".to_string(),
                is_dataset_valid: true,
                create_by: "alice".to_string(),
            },
            block: BlockRecord {
                block_name: "/A/B/RECO#1".to_string(),
                dataset: "/A/B/RECO".to_string(),
                open_for_writing: 0,
                create_by: "alice".to_string(),
            },
            files: vec![FileRecord {
                logical_file_name: "/store/f1.root".to_string(),
                block_name: "/A/B/RECO#1".to_string(),
                create_by: "alice".to_string(),
            }],
            file_lumis: vec![FileLumiRecord {
                logical_file_name: "/store/f1.root".to_string(),
                run_num: 1,
                lumi_section_num: 7,
            }],
            block_parent_list: vec![BlockParent {
                block_name: "/A/B/RECO#1".to_string(),
                parent_block_name: "/A/B/RAW#1".to_string(),
            }],
            dataset_parent_list: vec![DatasetParent {
                dataset: "/A/B/RECO".to_string(),
                parent_dataset: "/A/B/RAW".to_string(),
            }],
        }
    }

    #[tokio::test]
    async fn insert_bulk_blocks_round_trips_through_fetch_blockdump() {
        let (catalog, _dir) = test_catalog().await;
        let payload = sample_payload();
        catalog.insert_bulk_blocks(&payload, "alice").await.expect("insert succeeds");

        assert!(catalog.block_exists("/A/B/RECO#1").await.unwrap());
        let dump = catalog.fetch_blockdump("/A/B/RECO#1").await.expect("fetch succeeds");
        assert_eq!(dump.block.block_name, "/A/B/RECO#1");
        assert_eq!(dump.files.len(), 1);
        assert_eq!(dump.file_lumis.len(), 1);
        assert_eq!(dump.block_parent_list[0].parent_block_name, "/A/B/RAW#1");
        assert_eq!(dump.dataset_parent_list[0].parent_dataset, "/A/B/RAW");
    }

    #[tokio::test]
    async fn insert_bulk_blocks_rejects_divergent_reinsert() {
        let (catalog, _dir) = test_catalog().await;
        let mut payload = sample_payload();
        catalog.insert_bulk_blocks(&payload, "alice").await.unwrap();

        payload.block.dataset = "/A/B/OTHER".to_string();
        let err = catalog
            .insert_bulk_blocks(&payload, "alice")
            .await
            .expect_err("divergent dataset must not silently overwrite");
        assert!(matches!(err, MigrationError::Store(_)));
    }

    #[tokio::test]
    async fn list_blocks_excludes_open_for_writing() {
        let (catalog, _dir) = test_catalog().await;
        catalog.insert_bulk_blocks(&sample_payload(), "alice").await.unwrap();

        let found = catalog.list_blocks("/A/B/RECO#1").await.unwrap();
        assert_eq!(found, vec!["/A/B/RECO#1".to_string()]);

        let by_dataset = catalog.list_blocks("/A/B/RECO").await.unwrap();
        assert_eq!(by_dataset, vec!["/A/B/RECO#1".to_string()]);
    }

    #[tokio::test]
    async fn list_parents_dispatches_on_block_vs_dataset() {
        let (catalog, _dir) = test_catalog().await;
        catalog.insert_bulk_blocks(&sample_payload(), "alice").await.unwrap();

        assert_eq!(
            catalog.list_parents("/A/B/RECO#1").await.unwrap(),
            vec!["/A/B/RAW#1".to_string()]
        );
        assert_eq!(
            catalog.list_parents("/A/B/RECO").await.unwrap(),
            vec!["/A/B/RAW".to_string()]
        );
    }
}
