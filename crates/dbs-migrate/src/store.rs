use crate::error::{MigrationError, Result};
use chrono::Utc;
use dbs_api::{IllegalTransition, MigrationBlock, MigrationRequest, MigrationStatus, RequestFilter};
use turso::Value;

fn store_err(e: impl std::fmt::Display) -> MigrationError {
    MigrationError::Store(e.to_string())
}

/// Persists migration requests and their per-block work items (C3). Tables
/// are created with `CREATE TABLE IF NOT EXISTS` on construction; schema
/// migration beyond that is out of scope.
#[derive(Clone)]
pub struct Store {
    conn: turso::Connection,
}

impl Store {
    pub async fn new(conn: turso::Connection) -> Result<Self> {
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS migration_requests (
                    request_id INTEGER PRIMARY KEY AUTOINCREMENT,
                    input TEXT NOT NULL,
                    url TEXT NOT NULL,
                    status INTEGER NOT NULL,
                    retry_count INTEGER NOT NULL DEFAULT 0,
                    create_by TEXT NOT NULL,
                    creation_date TEXT NOT NULL,
                    last_modified_by TEXT NOT NULL,
                    last_modification_date TEXT NOT NULL
                )",
                (),
            )
            .await
            .map_err(store_err)?;

        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS migration_blocks (
                    block_id INTEGER PRIMARY KEY AUTOINCREMENT,
                    request_id INTEGER NOT NULL REFERENCES migration_requests(request_id),
                    block_name TEXT NOT NULL,
                    block_order INTEGER NOT NULL,
                    status INTEGER NOT NULL,
                    create_by TEXT NOT NULL,
                    creation_date TEXT NOT NULL,
                    last_modified_by TEXT NOT NULL,
                    last_modification_date TEXT NOT NULL,
                    UNIQUE(request_id, block_name)
                )",
                (),
            )
            .await
            .map_err(store_err)?;

        Ok(())
    }

    /// Insert a `MigrationRequest` row, returning its fresh `request_id`.
    pub async fn insert_request(
        &self,
        input: &str,
        url: &str,
        status: MigrationStatus,
        create_by: &str,
    ) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        let mut stmt = self
            .conn
            .prepare(
                "INSERT INTO migration_requests
                    (input, url, status, retry_count, create_by, creation_date, last_modified_by, last_modification_date)
                 VALUES (?, ?, ?, 0, ?, ?, ?, ?)
                 RETURNING request_id",
            )
            .await
            .map_err(store_err)?;

        let params = vec![
            Value::Text(input.to_string()),
            Value::Text(url.to_string()),
            Value::Integer(status.as_i32() as i64),
            Value::Text(create_by.to_string()),
            Value::Text(now.clone()),
            Value::Text(create_by.to_string()),
            Value::Text(now),
        ];

        let mut rows = stmt.query(params).await.map_err(store_err)?;
        let row = rows
            .next()
            .await
            .map_err(store_err)?
            .ok_or_else(|| MigrationError::Store("insert_request: no id returned".to_string()))?;
        match row.get_value(0).map_err(store_err)? {
            turso::Value::Integer(id) => Ok(id),
            other => Err(MigrationError::Store(format!(
                "insert_request: unexpected id type {:?}",
                other
            ))),
        }
    }

    /// Insert a `MigrationBlock` row tied to `request_id`.
    pub async fn insert_block(
        &self,
        request_id: i64,
        block_name: &str,
        order: i64,
        status: MigrationStatus,
        create_by: &str,
    ) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        let mut stmt = self
            .conn
            .prepare(
                "INSERT INTO migration_blocks
                    (request_id, block_name, block_order, status, create_by, creation_date, last_modified_by, last_modification_date)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                 RETURNING block_id",
            )
            .await
            .map_err(store_err)?;

        let params = vec![
            Value::Integer(request_id),
            Value::Text(block_name.to_string()),
            Value::Integer(order),
            Value::Integer(status.as_i32() as i64),
            Value::Text(create_by.to_string()),
            Value::Text(now.clone()),
            Value::Text(create_by.to_string()),
            Value::Text(now),
        ];

        let mut rows = stmt.query(params).await.map_err(store_err)?;
        let row = rows
            .next()
            .await
            .map_err(store_err)?
            .ok_or_else(|| MigrationError::Store("insert_block: no id returned".to_string()))?;
        match row.get_value(0).map_err(store_err)? {
            turso::Value::Integer(id) => Ok(id),
            other => Err(MigrationError::Store(format!(
                "insert_block: unexpected id type {:?}",
                other
            ))),
        }
    }

    /// Atomically persist one submission's full plan: a `MigrationRequest` +
    /// `MigrationBlock` row per block in `plan`, in order. Mirrors the
    /// source's per-block-new-request-row transaction.
    pub async fn submit_plan(&self, url: &str, plan: &[String], create_by: &str) -> Result<Vec<i64>> {
        self.conn.execute("BEGIN", ()).await.map_err(store_err)?;

        let mut ids = Vec::with_capacity(plan.len());
        for (i, block_name) in plan.iter().enumerate() {
            let result = async {
                let request_id = self
                    .insert_request(block_name, url, MigrationStatus::Pending, create_by)
                    .await?;
                self.insert_block(
                    request_id,
                    block_name,
                    i as i64,
                    MigrationStatus::Pending,
                    create_by,
                )
                .await?;
                Ok::<i64, MigrationError>(request_id)
            }
            .await;

            match result {
                Ok(id) => ids.push(id),
                Err(e) => {
                    let _ = self.conn.execute("ROLLBACK", ()).await;
                    return Err(e);
                }
            }
        }

        self.conn.execute("COMMIT", ()).await.map_err(store_err)?;
        Ok(ids)
    }

    /// Validate and apply a status transition, the only mutator for
    /// `status` after insertion.
    pub async fn update_status(&self, request_id: i64, to: MigrationStatus) -> Result<()> {
        let current = self.fetch_status(request_id).await?;
        let next = current
            .transition(to)
            .map_err(|e: IllegalTransition| MigrationError::IllegalTransition(e))?;

        let retry_increment = matches!(
            (current, next),
            (MigrationStatus::Failed, MigrationStatus::InProgress)
        );

        let now = Utc::now().to_rfc3339();
        let sql = if retry_increment {
            "UPDATE migration_requests SET status = ?, retry_count = retry_count + 1, last_modification_date = ? WHERE request_id = ?"
        } else {
            "UPDATE migration_requests SET status = ?, last_modification_date = ? WHERE request_id = ?"
        };
        let mut stmt = self.conn.prepare(sql).await.map_err(store_err)?;
        stmt.execute(vec![
            Value::Integer(next.as_i32() as i64),
            Value::Text(now),
            Value::Integer(request_id),
        ])
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn fetch_status(&self, request_id: i64) -> Result<MigrationStatus> {
        let mut stmt = self
            .conn
            .prepare("SELECT status FROM migration_requests WHERE request_id = ?")
            .await
            .map_err(store_err)?;
        let mut rows = stmt
            .query(vec![Value::Integer(request_id)])
            .await
            .map_err(store_err)?;
        let row = rows
            .next()
            .await
            .map_err(store_err)?
            .ok_or_else(|| MigrationError::NotFound(format!("migration request {}", request_id)))?;
        let raw = match row.get_value(0).map_err(store_err)? {
            turso::Value::Integer(v) => v as i32,
            other => return Err(MigrationError::Store(format!("unexpected status type {:?}", other))),
        };
        MigrationStatus::from_i32(raw)
            .ok_or_else(|| MigrationError::Store(format!("unrecognized status value {}", raw)))
    }

    /// True if a non-terminal row already exists for `(input, create_by)`.
    pub async fn already_queued(&self, input: &str, create_by: &str) -> Result<bool> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT COUNT(*) FROM migration_requests
                 WHERE input = ? AND create_by = ? AND status NOT IN (?, ?)",
            )
            .await
            .map_err(store_err)?;
        let mut rows = stmt
            .query(vec![
                Value::Text(input.to_string()),
                Value::Text(create_by.to_string()),
                Value::Integer(MigrationStatus::Completed.as_i32() as i64),
                Value::Integer(MigrationStatus::TermFailed.as_i32() as i64),
            ])
            .await
            .map_err(store_err)?;
        let row = rows
            .next()
            .await
            .map_err(store_err)?
            .ok_or_else(|| MigrationError::Store("already_queued: no count row".to_string()))?;
        match row.get_value(0).map_err(store_err)? {
            turso::Value::Integer(n) => Ok(n > 0),
            other => Err(MigrationError::Store(format!("unexpected count type {:?}", other))),
        }
    }

    /// Fetch the single `MigrationBlock` row for `request_id`, used by C5.
    pub async fn fetch_block_for_request(&self, request_id: i64) -> Result<MigrationBlock> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT block_id, request_id, block_name, block_order, status,
                        create_by, creation_date, last_modified_by, last_modification_date
                 FROM migration_blocks WHERE request_id = ?",
            )
            .await
            .map_err(store_err)?;
        let mut rows = stmt
            .query(vec![Value::Integer(request_id)])
            .await
            .map_err(store_err)?;
        let row = rows
            .next()
            .await
            .map_err(store_err)?
            .ok_or_else(|| MigrationError::NotFound(format!("migration block for request {}", request_id)))?;
        row_to_block(&row)
    }

    pub async fn fetch_request(&self, request_id: i64) -> Result<MigrationRequest> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT request_id, input, url, status, retry_count,
                        create_by, creation_date, last_modified_by, last_modification_date
                 FROM migration_requests WHERE request_id = ?",
            )
            .await
            .map_err(store_err)?;
        let mut rows = stmt
            .query(vec![Value::Integer(request_id)])
            .await
            .map_err(store_err)?;
        let row = rows
            .next()
            .await
            .map_err(store_err)?
            .ok_or_else(|| MigrationError::NotFound(format!("migration request {}", request_id)))?;
        row_to_request(&row)
    }

    /// List requests matching `filter`, ordered by `creation_date ASC` when
    /// `filter.oldest`, else `request_id ASC`.
    pub async fn list_requests(&self, filter: &RequestFilter) -> Result<Vec<MigrationRequest>> {
        let mut clauses = Vec::new();
        let mut params = Vec::new();

        if let Some(id) = filter.request_id {
            clauses.push("request_id = ?");
            params.push(Value::Integer(id));
        }
        if let Some(input) = &filter.input {
            clauses.push("input = ?");
            params.push(Value::Text(input.clone()));
        }
        if let Some(url) = &filter.url {
            clauses.push("url = ?");
            params.push(Value::Text(url.clone()));
        }
        if let Some(create_by) = &filter.create_by {
            clauses.push("create_by = ?");
            params.push(Value::Text(create_by.clone()));
        }
        if let Some(input) = &filter.block_name {
            clauses.push("input = ?");
            params.push(Value::Text(input.clone()));
        }
        if let Some(user) = &filter.user {
            clauses.push("create_by = ?");
            params.push(Value::Text(user.clone()));
        }
        // `dataset` filters on the dataset-prefix of `input`; blocks encode
        // their dataset as everything before '#'.
        if let Some(dataset) = &filter.dataset {
            clauses.push("input LIKE ?");
            params.push(Value::Text(format!("{}#%", dataset)));
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let order_clause = if filter.oldest {
            "ORDER BY creation_date ASC"
        } else {
            "ORDER BY request_id ASC"
        };

        let sql = format!(
            "SELECT request_id, input, url, status, retry_count,
                    create_by, creation_date, last_modified_by, last_modification_date
             FROM migration_requests {} {}",
            where_clause, order_clause
        );

        let mut stmt = self.conn.prepare(&sql).await.map_err(store_err)?;
        let mut rows = stmt.query(params).await.map_err(store_err)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(store_err)? {
            out.push(row_to_request(&row)?);
        }
        Ok(out)
    }

    pub async fn count_requests(&self, request_id: i64, create_by: &str) -> Result<i64> {
        let mut stmt = self
            .conn
            .prepare("SELECT COUNT(*) FROM migration_requests WHERE request_id = ? AND create_by = ?")
            .await
            .map_err(store_err)?;
        let mut rows = stmt
            .query(vec![Value::Integer(request_id), Value::Text(create_by.to_string())])
            .await
            .map_err(store_err)?;
        let row = rows
            .next()
            .await
            .map_err(store_err)?
            .ok_or_else(|| MigrationError::Store("count_requests: no count row".to_string()))?;
        match row.get_value(0).map_err(store_err)? {
            turso::Value::Integer(n) => Ok(n),
            other => Err(MigrationError::Store(format!("unexpected count type {:?}", other))),
        }
    }

    /// Delete requests (and their blocks) matching `(request_id, create_by)`.
    /// Idempotent: deleting zero rows is not an error.
    pub async fn delete_requests(&self, request_id: i64, create_by: &str) -> Result<u64> {
        let count = self.count_requests(request_id, create_by).await?;
        if count == 0 {
            return Ok(0);
        }

        self.conn.execute("BEGIN", ()).await.map_err(store_err)?;

        let delete_blocks = self
            .conn
            .prepare("DELETE FROM migration_blocks WHERE request_id = ?")
            .await;
        match delete_blocks {
            Ok(mut stmt) => {
                if let Err(e) = stmt.execute(vec![Value::Integer(request_id)]).await {
                    let _ = self.conn.execute("ROLLBACK", ()).await;
                    return Err(store_err(e));
                }
            }
            Err(e) => {
                let _ = self.conn.execute("ROLLBACK", ()).await;
                return Err(store_err(e));
            }
        }

        let delete_requests = self
            .conn
            .prepare("DELETE FROM migration_requests WHERE request_id = ? AND create_by = ?")
            .await;
        match delete_requests {
            Ok(mut stmt) => {
                if let Err(e) = stmt
                    .execute(vec![Value::Integer(request_id), Value::Text(create_by.to_string())])
                    .await
                {
                    let _ = self.conn.execute("ROLLBACK", ()).await;
                    return Err(store_err(e));
                }
            }
            Err(e) => {
                let _ = self.conn.execute("ROLLBACK", ()).await;
                return Err(store_err(e));
            }
        }

        self.conn.execute("COMMIT", ()).await.map_err(store_err)?;
        Ok(count as u64)
    }

    pub async fn total(&self) -> Result<i64> {
        let mut stmt = self
            .conn
            .prepare("SELECT COUNT(*) FROM migration_requests")
            .await
            .map_err(store_err)?;
        let mut rows = stmt.query(()).await.map_err(store_err)?;
        let row = rows
            .next()
            .await
            .map_err(store_err)?
            .ok_or_else(|| MigrationError::Store("total: no count row".to_string()))?;
        match row.get_value(0).map_err(store_err)? {
            turso::Value::Integer(n) => Ok(n),
            other => Err(MigrationError::Store(format!("unexpected count type {:?}", other))),
        }
    }

    /// Scan `IN_PROGRESS` rows and promote to `COMPLETED` any whose block
    /// already exists in the local catalog, reconciling the crash window
    /// between a committed bulk-insert and its status update.
    pub async fn reconcile_stranded(&self, catalog: &crate::catalog::Catalog) -> Result<u64> {
        let filter = RequestFilter::default();
        let candidates = self.list_requests(&filter).await?;
        let mut reconciled = 0u64;
        for req in candidates {
            if req.status != MigrationStatus::InProgress {
                continue;
            }
            if catalog.block_exists(&req.input).await? {
                self.update_status(req.request_id, MigrationStatus::Completed).await?;
                reconciled += 1;
            }
        }
        Ok(reconciled)
    }
}

fn row_to_request(row: &turso::Row) -> Result<MigrationRequest> {
    let request_id = as_i64(row, 0)?;
    let input = as_text(row, 1)?;
    let url = as_text(row, 2)?;
    let status = MigrationStatus::from_i32(as_i64(row, 3)? as i32)
        .ok_or_else(|| MigrationError::Store("unrecognized status value".to_string()))?;
    let retry_count = as_i64(row, 4)? as i32;
    let create_by = as_text(row, 5)?;
    let creation_date = as_datetime(row, 6)?;
    let last_modified_by = as_text(row, 7)?;
    let last_modification_date = as_datetime(row, 8)?;

    Ok(MigrationRequest {
        request_id,
        input,
        url,
        status,
        retry_count,
        create_by,
        creation_date,
        last_modified_by,
        last_modification_date,
    })
}

fn row_to_block(row: &turso::Row) -> Result<MigrationBlock> {
    let block_id = as_i64(row, 0)?;
    let request_id = as_i64(row, 1)?;
    let block_name = as_text(row, 2)?;
    let order = as_i64(row, 3)?;
    let status = MigrationStatus::from_i32(as_i64(row, 4)? as i32)
        .ok_or_else(|| MigrationError::Store("unrecognized status value".to_string()))?;
    let create_by = as_text(row, 5)?;
    let creation_date = as_datetime(row, 6)?;
    let last_modified_by = as_text(row, 7)?;
    let last_modification_date = as_datetime(row, 8)?;

    Ok(MigrationBlock {
        block_id,
        request_id,
        block_name,
        order,
        status,
        create_by,
        creation_date,
        last_modified_by,
        last_modification_date,
    })
}

fn as_i64(row: &turso::Row, idx: usize) -> Result<i64> {
    match row.get_value(idx).map_err(store_err)? {
        turso::Value::Integer(v) => Ok(v),
        other => Err(MigrationError::Store(format!("column {}: expected integer, got {:?}", idx, other))),
    }
}

fn as_text(row: &turso::Row, idx: usize) -> Result<String> {
    match row.get_value(idx).map_err(store_err)? {
        turso::Value::Text(v) => Ok(v),
        other => Err(MigrationError::Store(format!("column {}: expected text, got {:?}", idx, other))),
    }
}

fn as_datetime(row: &turso::Row, idx: usize) -> Result<chrono::DateTime<Utc>> {
    let raw = as_text(row, idx)?;
    chrono::DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| MigrationError::Store(format!("column {}: invalid timestamp '{}': {}", idx, raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> (Store, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("store.db");
        let conn = crate::db::open(path.to_str().unwrap()).await.expect("open db");
        let store = Store::new(conn).await.expect("init store");
        (store, dir)
    }

    #[tokio::test]
    async fn submit_plan_inserts_one_request_and_block_per_entry() {
        let (store, _dir) = test_store().await;
        let plan = vec!["/A/B/C#1".to_string(), "/A/B/C#2".to_string()];
        let ids = store
            .submit_plan("http://src.example", &plan, "alice")
            .await
            .expect("submit_plan succeeds");
        assert_eq!(ids.len(), 2);

        for (id, block_name) in ids.iter().zip(plan.iter()) {
            let req = store.fetch_request(*id).await.expect("request row exists");
            assert_eq!(req.status, MigrationStatus::Pending);
            assert_eq!(&req.input, block_name);

            let block = store.fetch_block_for_request(*id).await.expect("block row exists");
            assert_eq!(&block.block_name, block_name);
            assert_eq!(block.status, MigrationStatus::Pending);
        }
    }

    #[tokio::test]
    async fn update_status_rejects_illegal_transition() {
        let (store, _dir) = test_store().await;
        let ids = store
            .submit_plan("http://src.example", &["/A/B/C#1".to_string()], "alice")
            .await
            .unwrap();
        let request_id = ids[0];

        let err = store
            .update_status(request_id, MigrationStatus::Completed)
            .await
            .expect_err("pending cannot jump straight to completed");
        assert!(matches!(err, MigrationError::IllegalTransition(_)));
    }

    #[tokio::test]
    async fn update_status_increments_retry_count_on_failed_to_in_progress() {
        let (store, _dir) = test_store().await;
        let ids = store
            .submit_plan("http://src.example", &["/A/B/C#1".to_string()], "alice")
            .await
            .unwrap();
        let request_id = ids[0];

        store.update_status(request_id, MigrationStatus::InProgress).await.unwrap();
        store.update_status(request_id, MigrationStatus::Failed).await.unwrap();
        store.update_status(request_id, MigrationStatus::InProgress).await.unwrap();

        let req = store.fetch_request(request_id).await.unwrap();
        assert_eq!(req.status, MigrationStatus::InProgress);
        assert_eq!(req.retry_count, 1);
    }

    #[tokio::test]
    async fn already_queued_ignores_terminal_rows() {
        let (store, _dir) = test_store().await;
        let ids = store
            .submit_plan("http://src.example", &["/A/B/C#1".to_string()], "alice")
            .await
            .unwrap();
        let request_id = ids[0];

        assert!(store.already_queued("/A/B/C#1", "alice").await.unwrap());

        store.update_status(request_id, MigrationStatus::InProgress).await.unwrap();
        store.update_status(request_id, MigrationStatus::Completed).await.unwrap();

        assert!(!store.already_queued("/A/B/C#1", "alice").await.unwrap());
        assert!(!store.already_queued("/A/B/C#1", "bob").await.unwrap());
    }

    #[tokio::test]
    async fn delete_requests_is_idempotent_and_owner_scoped() {
        let (store, _dir) = test_store().await;
        let ids = store
            .submit_plan("http://src.example", &["/A/B/C#1".to_string()], "alice")
            .await
            .unwrap();
        let request_id = ids[0];

        let removed = store.delete_requests(request_id, "eve").await.unwrap();
        assert_eq!(removed, 0);
        store.fetch_request(request_id).await.expect("row untouched by non-owner");

        let removed = store.delete_requests(request_id, "alice").await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.fetch_request(request_id).await.is_err());

        let removed_again = store.delete_requests(request_id, "alice").await.unwrap();
        assert_eq!(removed_again, 0);
    }

    #[tokio::test]
    async fn list_requests_oldest_orders_by_creation_date() {
        let (store, _dir) = test_store().await;
        store
            .submit_plan("http://src.example", &["/A/B/C#1".to_string()], "alice")
            .await
            .unwrap();
        store
            .submit_plan("http://src.example", &["/A/B/D#1".to_string()], "alice")
            .await
            .unwrap();

        let filter = RequestFilter {
            oldest: true,
            ..Default::default()
        };
        let rows = store.list_requests(&filter).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].creation_date <= rows[1].creation_date);
    }
}
