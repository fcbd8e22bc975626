use crate::error::{MigrationError, Result};

/// Opens the embedded database at `path`, creating it if absent, and
/// returns a cheaply-`Clone`-able connection handle shared by C3 and C7.
pub async fn open(path: &str) -> Result<turso::Connection> {
    let db = turso::Builder::new_local(path)
        .build()
        .await
        .map_err(|e| MigrationError::Store(format!("failed to open database '{}': {}", path, e)))?;
    db.connect()
        .map_err(|e| MigrationError::Store(format!("failed to connect to database '{}': {}", path, e)))
}
