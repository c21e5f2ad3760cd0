use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use duckdb::Connection;
use turnscope_core::error::{Result, TraceError};

use crate::schema::SCHEMA_SQL;

/// Handle on the collector's DuckDB database.
#[derive(Clone)]
pub struct CollectorDb {
    conn: Arc<Mutex<Connection>>,
    db_path: String,
}

impl CollectorDb {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| TraceError::Io(format!("failed to create db dir: {e}")))?;
        }

        let conn = Connection::open(path)
            .map_err(|e| TraceError::Store(format!("failed to open duckdb: {e}")))?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| TraceError::Store(format!("failed to initialize schema: {e}")))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.display().to_string(),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| TraceError::Store(format!("failed to open in-memory db: {e}")))?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| TraceError::Store(format!("failed to initialize schema: {e}")))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: ":memory:".to_string(),
        })
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    pub(crate) fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("collector db mutex poisoned")
    }
}
