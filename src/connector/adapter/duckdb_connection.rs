use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use duckdb::Connection;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::domain::DomainError;

/// Schema setup run against a freshly opened connection.
pub type SchemaInit = fn(&Connection) -> Result<(), DomainError>;

/// Where a DuckDB-backed store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuckdbTarget {
    File(PathBuf),
    InMemory,
}

impl DuckdbTarget {
    /// `:memory:` (or an empty string) selects an in-memory database,
    /// `duckdb://` prefixes are stripped, anything else is a file path.
    pub fn from_uri(uri: &str) -> Self {
        let trimmed = uri.trim();
        let path = trimmed.strip_prefix("duckdb://").unwrap_or(trimmed);
        if path.is_empty() || path == ":memory:" {
            DuckdbTarget::InMemory
        } else {
            DuckdbTarget::File(PathBuf::from(path))
        }
    }

    pub fn file(path: &Path) -> Self {
        DuckdbTarget::File(path.to_path_buf())
    }

    fn open(&self) -> Result<Connection, DomainError> {
        match self {
            DuckdbTarget::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                Connection::open(path).map_err(|e| {
                    DomainError::unavailable(format!(
                        "Failed to open DuckDB database {}: {}",
                        path.display(),
                        e
                    ))
                })
            }
            DuckdbTarget::InMemory => Connection::open_in_memory().map_err(|e| {
                DomainError::unavailable(format!("Failed to open DuckDB in-memory DB: {}", e))
            }),
        }
    }
}

impl std::fmt::Display for DuckdbTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DuckdbTarget::File(path) => write!(f, "{}", path.display()),
            DuckdbTarget::InMemory => write!(f, ":memory:"),
        }
    }
}

/// A connection opened on first use and reopened on demand after `close`.
///
/// Schema setup runs once per process on the first successful open. An
/// in-memory database loses its tables when closed, so it is set up again on
/// every open.
pub struct LazyConnection {
    target: DuckdbTarget,
    slot: Mutex<Option<Arc<Mutex<Connection>>>>,
    schema_ready: AtomicBool,
    init: SchemaInit,
}

impl LazyConnection {
    pub fn new(target: DuckdbTarget, init: SchemaInit) -> Self {
        Self {
            target,
            slot: Mutex::new(None),
            schema_ready: AtomicBool::new(false),
            init,
        }
    }

    pub fn target(&self) -> &DuckdbTarget {
        &self.target
    }

    pub async fn get(&self) -> Result<Arc<Mutex<Connection>>, DomainError> {
        let mut slot = self.slot.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(Arc::clone(conn));
        }

        debug!("Opening DuckDB connection to {}", self.target);
        let conn = self.target.open()?;

        let needs_schema = self.target == DuckdbTarget::InMemory
            || !self.schema_ready.load(Ordering::Acquire);
        if needs_schema {
            (self.init)(&conn)?;
            self.schema_ready.store(true, Ordering::Release);
            info!("DuckDB schema ready at {}", self.target);
        }

        let conn = Arc::new(Mutex::new(conn));
        *slot = Some(Arc::clone(&conn));
        Ok(conn)
    }

    /// Drops the handle. In-flight users keep their clone until they finish.
    pub async fn close(&self) {
        let mut slot = self.slot.lock().await;
        if slot.take().is_some() {
            debug!("Closed DuckDB connection to {}", self.target);
        }
    }

    #[cfg(test)]
    async fn is_connected(&self) -> bool {
        self.slot.lock().await.is_some()
    }
}
