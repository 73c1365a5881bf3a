//! Read-only connection management for chat.db
//!
//! The store is owned by a live Messages.app process, so the connection is
//! opened read-only with `query_only` set and never takes a write lock. It is
//! opened lazily: a server without Full Disk Access still starts and reports
//! the store as unavailable per call.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{Connection, ErrorCode, OpenFlags};

use super::body;
use super::schema::StoreSchema;
use crate::error::{ErrorKind, IMessageError, Result};
use crate::types::StoreConfig;

struct OpenStore {
    conn: Connection,
    schema: StoreSchema,
}

/// Read-only handle on the Messages database
pub struct Store {
    config: StoreConfig,
    state: Arc<Mutex<Option<OpenStore>>>,
}

impl Store {
    /// Create a store handle; the database is opened on first use
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(None)),
        }
    }

    /// Create a store handle and open the database immediately
    pub fn open(config: StoreConfig) -> Result<Self> {
        let store = Self::new(config);
        store.with_connection(|_, _| Ok(()))?;
        Ok(store)
    }

    fn connect(config: &StoreConfig) -> Result<OpenStore> {
        let path = config.db_path.as_path();
        if !path.exists() {
            return Err(IMessageError::Unavailable(format!(
                "Messages database not found at {}. Make sure this is macOS and the \
                 host process has Full Disk Access.",
                path.display()
            )));
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_NO_MUTEX
            | OpenFlags::SQLITE_OPEN_URI;

        let conn =
            Connection::open_with_flags(path, flags).map_err(|e| classify_open_error(path, e))?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        conn.pragma_update(None, "query_only", true)?;
        body::register(&conn)?;

        // First real read: on macOS a TCC denial only surfaces here
        let schema = StoreSchema::introspect(&conn).map_err(|e| match e {
            IMessageError::Database(e) => classify_open_error(path, e),
            other => other,
        })?;

        tracing::debug!(
            "Opened Messages database {} (date scale {:?})",
            path.display(),
            schema.date_scale
        );

        Ok(OpenStore { conn, schema })
    }

    /// Execute a function with the connection and its schema.
    ///
    /// The connection is (re)opened if needed. File-level failures drop it so
    /// the next call retries the open after permissions change.
    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection, &StoreSchema) -> Result<T>,
    {
        let mut state = self.state.lock();
        if state.is_none() {
            *state = Some(Self::connect(&self.config)?);
        }
        let open = state
            .as_ref()
            .ok_or_else(|| IMessageError::Unavailable("Messages database is not open".into()))?;

        let result = f(&open.conn, &open.schema);
        if let Err(IMessageError::Database(ref e)) = result {
            if is_file_level(e) {
                tracing::warn!("Dropping Messages database connection after: {}", e);
                *state = None;
            }
        }
        result
    }

    /// Whether the database can currently be opened and read
    pub fn probe(&self) -> Result<()> {
        self.with_connection(|conn, _| {
            conn.query_row("SELECT COUNT(*) FROM message LIMIT 1", [], |row| {
                row.get::<_, i64>(0)
            })?;
            Ok(())
        })
    }

    /// The chat guid Messages.app should address for `chat_id`.
    ///
    /// Accepts a chat identifier or guid. An unknown chat is `NotFound`; if
    /// the store cannot be read at all the id is passed through and
    /// Messages.app decides.
    pub fn chat_send_target(&self, chat_id: &str) -> Result<String> {
        match self.with_connection(|conn, _| super::queries::get_chat_guid(conn, chat_id)) {
            Err(e) if e.kind() == ErrorKind::Unavailable => {
                tracing::warn!("Cannot resolve chat {} from the store: {}", chat_id, e);
                Ok(chat_id.to_string())
            }
            other => other,
        }
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.config.db_path
    }

    /// Get configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }
}

impl Clone for Store {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            state: self.state.clone(),
        }
    }
}

fn sqlite_code(e: &rusqlite::Error) -> Option<ErrorCode> {
    match e {
        rusqlite::Error::SqliteFailure(err, _) => Some(err.code),
        _ => None,
    }
}

fn is_file_level(e: &rusqlite::Error) -> bool {
    matches!(
        sqlite_code(e),
        Some(
            ErrorCode::CannotOpen
                | ErrorCode::PermissionDenied
                | ErrorCode::AuthorizationForStatementDenied
                | ErrorCode::NotADatabase
                | ErrorCode::SystemIoFailure
        )
    )
}

fn classify_open_error(path: &Path, e: rusqlite::Error) -> IMessageError {
    match sqlite_code(&e) {
        Some(ErrorCode::CannotOpen)
        | Some(ErrorCode::PermissionDenied)
        | Some(ErrorCode::AuthorizationForStatementDenied) => {
            IMessageError::Unavailable(format!(
                "Cannot open Messages database at {} ({}). Grant Full Disk Access to \
                 the terminal or app running this server.",
                path.display(),
                e
            ))
        }
        Some(ErrorCode::NotADatabase) => IMessageError::Unavailable(format!(
            "{} is not a SQLite database",
            path.display()
        )),
        _ => IMessageError::Database(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_database_is_unavailable() {
        let store = Store::new(StoreConfig {
            db_path: "/nonexistent/Library/Messages/chat.db".into(),
            busy_timeout_ms: 100,
        });
        let err = store.probe().unwrap_err();
        assert!(matches!(err, IMessageError::Unavailable(ref m) if m.contains("Full Disk Access")));
    }

    #[test]
    fn test_chat_send_target_passes_through_when_unavailable() {
        let store = Store::new(StoreConfig {
            db_path: "/nonexistent/Library/Messages/chat.db".into(),
            busy_timeout_ms: 100,
        });
        assert_eq!(store.chat_send_target("chat42").unwrap(), "chat42");
    }

    #[test]
    fn test_not_a_database_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.db");
        std::fs::write(&path, b"definitely not sqlite, just some bytes padding it out").unwrap();

        let err = Store::open(StoreConfig {
            db_path: path,
            busy_timeout_ms: 100,
        })
        .err()
        .unwrap();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
    }
}
