//! Shared SQLite connection
//!
//! The user directory and the cart store live in the same database file and
//! share one connection. Each store creates its own tables.

use rusqlite::{Connection, Result as SqliteResult};
use std::sync::{Arc, Mutex, MutexGuard};

/// Errors raised by the persistent stores
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Email already registered")]
    DuplicateEmail,

    #[error("Product code already exists")]
    DuplicateCode,

    #[error("Cart quantity out of range")]
    QuantityOverflow,

    #[error("Purchase total out of range")]
    AmountOverflow,

    #[error("Database connection lock poisoned")]
    LockPoisoned,
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Database connection wrapper
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) a database file
    pub fn open(path: &str) -> SqliteResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create in-memory database (for testing)
    pub fn in_memory() -> SqliteResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
        }
    }
}

/// True when a rusqlite error is a UNIQUE/constraint violation
pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
