//! User directory backed by SQLite

use rusqlite::{params, OptionalExtension, Row};

use super::models::{Identity, NewIdentity};
use crate::db::{is_constraint_violation, Database, StoreError, StoreResult};

const IDENTITY_COLUMNS: &str =
    "id, first_name, last_name, email, age, role, password_hash, created_at";

/// Lookup/create access to the persistent user collection
pub struct UserDatabase {
    db: Database,
}

impl UserDatabase {
    /// Wrap a database and make sure the users table exists
    pub fn new(db: Database) -> StoreResult<Self> {
        let users = Self { db };
        users.init_tables()?;
        Ok(users)
    }

    /// Create in-memory directory (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        Self::new(Database::in_memory()?)
    }

    fn init_tables(&self) -> StoreResult<()> {
        let conn = self.db.lock()?;
        // UNIQUE(email) closes the register check-then-create race.
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                email TEXT UNIQUE NOT NULL,
                age INTEGER NOT NULL,
                role TEXT NOT NULL DEFAULT 'user',
                password_hash TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);
            "#,
        )?;
        Ok(())
    }

    /// Create a new identity
    pub fn create(&self, fields: NewIdentity) -> StoreResult<Identity> {
        let identity = Identity {
            id: uuid::Uuid::new_v4().to_string(),
            first_name: fields.first_name,
            last_name: fields.last_name,
            email: fields.email,
            age: fields.age,
            role: fields.role,
            password_hash: fields.password_hash,
            created_at: chrono::Utc::now().to_rfc3339(),
        };

        let conn = self.db.lock()?;
        conn.execute(
            "INSERT INTO users (id, first_name, last_name, email, age, role, password_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                identity.id,
                identity.first_name,
                identity.last_name,
                identity.email,
                identity.age,
                identity.role.as_str(),
                identity.password_hash,
                identity.created_at,
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                StoreError::DuplicateEmail
            } else {
                StoreError::Sqlite(e)
            }
        })?;

        Ok(identity)
    }

    /// Find identity by email
    pub fn find_by_email(&self, email: &str) -> StoreResult<Option<Identity>> {
        let conn = self.db.lock()?;
        let identity = conn
            .query_row(
                &format!("SELECT {IDENTITY_COLUMNS} FROM users WHERE email = ?1"),
                params![email],
                identity_from_row,
            )
            .optional()?;
        Ok(identity)
    }

    /// Find identity by ID
    pub fn find_by_id(&self, id: &str) -> StoreResult<Option<Identity>> {
        let conn = self.db.lock()?;
        let identity = conn
            .query_row(
                &format!("SELECT {IDENTITY_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                identity_from_row,
            )
            .optional()?;
        Ok(identity)
    }

    /// Number of identities registered under an email
    pub fn count_by_email(&self, email: &str) -> StoreResult<usize> {
        let conn = self.db.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM users WHERE email = ?1",
            params![email],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    #[cfg(test)]
    pub(crate) fn drop_table_for_test(&self) {
        self.db
            .lock()
            .unwrap()
            .execute_batch("DROP TABLE users;")
            .unwrap();
    }
}

impl Clone for UserDatabase {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
        }
    }
}

fn identity_from_row(row: &Row<'_>) -> rusqlite::Result<Identity> {
    let role: String = row.get(5)?;
    Ok(Identity {
        id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        email: row.get(3)?,
        age: row.get(4)?,
        role: role.parse().unwrap_or_default(),
        password_hash: row.get(6)?,
        created_at: row.get(7)?,
    })
}
