use rusqlite::{Connection, OptionalExtension};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),
    #[error("Failed to create database directory: {0}")]
    DirectoryError(String),
}

/// Name under which each ledger collection is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKey {
    Clients,
    Payments,
    Notifications,
}

impl CollectionKey {
    pub const ALL: [CollectionKey; 3] = [
        CollectionKey::Clients,
        CollectionKey::Payments,
        CollectionKey::Notifications,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionKey::Clients => "clients",
            CollectionKey::Payments => "payments",
            CollectionKey::Notifications => "notifications",
        }
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable storage of whole collections.
///
/// Payloads are opaque serialized snapshots; the ledger decides how to encode
/// them and what to do when a call fails.
pub trait PersistenceGateway {
    /// Read the last saved snapshot, `None` if the collection was never saved
    fn load_collection(&self, key: CollectionKey) -> Result<Option<String>, DatabaseError>;

    /// Replace the stored snapshot
    fn save_collection(&self, key: CollectionKey, payload: &str) -> Result<(), DatabaseError>;
}

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Create a new database connection and initialize the schema
    pub fn new(path: &str) -> Result<Self, DatabaseError> {
        let db_path = PathBuf::from(path);

        // Create parent directory if it doesn't exist
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| DatabaseError::DirectoryError(e.to_string()))?;
            }
        }

        let conn = Connection::open(&db_path)?;

        let db = Database { conn };
        db.initialize_schema()?;

        Ok(db)
    }

    /// Open a throwaway database that lives only as long as the connection
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let db = Database {
            conn: Connection::open_in_memory()?,
        };
        db.initialize_schema()?;
        Ok(db)
    }

    /// Single key/value table, one row per collection
    fn initialize_schema(&self) -> Result<(), DatabaseError> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS collections (
                key             TEXT PRIMARY KEY,
                payload         TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            )",
            [],
        )?;

        Ok(())
    }

    /// Timestamp of the last save of a collection
    pub fn last_saved_at(&self, key: CollectionKey) -> Result<Option<String>, DatabaseError> {
        let updated_at = self
            .conn
            .query_row(
                "SELECT updated_at FROM collections WHERE key = ?1",
                rusqlite::params![key.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(updated_at)
    }
}

impl PersistenceGateway for Database {
    fn load_collection(&self, key: CollectionKey) -> Result<Option<String>, DatabaseError> {
        let payload = self
            .conn
            .query_row(
                "SELECT payload FROM collections WHERE key = ?1",
                rusqlite::params![key.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(payload)
    }

    fn save_collection(&self, key: CollectionKey, payload: &str) -> Result<(), DatabaseError> {
        let now = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
        self.conn.execute(
            "INSERT INTO collections (key, payload, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET payload = excluded.payload, updated_at = excluded.updated_at",
            rusqlite::params![key.as_str(), payload, now],
        )?;
        Ok(())
    }
}
