//! SQLite store backend.
//!
//! The durable corpus lives in a single-file SQLite database (bundled
//! build, no system dependency). Identifiers fit in SQLite's signed 64-bit
//! integers via a lossless bit cast. Schema changes go through a versioned,
//! idempotent migration keyed on `PRAGMA user_version`.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::error::Result;
use crate::ident::Identifier;

use super::{KnownIdentifier, KnownIdentifierStore};

/// Schema version this build writes and expects
const SCHEMA_VERSION: i32 = 1;

/// Durable store backed by a SQLite database file.
///
/// Thread-safe via an internal mutex around the single connection; every
/// operation is a short transaction, so contention stays negligible next to
/// search time.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (creating and migrating if necessary) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens a private in-memory database, mainly for tests.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        f(&conn)
    }
}

/// Brings the schema up to [`SCHEMA_VERSION`]. Idempotent.
fn migrate(conn: &Connection) -> Result<()> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version >= SCHEMA_VERSION {
        return Ok(());
    }

    debug!(from = version, to = SCHEMA_VERSION, "migrating store schema");

    if version < 1 {
        conn.execute_batch(
            "BEGIN;
             CREATE TABLE IF NOT EXISTS known_identifiers (
                 identifier   INTEGER PRIMARY KEY,
                 provenance   TEXT NOT NULL,
                 collected_at INTEGER NOT NULL
             );
             CREATE TABLE IF NOT EXISTS provenance_tags (
                 identifier   INTEGER NOT NULL,
                 provenance   TEXT NOT NULL,
                 PRIMARY KEY (identifier, provenance)
             ) WITHOUT ROWID;
             PRAGMA user_version = 1;
             COMMIT;",
        )?;
    }

    Ok(())
}

impl KnownIdentifierStore for SqliteStore {
    fn contains(&self, id: Identifier) -> Result<bool> {
        self.with_conn(|conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM known_identifiers WHERE identifier = ?1)",
                params![id as i64],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    fn all(&self) -> Result<std::collections::BTreeSet<Identifier>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT identifier FROM known_identifiers ORDER BY identifier")?;
            let ids = stmt
                .query_map([], |row| row.get::<_, i64>(0).map(|v| v as u64))?
                .collect::<rusqlite::Result<std::collections::BTreeSet<_>>>()?;
            Ok(ids)
        })
    }

    fn insert_if_absent(&self, record: &KnownIdentifier) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO known_identifiers (identifier, provenance, collected_at)
                 VALUES (?1, ?2, ?3)",
                params![record.id as i64, record.provenance, record.collected_at],
            )?;
            conn.execute(
                "INSERT OR IGNORE INTO provenance_tags (identifier, provenance)
                 VALUES (?1, ?2)",
                params![record.id as i64, record.provenance],
            )?;
            Ok(inserted > 0)
        })
    }

    fn sources(&self, id: Identifier) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT provenance FROM provenance_tags WHERE identifier = ?1 ORDER BY provenance",
            )?;
            let tags = stmt
                .query_map(params![id as i64], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(tags)
        })
    }

    fn count(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM known_identifiers", [], |row| {
                    row.get(0)
                })?;
            Ok(count as u64)
        })
    }
}

impl SqliteStore {
    /// First-writer record for `id`, if any.
    ///
    /// Not part of the store trait; the CLI uses it for detail display.
    pub fn lookup(&self, id: Identifier) -> Result<Option<KnownIdentifier>> {
        self.with_conn(|conn| {
            let record = conn
                .query_row(
                    "SELECT identifier, provenance, collected_at
                     FROM known_identifiers WHERE identifier = ?1",
                    params![id as i64],
                    |row| {
                        Ok(KnownIdentifier {
                            id: row.get::<_, i64>(0)? as u64,
                            provenance: row.get(1)?,
                            collected_at: row.get(2)?,
                        })
                    },
                )
                .optional()?;
            Ok(record)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_insert_if_absent_is_idempotent() {
        let store = SqliteStore::open_memory().unwrap();
        let record = KnownIdentifier::new(3_546_921_440_381_311, "capture-a", 1_700_000_000_000);

        assert!(store.insert_if_absent(&record).unwrap());
        assert!(!store.insert_if_absent(&record).unwrap());
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_first_writer_wins_but_tags_accumulate() {
        let store = SqliteStore::open_memory().unwrap();
        store
            .insert_if_absent(&KnownIdentifier::new(42, "capture-a", 1))
            .unwrap();
        store
            .insert_if_absent(&KnownIdentifier::new(42, "capture-b", 2))
            .unwrap();

        let record = store.lookup(42).unwrap().unwrap();
        assert_eq!(record.provenance, "capture-a");
        assert_eq!(record.collected_at, 1);
        assert_eq!(
            store.sources(42).unwrap(),
            vec!["capture-a".to_string(), "capture-b".to_string()]
        );
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("known.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .insert_if_absent(&KnownIdentifier::new(710, "seed", 0))
                .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert!(store.contains(710).unwrap());
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_all_is_ascending() {
        let store = SqliteStore::open_memory().unwrap();
        for id in [30u64, 10, 20] {
            store
                .insert_if_absent(&KnownIdentifier::new(id, "seed", 0))
                .unwrap();
        }
        let all: Vec<u64> = store.all().unwrap().into_iter().collect();
        assert_eq!(all, vec![10, 20, 30]);
    }

    #[test]
    fn test_migration_is_idempotent() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("known.db");
        drop(SqliteStore::open(&path).unwrap());
        drop(SqliteStore::open(&path).unwrap());
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }
}
