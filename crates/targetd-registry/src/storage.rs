//! Durable storage for the target registry.
//!
//! # Rust Learning Note
//!
//! The store is a trait, [`RegistryStore`], with one real implementation,
//! [`SqliteStore`]. Every method takes `&self`: the store is shared behind an
//! `Arc` by all request handlers, and the locking lives inside it.
//!
//! ## Transactions
//!
//! ```text
//! writer: Mutex<Connection>        one write transaction at a time, globally
//! readers: Vec<Mutex<Connection>>  read-only connections, round-robin
//! ```
//!
//! The database runs in WAL mode. A write commits with `synchronous = FULL`,
//! so once `put` returns the entry survives a crash. A read transaction sees
//! the WAL snapshot taken at its first statement; readers never wait for the
//! writer and never see half of a write.
//!
//! `parking_lot::Mutex` does not poison, so a transaction that fails (and is
//! rolled back when it drops) leaves the connection usable for the next one.

use parking_lot::{Mutex, MutexGuard};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use targetd_common::{Error, Kind, Listing, Payload, Result, TargetKey};
use tracing::{debug, info};

/// On-disk schema version, stored in `PRAGMA user_version`.
const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS namespaces (
    kind TEXT PRIMARY KEY NOT NULL
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS entries (
    kind    TEXT NOT NULL REFERENCES namespaces (kind),
    key     TEXT NOT NULL,
    payload BLOB NOT NULL,
    PRIMARY KEY (kind, key)
) WITHOUT ROWID;
";

/// Storage contract used by the registry service.
///
/// Each method runs as exactly one atomic transaction.
pub trait RegistryStore: Send + Sync {
    /// Creates the namespace for `kind` if it does not exist yet.
    fn ensure_namespace(&self, kind: &Kind) -> Result<()>;

    /// Writes or overwrites an entry. Fails with `NamespaceNotFound` when the
    /// namespace was never created.
    fn put(&self, kind: &Kind, key: &TargetKey, payload: &Payload) -> Result<()>;

    /// Creates the namespace if needed and writes the entry in one transaction.
    fn put_creating(&self, kind: &Kind, key: &TargetKey, payload: &Payload) -> Result<()>;

    /// Removes an entry. Absent entries and absent namespaces are a no-op.
    fn delete(&self, kind: &Kind, key: &TargetKey) -> Result<()>;

    /// Returns a snapshot of every entry in the namespace.
    fn list_all(&self, kind: &Kind) -> Result<Listing>;
}

/// Tuning knobs for [`SqliteStore`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// How long a connection waits on a locked database before failing.
    pub busy_timeout: Duration,
    /// Number of read-only connections.
    pub read_pool_size: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_millis(5_000),
            read_pool_size: 4,
        }
    }
}

/// SQLite-backed registry store.
pub struct SqliteStore {
    path: PathBuf,
    /// Single writer connection; holding the lock is holding the write slot.
    writer: Mutex<Connection>,
    /// Read-only connections used by `list_all`.
    readers: Vec<Mutex<Connection>>,
    /// Round-robin cursor into `readers`.
    next_reader: AtomicUsize,
}

impl SqliteStore {
    /// Opens (or creates) the database file at `path`.
    pub fn open(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if options.read_pool_size == 0 {
            return Err(Error::config("read_pool_size must be greater than zero"));
        }

        let mut writer = Connection::open(&path).map_err(|e| {
            Error::storage(format!("Could not open {}: {}", path.display(), e))
        })?;
        configure_writer(&mut writer, options.busy_timeout)?;

        let readers = (0..options.read_pool_size)
            .map(|_| open_reader(&path, options.busy_timeout).map(Mutex::new))
            .collect::<Result<Vec<_>>>()?;

        info!(
            "Opened registry store at {} ({} read connections)",
            path.display(),
            readers.len()
        );

        Ok(Self {
            path,
            writer: Mutex::new(writer),
            readers,
            next_reader: AtomicUsize::new(0),
        })
    }

    /// Opens the store with default options.
    pub fn open_default(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(path, StoreOptions::default())
    }

    /// Returns the database file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `f` inside an immediate write transaction and commits it.
    ///
    /// An error from `f` drops the transaction, which rolls it back.
    fn write<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.writer.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(storage_failure)?;
        let value = f(&tx)?;
        tx.commit().map_err(storage_failure)?;
        Ok(value)
    }

    /// Runs `f` inside a deferred read transaction on a pooled connection.
    fn read<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.reader();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Deferred)
            .map_err(storage_failure)?;
        let value = f(&tx)?;
        tx.commit().map_err(storage_failure)?;
        Ok(value)
    }

    /// Picks a free read connection, or waits on the next one in turn.
    fn reader(&self) -> MutexGuard<'_, Connection> {
        let start = self.next_reader.fetch_add(1, Ordering::Relaxed);
        let len = self.readers.len();
        for offset in 0..len {
            if let Some(guard) = self.readers[(start + offset) % len].try_lock() {
                return guard;
            }
        }
        self.readers[start % len].lock()
    }
}

impl RegistryStore for SqliteStore {
    fn ensure_namespace(&self, kind: &Kind) -> Result<()> {
        let created = self.write(|tx| insert_namespace(tx, kind))?;
        if created {
            info!("Created namespace: {}", kind);
        }
        Ok(())
    }

    fn put(&self, kind: &Kind, key: &TargetKey, payload: &Payload) -> Result<()> {
        self.write(|tx| {
            if !namespace_exists(tx, kind)? {
                return Err(Error::namespace_not_found(kind.as_str()));
            }
            upsert_entry(tx, kind, key, payload)
        })?;
        debug!("Stored {}/{} ({} bytes)", kind, key, payload.len());
        Ok(())
    }

    fn put_creating(&self, kind: &Kind, key: &TargetKey, payload: &Payload) -> Result<()> {
        let created = self.write(|tx| {
            let created = insert_namespace(tx, kind)?;
            upsert_entry(tx, kind, key, payload)?;
            Ok(created)
        })?;
        if created {
            info!("Created namespace: {}", kind);
        }
        debug!("Stored {}/{} ({} bytes)", kind, key, payload.len());
        Ok(())
    }

    fn delete(&self, kind: &Kind, key: &TargetKey) -> Result<()> {
        let removed = self.write(|tx| {
            tx.execute(
                "DELETE FROM entries WHERE kind = ?1 AND key = ?2",
                params![kind.as_str(), key.as_str()],
            )
            .map_err(storage_failure)
        })?;
        debug!("Deleted {}/{} ({} rows)", kind, key, removed);
        Ok(())
    }

    fn list_all(&self, kind: &Kind) -> Result<Listing> {
        self.read(|tx| {
            if !namespace_exists(tx, kind)? {
                return Err(Error::namespace_not_found(kind.as_str()));
            }

            let mut stmt = tx
                .prepare_cached("SELECT key, payload FROM entries WHERE kind = ?1")
                .map_err(storage_failure)?;
            let rows = stmt
                .query_map(params![kind.as_str()], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
                })
                .map_err(storage_failure)?;

            let mut listing = Listing::new();
            for row in rows {
                let (key, payload) = row.map_err(storage_failure)?;
                listing.insert(TargetKey::from(key), Payload::from(payload));
            }
            Ok(listing)
        })
    }
}

fn storage_failure(err: rusqlite::Error) -> Error {
    Error::storage(err.to_string())
}

/// Switches the file to WAL, makes commits durable and installs the schema.
fn configure_writer(conn: &mut Connection, busy_timeout: Duration) -> Result<()> {
    conn.busy_timeout(busy_timeout).map_err(storage_failure)?;

    let mode: String = conn
        .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
        .map_err(storage_failure)?;
    if !mode.eq_ignore_ascii_case("wal") {
        return Err(Error::storage(format!(
            "Database does not support WAL journaling (journal_mode = {})",
            mode
        )));
    }

    conn.pragma_update(None, "synchronous", "FULL")
        .map_err(storage_failure)?;
    conn.pragma_update(None, "foreign_keys", "ON")
        .map_err(storage_failure)?;

    let version: i64 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(storage_failure)?;

    match version {
        0 => {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(storage_failure)?;
            tx.execute_batch(SCHEMA).map_err(storage_failure)?;
            tx.pragma_update(None, "user_version", SCHEMA_VERSION)
                .map_err(storage_failure)?;
            tx.commit().map_err(storage_failure)?;
            debug!("Installed registry schema v{}", SCHEMA_VERSION);
            Ok(())
        }
        SCHEMA_VERSION => Ok(()),
        other => Err(Error::storage(format!(
            "Unsupported registry schema version {} (expected {})",
            other, SCHEMA_VERSION
        ))),
    }
}

fn open_reader(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| {
        Error::storage(format!(
            "Could not open read connection to {}: {}",
            path.display(),
            e
        ))
    })?;
    conn.busy_timeout(busy_timeout).map_err(storage_failure)?;
    Ok(conn)
}

/// Returns true when the namespace row was newly inserted.
fn insert_namespace(tx: &Transaction<'_>, kind: &Kind) -> Result<bool> {
    let inserted = tx
        .execute(
            "INSERT OR IGNORE INTO namespaces (kind) VALUES (?1)",
            params![kind.as_str()],
        )
        .map_err(storage_failure)?;
    Ok(inserted > 0)
}

fn namespace_exists(tx: &Transaction<'_>, kind: &Kind) -> Result<bool> {
    let found = tx
        .query_row(
            "SELECT 1 FROM namespaces WHERE kind = ?1",
            params![kind.as_str()],
            |_| Ok(()),
        )
        .optional()
        .map_err(storage_failure)?;
    Ok(found.is_some())
}

fn upsert_entry(
    tx: &Transaction<'_>,
    kind: &Kind,
    key: &TargetKey,
    payload: &Payload,
) -> Result<()> {
    tx.execute(
        "INSERT INTO entries (kind, key, payload) VALUES (?1, ?2, ?3)
         ON CONFLICT (kind, key) DO UPDATE SET payload = excluded.payload",
        params![kind.as_str(), key.as_str(), payload.as_bytes()],
    )
    .map_err(storage_failure)?;
    Ok(())
}
