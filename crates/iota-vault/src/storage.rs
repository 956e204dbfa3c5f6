use iota_core::{
    Capability, CapabilitySet, IotaError, IotaResult, TokenRecord, TokenStore, TokenUpdate,
};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite token table.
///
/// One row per token: name, Argon2 PHC hash of the secret, and the
/// canonical permission string. The connection sits behind a `Mutex`, so
/// each call is serialized; nothing spans calls.
pub struct SqliteTokenStore {
    conn: Mutex<Connection>,
}

impl SqliteTokenStore {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: impl AsRef<Path>) -> IotaResult<Self> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| IotaError::Storage(format!("failed to open database: {}", e)))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS tokens (
                name TEXT PRIMARY KEY NOT NULL,
                secret_hash TEXT NOT NULL,
                permissions TEXT NOT NULL,
                created_at TEXT DEFAULT (datetime('now')),
                updated_at TEXT DEFAULT (datetime('now'))
            );",
        )
        .map_err(|e| IotaError::Storage(format!("failed to create tables: {}", e)))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> IotaResult<Self> {
        Self::open(":memory:")
    }

    fn conn(&self) -> IotaResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| IotaError::Storage(format!("lock poisoned: {}", e)))
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<TokenRecord> {
    let permissions: String = row.get(2)?;
    Ok(TokenRecord {
        name: row.get(0)?,
        secret_hash: row.get(1)?,
        capabilities: CapabilitySet::sanitize(&permissions),
    })
}

fn storage_err(what: &str) -> impl Fn(rusqlite::Error) -> IotaError + '_ {
    move |e| IotaError::Storage(format!("{} failed: {}", what, e))
}

impl TokenStore for SqliteTokenStore {
    fn insert(&self, record: &TokenRecord) -> IotaResult<bool> {
        let conn = self.conn()?;
        let rows = conn
            .execute(
                "INSERT OR IGNORE INTO tokens (name, secret_hash, permissions) VALUES (?1, ?2, ?3)",
                params![
                    record.name,
                    record.secret_hash,
                    record.capabilities.as_permission_string()
                ],
            )
            .map_err(storage_err("insert"))?;
        Ok(rows > 0)
    }

    fn get(&self, name: &str) -> IotaResult<Option<TokenRecord>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT name, secret_hash, permissions FROM tokens WHERE name = ?1",
            params![name],
            row_to_record,
        )
        .optional()
        .map_err(storage_err("query"))
    }

    fn list(&self) -> IotaResult<Vec<TokenRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT name, secret_hash, permissions FROM tokens ORDER BY name")
            .map_err(storage_err("prepare"))?;
        let rows = stmt
            .query_map([], row_to_record)
            .map_err(storage_err("query"))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(storage_err("row decode"))
    }

    fn update(&self, name: &str, update: &TokenUpdate) -> IotaResult<bool> {
        if update.is_empty() {
            return Ok(self.get(name)?.is_some());
        }
        let conn = self.conn()?;
        let rows = conn
            .execute(
                "UPDATE tokens SET
                    secret_hash = COALESCE(?2, secret_hash),
                    permissions = COALESCE(?3, permissions),
                    updated_at = datetime('now')
                 WHERE name = ?1",
                params![
                    name,
                    update.secret_hash,
                    update.capabilities.map(|c| c.as_permission_string())
                ],
            )
            .map_err(storage_err("update"))?;
        Ok(rows > 0)
    }

    fn delete(&self, name: &str) -> IotaResult<bool> {
        let conn = self.conn()?;
        let rows = conn
            .execute("DELETE FROM tokens WHERE name = ?1", params![name])
            .map_err(storage_err("delete"))?;
        Ok(rows > 0)
    }

    fn granting(&self, capability: Capability) -> IotaResult<Vec<TokenRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT name, secret_hash, permissions FROM tokens
                 WHERE instr(permissions, ?1) > 0 OR instr(permissions, 'a') > 0
                 ORDER BY name",
            )
            .map_err(storage_err("prepare"))?;
        let rows = stmt
            .query_map(params![capability.letter().to_string()], row_to_record)
            .map_err(storage_err("query"))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(storage_err("row decode"))
    }
}
