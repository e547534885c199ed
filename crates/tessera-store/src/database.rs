//! Opaque persistent token store backed by SQLite.
//!
//! The identifier handed to clients is 160 random bits. Only its SHA-256
//! digest is stored, so a copy of the table cannot be replayed as tokens.
//! Expired rows are deleted by an [`ExpirySweeper`] owned by the store; a
//! row that is logically expired but not yet swept is still rejected by
//! comparing its expiry on every read.

use crate::sweeper::ExpirySweeper;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tessera_core::encoding::{random_id, sha256};
use tessera_core::{
    ConfidentialTokenStore, Guarantees, RequestContext, Result, SharedClock, TesseraError, Token,
    TokenId, TokenStore,
};

/// Random bytes in a database token identifier
const TOKEN_ID_BYTES: usize = 20;

/// SQLite token table
///
/// Keys are opaque strings chosen by the caller; [`DatabaseTokenStore`]
/// uses the hex SHA-256 digest of the identifier.
#[derive(Debug)]
pub struct TokenTable {
    /// SQLite has its own locking; the mutex is for `Connection: !Sync`
    conn: Arc<Mutex<Connection>>,
    clock: SharedClock,
}

impl TokenTable {
    /// Open (or create) the table at `path`; `:memory:` opens a private
    /// in-memory database
    pub fn open(path: impl AsRef<Path>, clock: SharedClock) -> Result<Self> {
        let path = path.as_ref();
        let conn = if path == Path::new(":memory:") {
            Connection::open_in_memory()
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            Connection::open(path)
        }
        .map_err(|e| {
            TesseraError::storage(format!(
                "failed to open token database at {}: {e}",
                path.display()
            ))
        })?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS tokens (
                token_id TEXT PRIMARY KEY,
                user_id TEXT,
                expiry INTEGER NOT NULL,
                attributes TEXT NOT NULL
            )",
            [],
        )
        .map_err(storage_error)?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS expired_token_idx ON tokens(expiry)",
            [],
        )
        .map_err(storage_error)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            clock,
        })
    }

    /// Insert a row
    pub fn insert(&self, key: &str, token: &Token) -> Result<()> {
        let attributes = serde_json::to_string(token.attributes())?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO tokens (token_id, user_id, expiry, attributes) VALUES (?1, ?2, ?3, ?4)",
            params![
                key,
                token.subject(),
                token.expiry().timestamp_millis(),
                attributes
            ],
        )
        .map_err(storage_error)?;
        Ok(())
    }

    /// Fetch a row regardless of its expiry
    pub fn get(&self, key: &str) -> Result<Option<Token>> {
        let row: Option<(Option<String>, i64, String)> = {
            let conn = self.conn.lock();
            conn.query_row(
                "SELECT user_id, expiry, attributes FROM tokens WHERE token_id = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(storage_error)?
        };

        let Some((subject, expiry_ms, attributes)) = row else {
            return Ok(None);
        };
        let expiry = Utc
            .timestamp_millis_opt(expiry_ms)
            .single()
            .ok_or_else(|| TesseraError::storage("token row has an unrepresentable expiry"))?;
        let attributes: BTreeMap<String, String> = serde_json::from_str(&attributes)
            .map_err(|e| TesseraError::storage(format!("corrupt token attributes: {e}")))?;
        Ok(Some(Token::from_parts(expiry, subject, attributes)))
    }

    /// Delete a row; `true` if it existed
    pub fn delete(&self, key: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let deleted = conn
            .execute("DELETE FROM tokens WHERE token_id = ?1", params![key])
            .map_err(storage_error)?;
        Ok(deleted > 0)
    }

    /// Delete every row whose expiry has passed; returns the count
    pub fn delete_expired(&self) -> Result<usize> {
        let now = self.clock.now().timestamp_millis();
        let conn = self.conn.lock();
        conn.execute("DELETE FROM tokens WHERE expiry < ?1", params![now])
            .map_err(storage_error)
    }

    /// Number of rows, expired or not
    pub fn len(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM tokens", [], |row| row.get(0))
            .map_err(storage_error)?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Whether the table has no rows
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

fn storage_error(err: rusqlite::Error) -> TesseraError {
    TesseraError::storage(err.to_string())
}

/// Run `op` against `table` on the blocking pool
///
/// SQLite calls block on disk I/O and on the connection mutex, so they stay
/// off the async worker threads.
pub(crate) async fn blocking<T, F>(table: Arc<TokenTable>, op: F) -> Result<T>
where
    F: FnOnce(&TokenTable) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || op(&table))
        .await
        .map_err(|e| TesseraError::internal(format!("token table task failed: {e}")))?
}

/// Hex SHA-256 of an identifier, the primary key of its row
pub(crate) fn row_key(token_id: &str) -> String {
    hex::encode(sha256(token_id))
}

/// Random identifier backed by a server-side row
#[derive(Debug)]
pub struct DatabaseTokenStore {
    table: Arc<TokenTable>,
    clock: SharedClock,
    sweeper: Option<ExpirySweeper>,
}

impl DatabaseTokenStore {
    /// Open the store at `path` without a sweeper
    pub fn open(path: impl AsRef<Path>, clock: SharedClock) -> Result<Self> {
        let table = TokenTable::open(path, clock.clone())?;
        Ok(Self {
            table: Arc::new(table),
            clock,
            sweeper: None,
        })
    }

    /// Private in-memory store
    pub fn in_memory(clock: SharedClock) -> Result<Self> {
        Self::open(":memory:", clock)
    }

    /// Start sweeping expired rows every `interval`
    ///
    /// Must be called from within a tokio runtime. The sweeper stops when
    /// the store is dropped.
    pub fn with_sweeper(mut self, interval: Duration) -> Result<Self> {
        if let Some(old) = self.sweeper.take() {
            old.shutdown();
        }
        self.sweeper = Some(ExpirySweeper::spawn(self.table.clone(), interval)?);
        Ok(self)
    }

    /// Run one sweep immediately on the calling thread
    pub fn sweep_now(&self) -> Result<usize> {
        self.table.delete_expired()
    }

    /// The running sweeper, if any
    pub fn sweeper(&self) -> Option<&ExpirySweeper> {
        self.sweeper.as_ref()
    }

    /// Stop the sweeper; the store itself stays usable
    pub fn shutdown(&self) {
        if let Some(sweeper) = &self.sweeper {
            sweeper.shutdown();
        }
    }

    /// Underlying table
    pub fn table(&self) -> &Arc<TokenTable> {
        &self.table
    }
}

#[async_trait]
impl TokenStore for DatabaseTokenStore {
    fn backend(&self) -> &'static str {
        "database"
    }

    fn guarantees(&self) -> Guarantees {
        Guarantees::NONE.with_confidential().with_revocable()
    }

    async fn create(&self, _ctx: &RequestContext, token: Token) -> Result<TokenId> {
        let id = random_id::<TOKEN_ID_BYTES>();
        let key = row_key(&id);
        blocking(self.table.clone(), move |table| table.insert(&key, &token)).await?;
        Ok(TokenId::new(id))
    }

    async fn read(&self, _ctx: &RequestContext, token_id: &TokenId) -> Result<Option<Token>> {
        let key = row_key(token_id.as_str());
        let token = blocking(self.table.clone(), move |table| table.get(&key)).await?;
        Ok(token.filter(|t| t.is_valid_at(self.clock.now())))
    }

    async fn revoke(&self, _ctx: &RequestContext, token_id: &TokenId) -> Result<()> {
        let key = row_key(token_id.as_str());
        blocking(self.table.clone(), move |table| table.delete(&key)).await?;
        Ok(())
    }
}

impl ConfidentialTokenStore for DatabaseTokenStore {}
