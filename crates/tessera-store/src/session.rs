//! Session-bound token store.
//!
//! The token lives in a server-side session whose identifier travels in the
//! session cookie. The identifier returned from `create` is
//! `base64url(SHA-256(session_id))`: a second, anti-forgery value the client
//! must present alongside the cookie on every request.
//!
//! Idle sessions are dropped when next looked up, and in bulk by an
//! [`ExpirySweeper`] started with [`SessionTokenStore::with_sweeper`].

use crate::sweeper::ExpirySweeper;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tessera_core::encoding::{
    base64url_decode, base64url_encode, constant_time_eq, random_id, sha256,
};
use tessera_core::{
    ConfidentialTokenStore, Guarantees, RequestContext, Result, SharedClock, Token, TokenId,
    TokenStore,
};
use tokio::sync::RwLock;

/// Random bytes in a session identifier
const SESSION_ID_BYTES: usize = 32;

#[derive(Debug, Clone)]
struct SessionRecord {
    token: Token,
    idle_expiry: DateTime<Utc>,
}

/// In-process session container
///
/// Sessions expire after `ttl` without access. Clones share the same
/// sessions.
#[derive(Debug, Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, SessionRecord>>>,
    ttl: Duration,
    clock: SharedClock,
}

impl SessionRegistry {
    /// Registry whose sessions idle out after `ttl`
    pub fn new(ttl: Duration, clock: SharedClock) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl,
            clock,
        }
    }

    /// Start a session holding `token`; returns its identifier
    pub async fn create(&self, token: Token) -> String {
        let id = random_id::<SESSION_ID_BYTES>();
        let record = SessionRecord {
            token,
            idle_expiry: self.clock.now() + self.ttl,
        };
        self.sessions.write().await.insert(id.clone(), record);
        id
    }

    /// Token held by a live session; refreshes its idle expiry
    pub async fn get(&self, id: &str) -> Option<Token> {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().await;
        let record = sessions.get_mut(id)?;
        if record.idle_expiry <= now {
            sessions.remove(id);
            return None;
        }
        record.idle_expiry = now + self.ttl;
        Some(record.token.clone())
    }

    /// End a session; `true` if it existed
    pub async fn invalidate(&self, id: &str) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    /// Drop idle sessions; returns how many were removed
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, record| record.idle_expiry > now);
        before - sessions.len()
    }

    /// Number of sessions, live or idle
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether there are no sessions
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

fn anti_forgery_value(session_id: &str) -> [u8; 32] {
    sha256(session_id)
}

/// Token bound to the caller's session
#[derive(Debug)]
pub struct SessionTokenStore {
    registry: SessionRegistry,
    clock: SharedClock,
    sweeper: Option<ExpirySweeper>,
}

impl SessionTokenStore {
    /// Store keeping tokens in `registry`, without a sweeper
    pub fn new(registry: SessionRegistry, clock: SharedClock) -> Self {
        Self {
            registry,
            clock,
            sweeper: None,
        }
    }

    /// Start purging idle sessions every `interval`
    ///
    /// Must be called from within a tokio runtime. The sweeper stops when
    /// the store is dropped.
    pub fn with_sweeper(mut self, interval: std::time::Duration) -> Result<Self> {
        if let Some(old) = self.sweeper.take() {
            old.shutdown();
        }
        let sweeper = ExpirySweeper::spawn_for_sessions(self.registry.clone(), interval)?;
        self.sweeper = Some(sweeper);
        Ok(self)
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

    /// Backing session registry
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// The session id from the cookie, if `token_id` is its anti-forgery value
    fn verified_session(ctx: &RequestContext, token_id: &TokenId) -> Option<String> {
        let session_id = ctx.session().get()?;
        let provided = base64url_decode(token_id.as_str())?;
        constant_time_eq(&provided, &anti_forgery_value(&session_id)).then_some(session_id)
    }
}

#[async_trait]
impl TokenStore for SessionTokenStore {
    fn backend(&self) -> &'static str {
        "session"
    }

    fn guarantees(&self) -> Guarantees {
        Guarantees::NONE.with_confidential().with_revocable()
    }

    async fn create(&self, ctx: &RequestContext, token: Token) -> Result<TokenId> {
        // Never reuse a session the client arrived with (session fixation).
        if let Some(existing) = ctx.session().get() {
            self.registry.invalidate(&existing).await;
        }
        let session_id = self.registry.create(token).await;
        let token_id = base64url_encode(anti_forgery_value(&session_id));
        ctx.session().set(session_id);
        Ok(TokenId::new(token_id))
    }

    async fn read(&self, ctx: &RequestContext, token_id: &TokenId) -> Result<Option<Token>> {
        let Some(session_id) = Self::verified_session(ctx, token_id) else {
            tracing::debug!(backend = self.backend(), "session missing or anti-forgery mismatch");
            return Ok(None);
        };
        let token = self.registry.get(&session_id).await;
        Ok(token.filter(|t| t.is_valid_at(self.clock.now())))
    }

    async fn revoke(&self, ctx: &RequestContext, token_id: &TokenId) -> Result<()> {
        let Some(session_id) = Self::verified_session(ctx, token_id) else {
            tracing::debug!(backend = self.backend(), "ignored revoke without matching session");
            return Ok(());
        };
        self.registry.invalidate(&session_id).await;
        ctx.session().clear();
        Ok(())
    }
}

impl ConfidentialTokenStore for SessionTokenStore {}
