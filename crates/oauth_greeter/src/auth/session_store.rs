//! In-memory token cache keyed by session.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use clap::ValueEnum;
use dashmap::DashMap;
use rand::Rng;
use std::sync::Arc;

use super::flow::FlowState;

/// Name of the cookie that carries the caller's session id.
pub const SESSION_COOKIE: &str = "ohyeah_session";

/// How callers are mapped onto cached tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SessionMode {
    /// One token slot for the whole process; the latest login wins.
    Global,
    /// Each caller holds an opaque session id in a cookie and owns its token.
    PerCaller,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SessionKey {
    Global,
    Caller(String),
}

impl SessionKey {
    /// Generate a fresh, unguessable caller session id.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let random_bytes: Vec<u8> = (0..32).map(|_| rng.gen()).collect();
        SessionKey::Caller(URL_SAFE_NO_PAD.encode(&random_bytes))
    }

    /// Cookie value for this key. The global slot has none.
    pub fn cookie_value(&self) -> Option<&str> {
        match self {
            SessionKey::Global => None,
            SessionKey::Caller(id) => Some(id),
        }
    }
}

/// Cached access tokens. Cloning shares the underlying map.
///
/// Entries are only created by a verified login. In per-caller mode a new
/// login replaces the caller's previous entry and a revoked token is removed
/// on the next root hit; there is no idle expiry, so abandoned sessions stay
/// until the process restarts.
#[derive(Debug, Clone)]
pub struct SessionStore {
    mode: SessionMode,
    tokens: Arc<DashMap<SessionKey, String>>,
}

impl SessionStore {
    pub fn new(mode: SessionMode) -> Self {
        Self {
            mode,
            tokens: Arc::new(DashMap::new()),
        }
    }

    /// Resolve the key for a request carrying `cookie` (the session cookie
    /// value, if any). In per-caller mode a request without a cookie has no
    /// session yet.
    pub fn key_for(&self, cookie: Option<&str>) -> Option<SessionKey> {
        match self.mode {
            SessionMode::Global => Some(SessionKey::Global),
            SessionMode::PerCaller => cookie
                .filter(|c| !c.is_empty())
                .map(|c| SessionKey::Caller(c.to_string())),
        }
    }

    /// Key a callback runs under. Per-caller logins always get a new id so a
    /// session id chosen by someone else never becomes authenticated.
    pub fn login_key(&self) -> SessionKey {
        match self.mode {
            SessionMode::Global => SessionKey::Global,
            SessionMode::PerCaller => SessionKey::generate(),
        }
    }

    pub fn token(&self, key: &SessionKey) -> Option<String> {
        self.tokens.get(key).map(|entry| entry.value().clone())
    }

    pub fn state(&self, key: &SessionKey) -> FlowState {
        FlowState::from_token(self.token(key))
    }

    /// Store a freshly verified token. The latest login wins, whatever the
    /// slot held when the callback started.
    pub fn record_login(&self, key: &SessionKey, token: &str) {
        self.tokens.insert(key.clone(), token.to_string());
    }

    /// Drop a session outright.
    pub fn forget(&self, key: &SessionKey) {
        self.tokens.remove(key);
    }

    /// Persist the outcome of a request that did not log anyone in.
    ///
    /// Nothing is written when the request ended where it started. Dropping
    /// back to unauthenticated only removes the entry if it still holds the
    /// token that was checked, so a login that completed meanwhile survives.
    pub fn commit(&self, key: &SessionKey, before: &FlowState, after: &FlowState) {
        if before == after || !after.is_settled() {
            return;
        }

        match after.access_token() {
            Some(token) => {
                self.tokens.insert(key.clone(), token.to_string());
            }
            None => {
                if let Some(checked) = before.access_token() {
                    self.tokens.remove_if(key, |_, current| current == checked);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
