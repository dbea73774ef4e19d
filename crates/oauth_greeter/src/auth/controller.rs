//! Drives the handshake state machine against the provider and the
//! session store.

use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use super::flow::{transition, DiagnosticKind, Effect, FlowEvent, FlowState};
use super::oauth::IdentityProvider;
use super::session_store::{SessionKey, SessionStore};
use crate::error::Result;

/// What a handled request should show the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Not signed in; offer the provider's consent page.
    LoginLink { url: String },
    Greeting { login: String },
    /// Raw provider JSON explaining how a callback went.
    Diagnostic { kind: DiagnosticKind, body: Value },
}

pub struct FlowController<P> {
    provider: P,
    sessions: SessionStore,
    request_budget: Duration,
}

impl<P: IdentityProvider> FlowController<P> {
    pub fn new(provider: P, sessions: SessionStore, request_budget: Duration) -> Self {
        Self {
            provider,
            sessions,
            request_budget,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Root path: greet a verified session, otherwise offer the login link.
    /// The cached token is re-checked with the provider on every call.
    pub async fn visit_root(&self, key: Option<&SessionKey>) -> Result<Outcome> {
        match key {
            Some(key) => self.run(key, FlowEvent::RootRequested).await,
            None => Ok(Outcome::LoginLink {
                url: self.provider.authorization_url(),
            }),
        }
    }

    /// Callback path: exchange `code`, verify the token, and cache it when
    /// the provider vouches for an identity.
    ///
    /// `current` is the session the caller already holds. On success the
    /// returned key names the session that now owns the token; in per-caller
    /// mode that is always a new id and `current` is retired.
    pub async fn complete_callback(
        &self,
        current: Option<&SessionKey>,
        code: &str,
    ) -> Result<(Outcome, Option<SessionKey>)> {
        let key = self.sessions.login_key();
        let outcome = self
            .run(
                &key,
                FlowEvent::CallbackReceived {
                    code: code.to_string(),
                },
            )
            .await?;

        if !matches!(
            outcome,
            Outcome::Diagnostic {
                kind: DiagnosticKind::Verified,
                ..
            }
        ) {
            return Ok((outcome, None));
        }

        if let Some(current) = current.filter(|current| **current != key) {
            self.sessions.forget(current);
        }
        Ok((outcome, Some(key)))
    }

    async fn run(&self, key: &SessionKey, event: FlowEvent) -> Result<Outcome> {
        let deadline = Instant::now() + self.request_budget;
        let before = self.sessions.state(key);

        let mut state = before.clone();
        let mut event = event;

        loop {
            let (next, effect) = transition(state, event)?;
            state = next;

            event = match effect {
                Effect::ExchangeCode { code } => {
                    let token = self.provider.exchange_code(&code, deadline).await?;
                    FlowEvent::TokenIssued {
                        access_token: token.access_token,
                        response: token.raw,
                    }
                }
                Effect::FetchIdentity { access_token } => {
                    let identity = self
                        .provider
                        .fetch_identity(&access_token, deadline)
                        .await?;
                    FlowEvent::IdentityFetched {
                        login: identity.login,
                        record: identity.raw,
                    }
                }
                Effect::ShowLoginLink => {
                    if before.access_token().is_some() && state.access_token().is_none() {
                        warn!("Cached token no longer grants an identity; session dropped");
                    }
                    let url = self.provider.authorization_url();
                    return Ok(self.finish(key, &before, &state, Outcome::LoginLink { url }));
                }
                Effect::Greet { login } => {
                    return Ok(self.finish(key, &before, &state, Outcome::Greeting { login }));
                }
                Effect::ShowDiagnostic { kind, body } => {
                    log_diagnostic(kind, &body);
                    return Ok(self.finish(key, &before, &state, Outcome::Diagnostic { kind, body }));
                }
            };
        }
    }

    fn finish(
        &self,
        key: &SessionKey,
        before: &FlowState,
        after: &FlowState,
        outcome: Outcome,
    ) -> Outcome {
        match (&outcome, after.access_token()) {
            (
                Outcome::Diagnostic {
                    kind: DiagnosticKind::Verified,
                    ..
                },
                Some(token),
            ) => self.sessions.record_login(key, token),
            _ => self.sessions.commit(key, before, after),
        }
        outcome
    }
}

fn log_diagnostic(kind: DiagnosticKind, body: &Value) {
    match kind {
        DiagnosticKind::Verified => {
            let login = body.get("login").and_then(Value::as_str).unwrap_or("?");
            info!("[OK] OAuth handshake complete for {}", login)
        }
        DiagnosticKind::ExchangeFailure => {
            warn!("Token endpoint returned no access_token: {}", body)
        }
        DiagnosticKind::IdentityRejected => {
            warn!("Identity endpoint rejected the new token: {}", body)
        }
    }
}
