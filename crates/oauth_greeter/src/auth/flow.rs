//! Authorization-code handshake as an explicit state machine.
//!
//! [`transition`] is pure: it never touches the network or the session
//! store. The controller feeds it events produced by provider calls and
//! executes the effects it returns.

use serde_json::Value;
use thiserror::Error;

/// Where a session stands in the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowState {
    Unauthenticated,
    /// A callback is being processed. `previous` is the token the session
    /// held before the callback and is restored if the exchange fails.
    ExchangePending {
        previous: Option<String>,
        stage: ExchangeStage,
    },
    Authenticated {
        access_token: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeStage {
    AwaitingToken,
    AwaitingIdentity { access_token: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FlowEvent {
    RootRequested,
    CallbackReceived {
        code: String,
    },
    TokenIssued {
        access_token: Option<String>,
        response: Value,
    },
    IdentityFetched {
        login: Option<String>,
        record: Value,
    },
}

/// How a callback ended, for the diagnostic response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Verified,
    ExchangeFailure,
    IdentityRejected,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    ShowLoginLink,
    ExchangeCode { code: String },
    FetchIdentity { access_token: String },
    Greet { login: String },
    ShowDiagnostic { kind: DiagnosticKind, body: Value },
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("Invalid flow transition: {event} while {state}")]
pub struct InvalidTransition {
    pub state: &'static str,
    pub event: &'static str,
}

impl FlowState {
    /// State for a session that holds `token`, or none.
    pub fn from_token(token: Option<String>) -> Self {
        match token {
            Some(access_token) => FlowState::Authenticated { access_token },
            None => FlowState::Unauthenticated,
        }
    }

    /// The token this state grants, if any.
    pub fn access_token(&self) -> Option<&str> {
        match self {
            FlowState::Authenticated { access_token } => Some(access_token),
            _ => None,
        }
    }

    pub fn is_settled(&self) -> bool {
        !matches!(self, FlowState::ExchangePending { .. })
    }

    fn name(&self) -> &'static str {
        match self {
            FlowState::Unauthenticated => "Unauthenticated",
            FlowState::ExchangePending {
                stage: ExchangeStage::AwaitingToken,
                ..
            } => "ExchangePending(AwaitingToken)",
            FlowState::ExchangePending {
                stage: ExchangeStage::AwaitingIdentity { .. },
                ..
            } => "ExchangePending(AwaitingIdentity)",
            FlowState::Authenticated { .. } => "Authenticated",
        }
    }
}

impl FlowEvent {
    fn name(&self) -> &'static str {
        match self {
            FlowEvent::RootRequested => "RootRequested",
            FlowEvent::CallbackReceived { .. } => "CallbackReceived",
            FlowEvent::TokenIssued { .. } => "TokenIssued",
            FlowEvent::IdentityFetched { .. } => "IdentityFetched",
        }
    }
}

/// Advance the handshake by one event.
pub fn transition(
    state: FlowState,
    event: FlowEvent,
) -> Result<(FlowState, Effect), InvalidTransition> {
    use FlowEvent::*;
    use FlowState::*;

    match (state, event) {
        (Unauthenticated, RootRequested) => Ok((Unauthenticated, Effect::ShowLoginLink)),

        (Authenticated { access_token }, RootRequested) => {
            let effect = Effect::FetchIdentity {
                access_token: access_token.clone(),
            };
            Ok((Authenticated { access_token }, effect))
        }

        (Authenticated { access_token }, IdentityFetched { login, .. }) => match login {
            Some(login) => Ok((Authenticated { access_token }, Effect::Greet { login })),
            // Revoked upstream since it was cached.
            None => Ok((Unauthenticated, Effect::ShowLoginLink)),
        },

        (settled @ (Unauthenticated | Authenticated { .. }), CallbackReceived { code }) => {
            let previous = settled.access_token().map(str::to_string);
            Ok((
                ExchangePending {
                    previous,
                    stage: ExchangeStage::AwaitingToken,
                },
                Effect::ExchangeCode { code },
            ))
        }

        (
            ExchangePending {
                previous,
                stage: ExchangeStage::AwaitingToken,
            },
            TokenIssued {
                access_token,
                response,
            },
        ) => match access_token {
            Some(access_token) => Ok((
                ExchangePending {
                    previous,
                    stage: ExchangeStage::AwaitingIdentity {
                        access_token: access_token.clone(),
                    },
                },
                Effect::FetchIdentity { access_token },
            )),
            None => Ok((
                FlowState::from_token(previous),
                Effect::ShowDiagnostic {
                    kind: DiagnosticKind::ExchangeFailure,
                    body: response,
                },
            )),
        },

        (
            ExchangePending {
                previous,
                stage: ExchangeStage::AwaitingIdentity { access_token },
            },
            IdentityFetched { login, record },
        ) => match login {
            Some(_) => Ok((
                Authenticated { access_token },
                Effect::ShowDiagnostic {
                    kind: DiagnosticKind::Verified,
                    body: record,
                },
            )),
            None => Ok((
                FlowState::from_token(previous),
                Effect::ShowDiagnostic {
                    kind: DiagnosticKind::IdentityRejected,
                    body: record,
                },
            )),
        },

        (state, event) => Err(InvalidTransition {
            state: state.name(),
            event: event.name(),
        }),
    }
}
