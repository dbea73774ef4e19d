pub mod controller;
pub mod flow;
pub mod oauth;
pub mod session_store;

pub use controller::{FlowController, Outcome};
pub use flow::{transition, DiagnosticKind, Effect, FlowEvent, FlowState, InvalidTransition};
pub use oauth::{IdentityProvider, IdentityRecord, OAuthClient, OAuthConfig, TokenResponse};
pub use session_store::{SessionKey, SessionMode, SessionStore, SESSION_COOKIE};
