//! OAuth Greeter
//!
//! Runs the OAuth 2.0 authorization-code handshake against a single identity
//! provider and greets the caller by their provider login.
//!
//! # Features
//! - Login link, code exchange and identity verification
//! - Cached tokens re-verified on every visit
//! - Per-caller sessions (cookie) or a single process-wide session
//! - Deadline on every provider call

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod server;

pub use auth::{FlowController, OAuthClient, OAuthConfig, Outcome, SessionMode, SessionStore};
pub use client::JsonClient;
pub use config::{Cli, Credentials, GatewayConfig};
pub use error::{GatewayError, Result};
pub use server::{router, start_server, AppState};
