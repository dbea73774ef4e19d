//! OAuth Greeter HTTP Server
//!
//! Routes the root page and the provider callback to the handshake
//! controller; everything else falls through to the static fallback.

pub mod oauth_handlers;

use crate::auth::{FlowController, OAuthClient, OAuthConfig, SessionStore};
use crate::client::JsonClient;
use crate::config::GatewayConfig;
use axum::{http::HeaderName, routing::get, Router as AxumRouter};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::info;

/// Path the provider redirects back to after consent.
pub const CALLBACK_PATH: &str = "/ohyeah";

/// Application state shared across handlers
pub struct AppState {
    pub controller: FlowController<OAuthClient>,
}

impl AppState {
    pub fn new(controller: FlowController<OAuthClient>) -> Self {
        Self { controller }
    }

    /// Build the state from resolved configuration.
    pub fn from_config(config: &GatewayConfig) -> anyhow::Result<Self> {
        let mut oauth_config =
            OAuthConfig::new(config.credentials.clone(), config.provider_host.clone())?;
        let mut json_client = JsonClient::new(config.timeout);
        if config.provider_plaintext {
            oauth_config = oauth_config.plaintext();
            json_client = json_client.plaintext();
        }
        let provider = OAuthClient::new(oauth_config, json_client);
        let sessions = SessionStore::new(config.session_mode);

        Ok(Self::new(FlowController::new(
            provider,
            sessions,
            config.timeout,
        )))
    }

    pub fn sessions(&self) -> &SessionStore {
        self.controller.sessions()
    }
}

/// Build the router: `/`, the callback, and a catch-all fallback.
pub fn router(state: Arc<AppState>, static_dir: Option<PathBuf>) -> AxumRouter {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers([HeaderName::from_static("x-requested-with")]);

    let app = AxumRouter::new()
        .route("/", get(oauth_handlers::root))
        .route(CALLBACK_PATH, get(oauth_handlers::oauth_callback))
        .with_state(state);

    let app = match static_dir {
        Some(dir) => app.fallback_service(ServeDir::new(dir)),
        None => app.fallback(oauth_handlers::get_static),
    };

    app.layer(cors).layer(TraceLayer::new_for_http())
}

/// Start the gateway and serve until Ctrl-C.
///
/// # Errors
/// Returns error if the provider host is invalid or the address cannot be bound
pub async fn start_server(config: GatewayConfig) -> anyhow::Result<()> {
    let state = Arc::new(AppState::from_config(&config)?);
    let app = router(state, config.static_dir.clone());

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr).await?;

    info!("[INFO] OAuth Greeter listening on {}", addr);
    info!("[INFO] Provider: {}", config.provider_host);
    info!("[INFO] Session mode: {:?}", config.session_mode);
    if config.provider_plaintext {
        tracing::warn!("Provider calls use plain HTTP");
    }
    info!("[INFO] Available endpoints:");
    info!("  GET    /                - Greeting or login link");
    info!("  GET    {}          - OAuth callback", CALLBACK_PATH);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("[INFO] OAuth Greeter stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
