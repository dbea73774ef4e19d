//! OAuth Handshake Handlers
//!
//! - `GET /`        greeting for a verified session, login link otherwise
//! - `GET /ohyeah`  provider callback: code exchange + identity check
//! - fallback       echo of the unmatched path

use axum::{
    extract::{Query, State},
    http::{header, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::auth::{Outcome, SessionKey, SESSION_COOKIE};
use crate::error::GatewayError;

use super::AppState;

type HandlerError = (StatusCode, String);

/// OAuth callback query parameters
#[derive(Debug, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Show a greeting or the login link.
pub async fn root(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<Response, HandlerError> {
    let key = state
        .sessions()
        .key_for(jar.get(SESSION_COOKIE).map(Cookie::value));

    let outcome = state
        .controller
        .visit_root(key.as_ref())
        .await
        .map_err(into_handler_error)?;

    Ok(render(outcome))
}

/// Complete the handshake for the code the provider redirected back with.
pub async fn oauth_callback(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(params): Query<OAuthCallbackQuery>,
) -> Result<Response, HandlerError> {
    if let Some(error) = params.error {
        tracing::warn!("[WARN] Provider denied authorization: {}", error);
        return Ok(pretty_json(&json!({
            "error": error,
            "error_description": params.error_description,
        })));
    }

    let code = params.code.filter(|c| !c.is_empty()).ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            "Missing code parameter".to_string(),
        )
    })?;

    let current = state
        .sessions()
        .key_for(jar.get(SESSION_COOKIE).map(Cookie::value));

    let (outcome, session) = state
        .controller
        .complete_callback(current.as_ref(), &code)
        .await
        .map_err(into_handler_error)?;

    let jar = match session {
        Some(key) => with_session_cookie(jar, &key),
        None => jar,
    };
    Ok((jar, render(outcome)).into_response())
}

/// Catch-all for paths with no handler and no static directory.
pub async fn get_static(uri: Uri) -> String {
    format!("getStatic {}", uri)
}

fn with_session_cookie(jar: CookieJar, key: &SessionKey) -> CookieJar {
    match key.cookie_value() {
        Some(id) => jar.add(
            Cookie::build((SESSION_COOKIE, id.to_string()))
                .path("/")
                .http_only(true)
                .same_site(SameSite::Lax),
        ),
        None => jar,
    }
}

fn render(outcome: Outcome) -> Response {
    match outcome {
        Outcome::LoginLink { url } => render_login_page(&url).into_response(),
        Outcome::Greeting { login } => render_greeting_page(&login).into_response(),
        Outcome::Diagnostic { body, .. } => pretty_json(&body),
    }
}

fn pretty_json(body: &serde_json::Value) -> Response {
    match serde_json::to_string_pretty(body) {
        Ok(text) => ([(header::CONTENT_TYPE, "application/json")], text).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to render response: {}", e),
        )
            .into_response(),
    }
}

fn into_handler_error(e: GatewayError) -> HandlerError {
    match e {
        GatewayError::Transport(_) | GatewayError::Decode { .. } => {
            tracing::error!("[ERROR] Provider call failed: {}", e);
            (
                StatusCode::BAD_GATEWAY,
                "Identity provider is unreachable or returned garbage".to_string(),
            )
        }
        GatewayError::Flow(_) => {
            tracing::error!("[ERROR] {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

fn render_login_page(url: &str) -> Html<String> {
    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>Sign in</title>
</head>
<body>
    <p>You are not signed in.</p>
    <a href="{url}">Log in with GitHub</a>
</body>
</html>
"#,
        url = escape_html(url)
    ))
}

fn render_greeting_page(login: &str) -> Html<String> {
    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>Hello</title>
</head>
<body>
    <h1>Hi {login}</h1>
</body>
</html>
"#,
        login = escape_html(login)
    ))
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
