//! Inbound side: an axum server that accepts Telegram webhook callbacks on
//! the root path and feeds them, in arrival order, into a single channel.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use teloxide::types::Update;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::platform::telegram::inbound_from_update;
use crate::platform::InboundUpdate;

const SECRET_TOKEN_HEADER: &str = "x-telegram-bot-api-secret-token";

#[derive(Clone)]
struct WebhookState {
    updates: mpsc::Sender<InboundUpdate>,
    secret_token: Option<Arc<str>>,
}

pub fn router(updates: mpsc::Sender<InboundUpdate>, secret_token: Option<String>) -> Router {
    let state = WebhookState {
        updates,
        secret_token: secret_token.map(Arc::from),
    };

    Router::new()
        .route("/", post(receive_update))
        .with_state(state)
}

pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    info!("Listening on {} for Telegram webhook...", addr);
    Ok(listener)
}

/// Runs until the server fails; it never returns `Ok` on its own.
pub async fn serve(listener: TcpListener, app: Router) -> Result<()> {
    axum::serve(listener, app)
        .await
        .context("Webhook server error")
}

// Telegram redelivers on non-2xx, so anything we cannot use is still acknowledged.
async fn receive_update(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if let Some(expected) = state.secret_token.as_deref() {
        let provided = headers
            .get(SECRET_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok());
        if provided != Some(expected) {
            warn!("Rejected webhook call with missing or wrong secret token");
            return StatusCode::UNAUTHORIZED;
        }
    }

    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            debug!("Dropping malformed update payload: {}", e);
            return StatusCode::OK;
        }
    };

    let Some(inbound) = inbound_from_update(&update) else {
        return StatusCode::OK;
    };

    if state.updates.send(inbound).await.is_err() {
        error!("Dispatcher has stopped, dropping update");
        return StatusCode::SERVICE_UNAVAILABLE;
    }

    StatusCode::OK
}
