//! HTTP ingress for engine events.
//!
//! A single endpoint, `POST /events`, accepts signed event deliveries,
//! verifies the HMAC signature, parses the [`EngineEvent`], and hands it to
//! the scheduler over a channel. The response is 202 Accepted as soon as
//! the event is queued; processing happens asynchronously.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::events::EngineEvent;

pub mod signature;

pub use signature::{
    compute_signature, format_signature_header, parse_signature_header, verify_signature,
};

/// Header carrying the HMAC-SHA256 signature of the body.
const HEADER_SIGNATURE: &str = "x-hub-signature-256";

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    events: mpsc::UnboundedSender<EngineEvent>,
    webhook_secret: Vec<u8>,
}

impl AppState {
    pub fn new(
        events: mpsc::UnboundedSender<EngineEvent>,
        webhook_secret: impl Into<Vec<u8>>,
    ) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                events,
                webhook_secret: webhook_secret.into(),
            }),
        }
    }

    fn webhook_secret(&self) -> &[u8] {
        &self.inner.webhook_secret
    }
}

#[derive(Debug, Error)]
pub enum EventDeliveryError {
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid event body: {0}")]
    InvalidBody(#[from] serde_json::Error),

    #[error("engine is shutting down")]
    EngineGone,
}

impl IntoResponse for EventDeliveryError {
    fn into_response(self) -> Response {
        let status = match &self {
            EventDeliveryError::MissingHeader(_) => StatusCode::BAD_REQUEST,
            EventDeliveryError::InvalidSignature => StatusCode::UNAUTHORIZED,
            EventDeliveryError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            EventDeliveryError::EngineGone => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, self.to_string()).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/events", post(event_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

async fn health_handler() -> &'static str {
    "OK"
}

/// Accepts one signed event delivery.
///
/// - 202 Accepted: event queued
/// - 400 Bad Request: missing header or malformed body
/// - 401 Unauthorized: bad signature
async fn event_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, &'static str), EventDeliveryError> {
    let signature = headers
        .get(HEADER_SIGNATURE)
        .and_then(|v| v.to_str().ok())
        .ok_or(EventDeliveryError::MissingHeader(HEADER_SIGNATURE))?;

    // Verify before parsing: unauthenticated bodies get no further work.
    if !verify_signature(&body, signature, state.webhook_secret()) {
        warn!("rejected event delivery with invalid signature");
        return Err(EventDeliveryError::InvalidSignature);
    }

    let event: EngineEvent = serde_json::from_slice(&body)?;
    debug!(?event, "accepted event delivery");

    state
        .inner
        .events
        .send(event)
        .map_err(|_| EventDeliveryError::EngineGone)?;
    Ok((StatusCode::ACCEPTED, "Accepted"))
}
