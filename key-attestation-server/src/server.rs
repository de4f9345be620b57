use std::{sync::Arc, time::Duration};

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use key_attestation::{AttestationRequest, AttestationVerifier, VerificationResponse};
use tokio::{net::TcpListener, task, time};
use tracing::{error, info, instrument, warn};

use crate::{
    constants::{
        ATTESTATION_ROUTE, INTERNAL_ERROR_MESSAGE, INVALID_JSON_MESSAGE, TIMEOUT_MESSAGE,
    },
    errors::Result,
};

/// State shared by every request handler.
#[derive(Debug, Clone)]
pub struct AppState {
    verifier: Arc<AttestationVerifier>,
    request_timeout: Duration,
}

impl AppState {
    pub fn new(verifier: AttestationVerifier, request_timeout: Duration) -> Self {
        Self {
            verifier: Arc::new(verifier),
            request_timeout,
        }
    }
}

/// Builds the router serving `POST /attestation`.
///
/// # Arguments
///
/// * `state` - Verifier and per-request timeout
/// * `max_body_bytes` - Bodies above this size are refused with 413
pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route(ATTESTATION_ROUTE, post(handle_attestation))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

/// Serves `app` on `listener` until ctrl-c is received.
///
/// # Errors
///
/// Returns `ServerError::Io` if the listener fails.
pub async fn serve(listener: TcpListener, app: Router) -> Result<()> {
    info!(level = "attestation_server", "Listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!(level = "attestation_server", "Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(level = "attestation_server", "Failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
}

/// The body is parsed by hand so that anything which is not a JSON object of
/// the request shape is answered in the common response format, regardless of
/// the content type header.
#[instrument(level = "info", skip_all, fields(body_length = body.len()))]
async fn handle_attestation(
    State(state): State<AppState>,
    body: Bytes,
) -> (StatusCode, Json<VerificationResponse>) {
    let request: AttestationRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!(level = "attestation_server", "Malformed attestation request: {e}");
            return (
                StatusCode::BAD_REQUEST,
                Json(VerificationResponse::error(INVALID_JSON_MESSAGE)),
            );
        }
    };

    let verifier = Arc::clone(&state.verifier);
    let verification = task::spawn_blocking(move || verifier.verify_request(&request));
    match time::timeout(state.request_timeout, verification).await {
        Ok(Ok(verdict)) => {
            let status = if verdict.is_accepted() {
                StatusCode::OK
            } else {
                StatusCode::BAD_REQUEST
            };
            (status, Json(VerificationResponse::from(&verdict)))
        }
        Ok(Err(e)) => {
            error!(level = "attestation_server", "Verification task failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(VerificationResponse::error(INTERNAL_ERROR_MESSAGE)),
            )
        }
        Err(_) => {
            error!(
                level = "attestation_server",
                "Verification did not finish within {:?}",
                state.request_timeout
            );
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(VerificationResponse::error(TIMEOUT_MESSAGE)),
            )
        }
    }
}
