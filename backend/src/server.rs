//! Axum HTTP verification service.
//!
//! Routes:
//!   POST /verification  identity check; issues an attestation for approved wallets
//!   GET  /validate      ask the gate whether a wallet holds a valid attestation
//!   GET  /health        health check

use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use sas_gate_core::AttestationPayload;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug_span, field, info, instrument, warn, Instrument, Span};

/// Where attestations are read from and issued to.
#[async_trait]
pub trait AttestationLedger: Send + Sync {
    /// `Ok(None)` when the user has no attestation.
    async fn fetch_attestation(&self, user: Pubkey) -> Result<Option<AttestationPayload>>;

    /// Issue an attestation and return its address.
    async fn create_attestation(&self, user: Pubkey, payload: AttestationPayload) -> Result<Pubkey>;
}

/// Decides whether a user passes the attestation gate.
#[async_trait]
pub trait AttestationValidator: Send + Sync {
    async fn validate(&self, user: Pubkey) -> Result<bool>;
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<dyn AttestationLedger>,
    pub validator: Arc<dyn AttestationValidator>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VerificationRequest {
    pub address: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct VerificationResponse {
    pub age: bool,
    pub country: bool,
}

impl From<AttestationPayload> for VerificationResponse {
    fn from(payload: AttestationPayload) -> Self {
        Self {
            age: payload.age,
            country: payload.country,
        }
    }
}

impl From<VerificationResponse> for AttestationPayload {
    fn from(response: VerificationResponse) -> Self {
        Self {
            age: response.age,
            country: response.country,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ValidateParams {
    pub address: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ValidateResponse {
    pub address: String,
    pub valid: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Build the Axum router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/verification", post(handle_verification))
        .route("/validate", get(handle_validate))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

/// Identity check for a wallet.
///
/// There is no real identity provider behind this: any well-formed wallet is
/// approved. Approved wallets without an attestation get one issued.
fn check_identity(_user: &Pubkey) -> AttestationPayload {
    AttestationPayload::APPROVED
}

/// POST /verification: verify a wallet and attest it on first sight.
#[instrument(skip(state, req), fields(pubkey = %req.address, success = field::Empty))]
pub async fn handle_verification(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerificationRequest>,
) -> Json<VerificationResponse> {
    let span = Span::current();

    let user = match Pubkey::from_str(&req.address) {
        Ok(user) => user,
        Err(err) => {
            span.record("success", false);
            warn!(%err, "invalid pubkey");
            return Json(AttestationPayload::REJECTED.into());
        }
    };

    let approved = check_identity(&user);

    let fetch_span = debug_span!("attestation.fetch", pubkey = %user, success = field::Empty);
    let existing = state
        .ledger
        .fetch_attestation(user)
        .instrument(fetch_span.clone())
        .await;

    let response = match existing {
        Ok(Some(payload)) => {
            fetch_span.record("success", true);
            info!("attestation exists, skipping");
            payload
        }
        Ok(None) => {
            fetch_span.record("success", true);
            let create_span =
                debug_span!("attestation.create", pubkey = %user, success = field::Empty);
            match state
                .ledger
                .create_attestation(user, approved)
                .instrument(create_span.clone())
                .await
            {
                Ok(pda) => {
                    create_span.record("success", true);
                    info!(%pda, "attested user");
                }
                Err(err) => {
                    create_span.record("success", false);
                    warn!(%err, "couldn't attest user");
                }
            }
            approved
        }
        Err(err) => {
            fetch_span.record("success", false);
            warn!(%err, "couldn't fetch attestation");
            approved
        }
    };

    span.record("success", true);
    Json(response.into())
}

/// GET /validate: run the attestation gate for a wallet.
#[instrument(skip(state, params), fields(pubkey = %params.address, success = field::Empty))]
pub async fn handle_validate(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ValidateParams>,
) -> Json<ValidateResponse> {
    let span = Span::current();
    let mut response = ValidateResponse {
        address: params.address,
        valid: false,
    };

    let user = match Pubkey::from_str(&response.address) {
        Ok(user) => user,
        Err(err) => {
            span.record("success", false);
            warn!(address = %response.address, %err, "invalid pubkey");
            return Json(response);
        }
    };

    match state.validator.validate(user).await {
        Ok(valid) => {
            span.record("success", true);
            response.valid = valid;
        }
        Err(err) => {
            span.record("success", false);
            warn!(%err, "couldn't validate attestation");
        }
    }

    Json(response)
}

/// GET /health: health check.
pub async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
