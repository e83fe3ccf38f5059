use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use ncl_ledger::{Admission, AuditReport, ConsentGate, ConsentLedger, ConsentRecord, LedgerStatus};

use crate::auth::{Action, AuthProvider, Credentials};
use crate::error::{ServerError, ServerResult};

/// Shared state of all handlers.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<ConsentLedger>,
    pub gate: ConsentGate,
    pub auth: Arc<dyn AuthProvider>,
}

impl AppState {
    pub fn new(ledger: Arc<ConsentLedger>, auth: Arc<dyn AuthProvider>) -> Self {
        Self {
            gate: ConsentGate::new(Arc::clone(&ledger)),
            ledger,
            auth,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".into(),
            version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SetConsentRequest {
    pub status: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReceiptView {
    pub subject: String,
    pub status: bool,
    pub sequence: u64,
    pub record_hash: String,
    pub timestamp: u64,
    pub time: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConsentView {
    pub subject: String,
    pub status: bool,
    pub history_count: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecordView {
    pub sequence: u64,
    pub status: bool,
    pub timestamp: u64,
    pub time: String,
    pub record_hash: String,
    pub prev_hash: Option<String>,
}

impl From<&ConsentRecord> for RecordView {
    fn from(record: &ConsentRecord) -> Self {
        Self {
            sequence: record.sequence,
            status: record.status,
            timestamp: record.timestamp.as_unix_secs(),
            time: record.timestamp.to_rfc3339(),
            record_hash: record.record_hash.to_hex(),
            prev_hash: record.prev_hash.map(|h| h.to_hex()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryView {
    pub subject: String,
    pub records: Vec<RecordView>,
}

#[derive(Clone, Debug, Serialize)]
pub struct GateView {
    pub subject: String,
    #[serde(flatten)]
    pub admission: Admission,
}

/// Health check handler.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

/// Info handler.
pub async fn info_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "name": "ncl-server",
        "version": env!("CARGO_PKG_VERSION"),
        "ledger": state.ledger.name(),
    }))
}

pub async fn ledger_status_handler(State(state): State<AppState>) -> Json<LedgerStatus> {
    Json(state.ledger.status())
}

/// `PUT /v1/consent/:subject`. Only writes go through the auth provider.
pub async fn set_consent_handler(
    State(state): State<AppState>,
    Path(subject): Path<String>,
    headers: HeaderMap,
    Json(request): Json<SetConsentRequest>,
) -> ServerResult<(StatusCode, Json<ReceiptView>)> {
    let credentials = Credentials::from_headers(&headers);
    let identity = state.auth.authenticate(&credentials).await?;
    let action = Action::SetConsent {
        subject: subject.clone(),
    };
    if !state.auth.authorize(&identity, &action).await? {
        return Err(ServerError::AuthorizationDenied {
            action: action.to_string(),
        });
    }

    // Commits may fsync and wait on locks.
    let ledger = Arc::clone(&state.ledger);
    let target = subject.clone();
    let receipt = tokio::task::spawn_blocking(move || ledger.set_consent(&target, request.status))
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))??;

    info!(
        subject = %subject,
        status = request.status,
        sequence = receipt.sequence,
        by = %identity.name,
        "consent set"
    );
    Ok((
        StatusCode::CREATED,
        Json(ReceiptView {
            subject,
            status: request.status,
            sequence: receipt.sequence,
            record_hash: receipt.record_hash.to_hex(),
            timestamp: receipt.timestamp.as_unix_secs(),
            time: receipt.timestamp.to_rfc3339(),
        }),
    ))
}

pub async fn get_consent_handler(
    State(state): State<AppState>,
    Path(subject): Path<String>,
) -> Json<ConsentView> {
    Json(ConsentView {
        status: state.ledger.get_status(&subject),
        history_count: state.ledger.get_history_count(&subject),
        subject,
    })
}

pub async fn history_handler(
    State(state): State<AppState>,
    Path(subject): Path<String>,
) -> Json<HistoryView> {
    let records = state
        .ledger
        .get_history(&subject)
        .map(|record| RecordView::from(&record))
        .collect();
    Json(HistoryView { subject, records })
}

pub async fn verify_handler(
    State(state): State<AppState>,
    Path(subject): Path<String>,
) -> ServerResult<Json<AuditReport>> {
    Ok(Json(state.ledger.verify(&subject)?))
}

pub async fn gate_handler(
    State(state): State<AppState>,
    Path(subject): Path<String>,
) -> Json<GateView> {
    Json(GateView {
        admission: state.gate.admit(&subject),
        subject,
    })
}
