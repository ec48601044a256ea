use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use sequencing_core::types::is_base58_prefix;
use sequencing_core::validators::{ClientShare, ValidatorMatch, FRANKENDANCER};
use sequencing_core::{
    classify_slot, enrich_slot, validate_identity, EnrichedSlot,
    SlotClassification, SlotMetadata, TimeRange, TransitionReport,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::error;

use crate::batch::{BatchClassifier, BatchOutcome, ProducerReport};
use crate::dashboard::{DashboardSeries, DashboardService};
use crate::error::InspectorError;
use crate::metrics::MetricsRecorder;
use crate::reports::TransitionAnalyzer;
use crate::store::{RecentSlot, SlotStore};
use crate::validators_app::ValidatorDirectory;
use crate::winrates::{PropAmmAnalyzer, WinrateReport};

const RECENT_SLOTS_LIMIT: usize = 20;
const SEARCH_LIMIT: usize = 20;
const SEARCH_MIN_LEN: usize = 2;
const MAX_WINDOW: usize = 50;
const MAX_WIDTH: usize = 64;
const WINRATE_VALIDATOR_LIMIT: usize = 200;
const MAX_NAME_LOOKUPS: usize = 500;

pub struct ApiState {
    pub store: Arc<dyn SlotStore>,
    pub classifier: Arc<BatchClassifier>,
    pub directory: Arc<ValidatorDirectory>,
    pub transitions: Arc<TransitionAnalyzer>,
    pub dashboard: Arc<DashboardService>,
    pub prop_amm: Arc<PropAmmAnalyzer>,
    pub metrics: Arc<MetricsRecorder>,
    pub transition_default_hours: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn error(msg: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg),
            timestamp: Utc::now(),
        }
    }
}

impl IntoResponse for InspectorError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        (status, Json(ApiResponse::<()>::error(self.to_string()))).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, InspectorError>;

pub fn build_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/slot/:slot", get(get_slot))
        .route("/api/validators/search", get(search_validators))
        .route("/api/validators/names", get(validator_names))
        .route("/api/validators/clients", get(client_breakdown))
        .route("/api/validators/:identity/classification", get(get_classification))
        .route("/api/validators/:identity/slots", get(get_validator_slots))
        .route("/api/classifications", post(classify_batch))
        .route("/api/transitions", get(get_transitions))
        .route("/api/dashboard", get(get_dashboard))
        .route("/api/prop-amm/winrates", get(get_prop_amm_winrates))
        .route("/health", get(health))
        .route("/metrics", get(prometheus_metrics))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotView {
    pub producer_name: Option<String>,
    pub producer_type: String,
    pub classification: SlotClassification,
    pub slot: EnrichedSlot,
}

// GET /api/slot/:slot
async fn get_slot(State(state): State<Arc<ApiState>>, Path(slot): Path<u64>) -> ApiResult<SlotView> {
    let (input, snapshot) = tokio::join!(state.store.fetch_slot_input(slot), state.directory.snapshot());
    let input = input?;
    let unknown = input.metadata.leader == SlotMetadata::UNKNOWN_LEADER;
    if unknown && input.entries.is_empty() && input.transactions.is_empty() {
        return Err(InspectorError::NotFound(format!("slot {slot}")));
    }

    let enriched = enrich_slot(input);
    state.metrics.record_slot(&enriched);
    let leader = enriched.metadata.leader.as_str();

    Ok(Json(ApiResponse::success(SlotView {
        producer_name: snapshot.name(leader).map(str::to_string),
        producer_type: snapshot.software_client(leader).to_string(),
        classification: classify_slot(&enriched),
        slot: enriched,
    })))
}

#[derive(Debug, Deserialize)]
struct WindowParams {
    window: Option<usize>,
}

fn check_window(window: usize) -> Result<usize, InspectorError> {
    if window == 0 || window > MAX_WINDOW {
        return Err(InspectorError::InvalidInput(format!(
            "window must be between 1 and {MAX_WINDOW}"
        )));
    }
    Ok(window)
}

// GET /api/validators/:identity/classification?window=N
async fn get_classification(
    State(state): State<Arc<ApiState>>,
    Path(identity): Path<String>,
    Query(params): Query<WindowParams>,
) -> ApiResult<ProducerReport> {
    let identity = validate_identity(&identity)?;
    let window = check_window(params.window.unwrap_or(state.classifier.window()))?;
    let classification = state.classifier.classify(identity, window).await?;
    Ok(Json(ApiResponse::success(classification)))
}

// GET /api/validators/:identity/slots
async fn get_validator_slots(
    State(state): State<Arc<ApiState>>,
    Path(identity): Path<String>,
) -> ApiResult<Vec<RecentSlot>> {
    let identity = validate_identity(&identity)?;
    let slots = state.store.recent_slots(identity, RECENT_SLOTS_LIMIT).await?;
    Ok(Json(ApiResponse::success(slots)))
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: Option<String>,
}

// GET /api/validators/search?q=
async fn search_validators(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Vec<ValidatorMatch>> {
    let query = params.q.unwrap_or_default();
    let query = query.trim();
    if query.len() < SEARCH_MIN_LEN {
        return Ok(Json(ApiResponse::success(Vec::new())));
    }

    let snapshot = state.directory.snapshot().await;
    let matches = snapshot.search(query, SEARCH_LIMIT);
    if !matches.is_empty() || !is_base58_prefix(query) {
        return Ok(Json(ApiResponse::success(matches)));
    }

    let found = state.store.search_validators(query, SEARCH_LIMIT).await?;
    let matches = found
        .into_iter()
        .map(|account| ValidatorMatch {
            name: snapshot.name(&account).map(str::to_string),
            account,
        })
        .collect();
    Ok(Json(ApiResponse::success(matches)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    pub identities: Option<Vec<String>>,
    pub software_client: Option<String>,
    pub window: Option<usize>,
    pub width: Option<usize>,
}

// POST /api/classifications
async fn classify_batch(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<BatchRequest>,
) -> ApiResult<BatchOutcome> {
    let window = check_window(request.window.unwrap_or(state.classifier.window()))?;
    let width = request.width.unwrap_or(state.classifier.width()).clamp(1, MAX_WIDTH);

    let identities = match request.identities {
        Some(identities) => identities
            .iter()
            .map(|i| validate_identity(i).map(str::to_string))
            .collect::<Result<Vec<_>, _>>()?,
        None => {
            let client = request.software_client.as_deref().unwrap_or(FRANKENDANCER);
            state
                .directory
                .snapshot()
                .await
                .accounts_with_client(client)
                .map(|v| v.account.clone())
                .collect()
        }
    };

    let outcome = state
        .classifier
        .classify_all_with(identities, window, width)
        .await;
    Ok(Json(ApiResponse::success(outcome)))
}

#[derive(Debug, Deserialize)]
struct TransitionParams {
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    accounts: Option<String>,
}

// GET /api/transitions?from&to&accounts=a,b
async fn get_transitions(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<TransitionParams>,
) -> ApiResult<TransitionReport> {
    let span = Duration::hours(state.transition_default_hours);
    let range = match (params.from, params.to) {
        (Some(from), Some(to)) => TimeRange::new(from, to)?,
        (Some(from), None) => TimeRange::new(from, Utc::now())?,
        (None, Some(to)) => TimeRange::new(to - span, to)?,
        (None, None) => TimeRange::last_hours(Utc::now(), state.transition_default_hours),
    };

    let accounts = params
        .accounts
        .map(|raw| {
            raw.split(',')
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .collect::<Vec<_>>()
        })
        .filter(|a| !a.is_empty());

    let report = state.transitions.report(range, accounts).await?;
    Ok(Json(ApiResponse::success(report.as_ref().clone())))
}

#[derive(Debug, Deserialize)]
struct NamesParams {
    accounts: Option<String>,
    all: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NamesView {
    pub names: BTreeMap<String, Option<String>>,
}

// GET /api/validators/names?accounts=a,b | ?all=true
async fn validator_names(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<NamesParams>,
) -> ApiResult<NamesView> {
    if params.all == Some(true) {
        let snapshot = state.directory.snapshot().await;
        let names = snapshot
            .names
            .iter()
            .map(|(account, name)| (account.clone(), Some(name.clone())))
            .collect();
        return Ok(Json(ApiResponse::success(NamesView { names })));
    }

    let Some(raw) = params.accounts else {
        return Err(InspectorError::InvalidInput(
            "provide 'accounts' or 'all=true'".into(),
        ));
    };
    let accounts: Vec<&str> = raw.split(',').map(str::trim).filter(|a| !a.is_empty()).collect();
    if accounts.len() > MAX_NAME_LOOKUPS {
        return Err(InspectorError::InvalidInput(format!(
            "at most {MAX_NAME_LOOKUPS} accounts per lookup"
        )));
    }

    let snapshot = state.directory.snapshot().await;
    let names = accounts
        .into_iter()
        .map(|account| (account.to_string(), snapshot.name(account).map(str::to_string)))
        .collect();
    Ok(Json(ApiResponse::success(NamesView { names })))
}

// GET /api/validators/clients
async fn client_breakdown(State(state): State<Arc<ApiState>>) -> ApiResult<Vec<ClientShare>> {
    let snapshot = state.directory.snapshot().await;
    Ok(Json(ApiResponse::success(snapshot.client_breakdown())))
}

#[derive(Debug, Deserialize)]
struct DashboardParams {
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

// GET /api/dashboard?from&to
async fn get_dashboard(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<DashboardParams>,
) -> ApiResult<DashboardSeries> {
    let range = match (params.from, params.to) {
        (Some(from), Some(to)) => Some(TimeRange::new(from, to)?),
        _ => None,
    };
    let series = state.dashboard.series(range).await?;
    Ok(Json(ApiResponse::success(series.as_ref().clone())))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WinrateParams {
    start_slot: Option<u64>,
    end_slot: Option<u64>,
    limit: Option<usize>,
}

// GET /api/prop-amm/winrates?startSlot&endSlot&limit
async fn get_prop_amm_winrates(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<WinrateParams>,
) -> ApiResult<WinrateReport> {
    let limit = params.limit.unwrap_or(WINRATE_VALIDATOR_LIMIT).max(1);
    let data = match (params.start_slot, params.end_slot) {
        (Some(start), Some(end)) => state.prop_amm.custom(start, end).await?,
        (None, None) => state.prop_amm.default_wins().await?.as_ref().clone(),
        _ => {
            return Err(InspectorError::InvalidInput(
                "startSlot and endSlot must be given together".into(),
            ))
        }
    };
    Ok(Json(ApiResponse::success(WinrateReport::new(data, limit))))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn prometheus_metrics(State(state): State<Arc<ApiState>>) -> Response {
    match state.metrics.encode() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
