//! REST API of the inventory dashboard service.
//!
//! Fetches raw data from the inventory backend, runs it through the
//! capacity engine and serves the derived views. Uses Axum as the web
//! framework and supports CORS.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    Router,
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post, put},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use std::sync::OnceLock;
use thiserror::Error;
use tokio::sync::{RwLock, watch};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::WatchStream;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use utoipa::{IntoParams, OpenApi, ToSchema};

use crate::analytics::AggregatedAnalytics;
use crate::autosave::{AutosaveController, AutosaveStatus, SaveState};
use crate::capacity::CapacitySource;
use crate::client::{BackendClient, ClientError, SuggestMethod, SyncReport};
use crate::config::{ApiConfig, EngineConfig};
use crate::dashboard::{DeriveOptions, LocationView, ProductRow, derive_dashboard};
use crate::expression::evaluate;
use crate::model::{
    CapacityMap, CapacityOverrides, DashboardOverview, Location, LocationSummary,
    ProductAnalytics, ProductStock, Refrigerator, SessionSummaryRow, ValidationError,
};
use crate::session::{PreferencesUpdate, Role, Session, SessionError, SessionStore, Theme};
use crate::sorter::{SortMode, sort_breakdown};
use crate::status::StatusSnapshot;
use crate::types::{UNRANKED_POSITION, build_order_index, normalize};

/// Shared state of all handlers.
#[derive(Clone)]
pub struct ApiState {
    engine: EngineConfig,
    client: BackendClient,
    session: Arc<RwLock<Session>>,
    session_store: SessionStore,
    autosave: Arc<AutosaveController>,
    status: Option<watch::Receiver<StatusSnapshot>>,
}

impl ApiState {
    pub fn new(
        engine: EngineConfig,
        client: BackendClient,
        session: Session,
        session_store: SessionStore,
        autosave: Arc<AutosaveController>,
        status: Option<watch::Receiver<StatusSnapshot>>,
    ) -> Self {
        Self {
            engine,
            client,
            session: Arc::new(RwLock::new(session)),
            session_store,
            autosave,
            status,
        }
    }

    /// Backend client authenticated with the caller's token, or the
    /// session token when the request carries none.
    async fn client_for(&self, headers: &HeaderMap) -> BackendClient {
        let token = match bearer_token(headers) {
            Some(token) => Some(token),
            None => self.session.read().await.token.clone(),
        };
        self.client.with_token(token)
    }

    /// Fails unless the stored session belongs to an admin.
    async fn require_admin(&self) -> Result<(), ApiError> {
        if self.session.read().await.is_admin() {
            Ok(())
        } else {
            Err(ApiError::Forbidden(
                "this change needs a signed-in admin session".into(),
            ))
        }
    }

    /// Client for a write: the caller's own token, else the stored session
    /// token when that session is an admin's.
    async fn client_for_write(&self, headers: &HeaderMap) -> Result<BackendClient, ApiError> {
        if let Some(token) = bearer_token(headers) {
            return Ok(self.client.with_token(Some(token)));
        }
        self.require_admin().await?;
        Ok(self.client_for(headers).await)
    }

    fn derive_options(&self, mode: Option<SortMode>) -> DeriveOptions {
        DeriveOptions {
            mode: mode.unwrap_or_default(),
            default_per_fridge: self.engine.default_per_fridge(),
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_owned)
}

static OPENAPI_DOC: OnceLock<utoipa::openapi::OpenApi> = OnceLock::new();

const SWAGGER_UI_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
    <head>
        <meta charset="utf-8" />
        <title>fridge-inventory API Docs</title>
        <link
            rel="stylesheet"
            href="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui.css"
            integrity="sha384-wxLW6kwyHktdDGr6Pv1zgm/VGJh99lfUbzSn6HNHBENZlCN7W602k9VkGdxuFvPn"
            crossorigin="anonymous"
        />
    </head>
    <body>
        <div id="swagger-ui"></div>
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-bundle.js"
            integrity="sha384-wmyclcVGX/WhUkdkATwhaK1X1JtiNrr2EoYJ+diV3vj4v6OC5yCeSu+yW13SYJep"
            crossorigin="anonymous"
        ></script>
        <script>
            window.onload = function () {
                window.ui = SwaggerUIBundle({
                    url: "/docs/openapi.json",
                    dom_id: "#swagger-ui",
                });
            };
        </script>
    </body>
    </html>"##;

fn openapi_doc() -> &'static utoipa::openapi::OpenApi {
    OPENAPI_DOC.get_or_init(ApiDoc::openapi)
}

#[derive(Serialize, ToSchema)]
struct ErrorResponse {
    error: String,
    details: String,
}

impl ErrorResponse {
    fn new(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: details.into(),
        }
    }
}

fn error_response(
    status: StatusCode,
    error: impl Into<String>,
    details: impl Into<String>,
) -> Response {
    (status, Json(ErrorResponse::new(error, details))).into_response()
}

/// Everything a handler can fail with.
#[derive(Debug, Error)]
enum ApiError {
    #[error("{0}")]
    InvalidJson(#[from] JsonRejection),
    #[error("{0}")]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    Backend(#[from] ClientError),
    #[error("{0}")]
    Session(#[from] SessionError),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Unavailable(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let details = self.to_string();
        match self {
            ApiError::InvalidJson(_) => {
                error_response(StatusCode::UNPROCESSABLE_ENTITY, "Invalid JSON data", details)
            }
            ApiError::Validation(_) | ApiError::InvalidInput(_) => {
                error_response(StatusCode::UNPROCESSABLE_ENTITY, "Invalid input data", details)
            }
            ApiError::Backend(ClientError::Unauthorized) => error_response(
                StatusCode::UNAUTHORIZED,
                "Session token rejected by the backend",
                details,
            ),
            ApiError::Backend(_) => {
                error!("Backend call failed: {details}");
                error_response(StatusCode::BAD_GATEWAY, "Backend request failed", details)
            }
            ApiError::Session(_) => {
                error!("Session storage failed: {details}");
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Session could not be stored",
                    details,
                )
            }
            ApiError::Forbidden(_) => {
                error_response(StatusCode::FORBIDDEN, "Admin session required", details)
            }
            ApiError::Unavailable(_) => {
                error_response(StatusCode::SERVICE_UNAVAILABLE, "Not available", details)
            }
        }
    }
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DashboardQuery {
    /// First day of the analytics window (YYYY-MM-DD).
    pub start: Option<NaiveDate>,
    /// Last day of the analytics window (YYYY-MM-DD).
    pub end: Option<NaiveDate>,
    pub mode: Option<SortMode>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SuggestQuery {
    /// Suggestion strategy, `max` when omitted.
    pub method: Option<SuggestMethod>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(
    example = json!({
        "mode": "critical",
        "overview": {
            "stdOrder": ["Leche", "Yogur"],
            "capacityMap": {"leche": 24},
            "locations": [{
                "id": "loc-1",
                "name": "Centro",
                "refrigerators": [{"id": "f-1", "name": "A", "products": [{"productName": "Leche", "quantity": 6}]}]
            }]
        }
    })
)]
pub struct DeriveRequest {
    pub overview: DashboardOverview,
    #[serde(default)]
    pub mode: Option<SortMode>,
}

#[derive(Serialize, ToSchema)]
pub struct DashboardResponse {
    pub mode: SortMode,
    pub locations: Vec<LocationView>,
}

#[derive(Deserialize, ToSchema)]
#[schema(example = json!({"text": "12+2-3*2", "min": 0, "max": 999}))]
pub struct EvaluateRequest {
    pub text: String,
    #[serde(default)]
    pub min: i64,
    #[serde(default = "EvaluateRequest::default_max")]
    pub max: i64,
}

impl EvaluateRequest {
    fn default_max() -> i64 {
        9999
    }
}

#[derive(Serialize, ToSchema)]
pub struct EvaluateResponse {
    /// Evaluated and clamped value; empty for blank input, null when invalid.
    pub value: Option<String>,
    pub valid: bool,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownRow {
    pub product_name: String,
    /// Occupancy ratio; null sorts last in critical mode.
    #[serde(default)]
    pub ratio: Option<f64>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SortRequest {
    pub rows: Vec<BreakdownRow>,
    #[serde(default)]
    pub std_order: Vec<String>,
    #[serde(default)]
    pub mode: SortMode,
}

#[derive(Serialize, ToSchema)]
pub struct SortResponse {
    pub products: Vec<String>,
}

#[derive(Deserialize, ToSchema)]
#[schema(example = json!({"products": ["Leche", "Yogur", "Queso"]}))]
pub struct StandardOrderRequest {
    pub products: Vec<String>,
}

#[derive(Serialize, ToSchema)]
pub struct StandardOrderResponse {
    pub products: Vec<String>,
    pub status: AutosaveStatus,
}

/// Session as shown to clients; the token itself never leaves the service.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub authenticated: bool,
    pub role: Role,
    pub theme: Theme,
    pub keep_alive_minutes: u32,
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        Self {
            authenticated: session.is_authenticated(),
            role: session.role,
            theme: session.theme,
            keep_alive_minutes: session.keep_alive_minutes,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReconciledRow {
    #[serde(flatten)]
    pub row: SessionSummaryRow,
    pub expected: i64,
    pub discrepancy: Option<i64>,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handle_dashboard,
        handle_derive,
        handle_evaluate,
        handle_sort,
        handle_get_standard_order,
        handle_put_standard_order,
        handle_locations,
        handle_location,
        handle_get_capacity,
        handle_put_capacity,
        handle_suggest_capacity,
        handle_get_session,
        handle_put_preferences,
        handle_session_summary,
        handle_status_stream
    ),
    components(
        schemas(
            DeriveRequest,
            DashboardResponse,
            EvaluateRequest,
            EvaluateResponse,
            SortRequest,
            BreakdownRow,
            SortResponse,
            StandardOrderRequest,
            StandardOrderResponse,
            SessionView,
            PreferencesUpdate,
            ReconciledRow,
            ErrorResponse,
            LocationView,
            ProductRow,
            AggregatedAnalytics,
            CapacitySource,
            SortMode,
            AutosaveStatus,
            SaveState,
            SyncReport,
            SuggestMethod,
            StatusSnapshot,
            DashboardOverview,
            Location,
            Refrigerator,
            ProductStock,
            ProductAnalytics,
            CapacityMap,
            CapacityOverrides,
            LocationSummary,
            SessionSummaryRow,
            Role,
            Theme
        )
    ),
    tags(
        (name = "dashboard", description = "Derived capacity and occupancy views"),
        (name = "editor", description = "Quantity input and standard order editing"),
        (name = "capacity", description = "Locations and per-location capacity"),
        (name = "session", description = "Session and preferences")
    )
)]
struct ApiDoc;

/// Assembles the router; split from [`start_api_server`] for tests.
pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/dashboard", get(handle_dashboard))
        .route("/dashboard/derive", post(handle_derive))
        .route("/quantity/evaluate", post(handle_evaluate))
        .route("/breakdown/sort", post(handle_sort))
        .route("/standard-order", put(handle_put_standard_order))
        .route("/standard-order/state", get(handle_get_standard_order))
        .route("/locations", get(handle_locations))
        .route("/locations/{id}", get(handle_location))
        .route(
            "/capacity/{location_id}",
            get(handle_get_capacity).put(handle_put_capacity),
        )
        .route("/capacity/{location_id}/suggest", get(handle_suggest_capacity))
        .route("/session", get(handle_get_session))
        .route("/session/preferences", put(handle_put_preferences))
        .route("/sessions/active/summary", get(handle_session_summary))
        .route("/status/stream", get(handle_status_stream))
        .route("/docs/openapi.json", get(serve_openapi_json))
        .route("/docs", get(serve_openapi_ui))
        .layer(cors)
        .with_state(state)
}

/// Starts the API server.
///
/// Blocks until the server is terminated.
pub async fn start_api_server(config: ApiConfig, state: ApiState) {
    let app = router(state);

    let addr = config.socket_addr();
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("Could not bind API server to {}: {}", addr, err);
            return;
        }
    };

    info!(
        "Server running on http://{}:{}",
        config.display_host(),
        config.port()
    );
    if config.binds_to_all_interfaces() && config.uses_default_host() {
        info!("Local access: http://localhost:{}", config.port());
    }
    info!("Documentation: GET /docs, GET /docs/openapi.json");

    if let Err(err) = axum::serve(listener, app).await {
        error!("API server terminated with an error: {err}");
    }
}

/// Handler for GET /dashboard.
///
/// Loads the overview from the backend and derives one table per location.
#[utoipa::path(
    get,
    path = "/dashboard",
    params(DashboardQuery),
    responses(
        (status = 200, description = "Derived location tables", body = DashboardResponse),
        (status = 401, description = "Backend rejected the token", body = ErrorResponse),
        (status = 502, description = "Backend unavailable", body = ErrorResponse)
    ),
    tag = "dashboard"
)]
async fn handle_dashboard(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<DashboardResponse>, ApiError> {
    if let (Some(start), Some(end)) = (query.start, query.end) {
        if start > end {
            return Err(ApiError::InvalidInput(format!(
                "start ({start}) must not be after end ({end})"
            )));
        }
    }

    let client = state.client_for(&headers).await;
    let overview = client.dashboard_overview(query.start, query.end).await?;
    let options = state.derive_options(query.mode);
    let locations = derive_dashboard(&overview, options);
    info!(
        locations = locations.len(),
        mode = options.mode.as_str(),
        "Dashboard derived"
    );

    Ok(Json(DashboardResponse {
        mode: options.mode,
        locations,
    }))
}

/// Handler for POST /dashboard/derive.
///
/// Derives the tables from an overview supplied by the caller.
#[utoipa::path(
    post,
    path = "/dashboard/derive",
    request_body = DeriveRequest,
    responses(
        (status = 200, description = "Derived location tables", body = DashboardResponse),
        (status = UNPROCESSABLE_ENTITY, description = "Invalid overview", body = ErrorResponse)
    ),
    tag = "dashboard"
)]
async fn handle_derive(
    State(state): State<ApiState>,
    payload: Result<Json<DeriveRequest>, JsonRejection>,
) -> Result<Json<DashboardResponse>, ApiError> {
    let Json(request) = payload?;
    let options = state.derive_options(request.mode);
    Ok(Json(DashboardResponse {
        mode: options.mode,
        locations: derive_dashboard(&request.overview, options),
    }))
}

#[utoipa::path(
    post,
    path = "/quantity/evaluate",
    request_body = EvaluateRequest,
    responses(
        (status = 200, description = "Evaluation result", body = EvaluateResponse),
        (status = UNPROCESSABLE_ENTITY, description = "min greater than max", body = ErrorResponse)
    ),
    tag = "editor"
)]
async fn handle_evaluate(
    payload: Result<Json<EvaluateRequest>, JsonRejection>,
) -> Result<Json<EvaluateResponse>, ApiError> {
    let Json(request) = payload?;
    if request.min > request.max {
        return Err(ValidationError::InvalidRange {
            min: request.min,
            max: request.max,
        }
        .into());
    }
    let value = evaluate(&request.text, request.min, request.max);
    Ok(Json(EvaluateResponse {
        valid: value.is_some(),
        value,
    }))
}

#[utoipa::path(
    post,
    path = "/breakdown/sort",
    request_body = SortRequest,
    responses(
        (status = 200, description = "Ordered product names", body = SortResponse)
    ),
    tag = "dashboard"
)]
async fn handle_sort(
    payload: Result<Json<SortRequest>, JsonRejection>,
) -> Result<Json<SortResponse>, ApiError> {
    let Json(request) = payload?;
    let index = build_order_index(&request.std_order);
    let mut ratios: HashMap<&str, f64> = HashMap::with_capacity(request.rows.len());
    for row in &request.rows {
        ratios
            .entry(row.product_name.as_str())
            .or_insert(row.ratio.unwrap_or(f64::NAN));
    }
    let names: Vec<&str> = request.rows.iter().map(|r| r.product_name.as_str()).collect();
    let products = sort_breakdown(
        &names,
        |name| ratios.get(name).copied().unwrap_or(f64::NAN),
        |name| {
            index
                .get(&normalize(name))
                .copied()
                .unwrap_or(UNRANKED_POSITION)
        },
        request.mode,
    );
    Ok(Json(SortResponse { products }))
}

#[utoipa::path(
    get,
    path = "/standard-order/state",
    responses(
        (status = 200, description = "Local ordering and save state", body = StandardOrderResponse)
    ),
    tag = "editor"
)]
async fn handle_get_standard_order(State(state): State<ApiState>) -> Json<StandardOrderResponse> {
    Json(StandardOrderResponse {
        products: state.autosave.order().names().to_vec(),
        status: state.autosave.status(),
    })
}

/// Handler for PUT /standard-order.
///
/// Applies the new ordering locally right away; saving and the fridge sync
/// follow after the debounce.
#[utoipa::path(
    put,
    path = "/standard-order",
    request_body = StandardOrderRequest,
    responses(
        (status = 202, description = "Ordering accepted, save scheduled", body = StandardOrderResponse),
        (status = 403, description = "Stored session is not an admin's", body = ErrorResponse),
        (status = UNPROCESSABLE_ENTITY, description = "Duplicate or empty product names", body = ErrorResponse)
    ),
    tag = "editor"
)]
async fn handle_put_standard_order(
    State(state): State<ApiState>,
    payload: Result<Json<StandardOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<StandardOrderResponse>), ApiError> {
    state.require_admin().await?;
    let Json(request) = payload?;
    state.autosave.replace(request.products)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(StandardOrderResponse {
            products: state.autosave.order().names().to_vec(),
            status: state.autosave.status(),
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/locations",
    responses(
        (status = 200, description = "All locations with their refrigerators", body = Vec<Location>),
        (status = 502, description = "Backend unavailable", body = ErrorResponse)
    ),
    tag = "capacity"
)]
async fn handle_locations(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Location>>, ApiError> {
    let client = state.client_for(&headers).await;
    Ok(Json(client.locations().await?))
}

#[utoipa::path(
    get,
    path = "/locations/{id}",
    params(("id" = String, Path, description = "Location id")),
    responses(
        (status = 200, description = "The location", body = Location),
        (status = 502, description = "Backend unavailable or unknown id", body = ErrorResponse)
    ),
    tag = "capacity"
)]
async fn handle_location(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Location>, ApiError> {
    let client = state.client_for(&headers).await;
    Ok(Json(client.location(&id).await?))
}

#[utoipa::path(
    get,
    path = "/capacity/{location_id}",
    params(("location_id" = String, Path, description = "Location id")),
    responses(
        (status = 200, description = "Capacity overrides of the location", body = CapacityMap),
        (status = 502, description = "Backend unavailable", body = ErrorResponse)
    ),
    tag = "capacity"
)]
async fn handle_get_capacity(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(location_id): Path<String>,
) -> Result<Json<CapacityMap>, ApiError> {
    let client = state.client_for(&headers).await;
    Ok(Json(client.location_capacity(&location_id).await?))
}

/// Handler for PUT /capacity/{location_id}.
///
/// Keys are normalized and non-positive values dropped before saving.
#[utoipa::path(
    put,
    path = "/capacity/{location_id}",
    params(("location_id" = String, Path, description = "Location id")),
    request_body = CapacityMap,
    responses(
        (status = 200, description = "Saved capacity overrides", body = CapacityMap),
        (status = 403, description = "No bearer token and no admin session", body = ErrorResponse),
        (status = 502, description = "Backend unavailable", body = ErrorResponse)
    ),
    tag = "capacity"
)]
async fn handle_put_capacity(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(location_id): Path<String>,
    payload: Result<Json<CapacityMap>, JsonRejection>,
) -> Result<Json<CapacityMap>, ApiError> {
    let client = state.client_for_write(&headers).await?;
    let Json(capacity) = payload?;
    client.save_location_capacity(&location_id, &capacity).await?;
    info!(%location_id, products = capacity.len(), "Location capacity saved");
    Ok(Json(capacity))
}

#[utoipa::path(
    get,
    path = "/capacity/{location_id}/suggest",
    params(
        ("location_id" = String, Path, description = "Location id"),
        SuggestQuery
    ),
    responses(
        (status = 200, description = "Suggested capacity per product", body = CapacityMap),
        (status = 502, description = "Backend unavailable", body = ErrorResponse)
    ),
    tag = "capacity"
)]
async fn handle_suggest_capacity(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(location_id): Path<String>,
    Query(query): Query<SuggestQuery>,
) -> Result<Json<CapacityMap>, ApiError> {
    let client = state.client_for(&headers).await;
    let method = query.method.unwrap_or(SuggestMethod::Max);
    Ok(Json(client.suggest_capacity(&location_id, method).await?))
}

#[utoipa::path(
    get,
    path = "/session",
    responses((status = 200, description = "Current session", body = SessionView)),
    tag = "session"
)]
async fn handle_get_session(State(state): State<ApiState>) -> Json<SessionView> {
    Json(SessionView::from(&*state.session.read().await))
}

#[utoipa::path(
    put,
    path = "/session/preferences",
    request_body = PreferencesUpdate,
    responses(
        (status = 200, description = "Updated session", body = SessionView),
        (status = 500, description = "Session file could not be written", body = ErrorResponse)
    ),
    tag = "session"
)]
async fn handle_put_preferences(
    State(state): State<ApiState>,
    payload: Result<Json<PreferencesUpdate>, JsonRejection>,
) -> Result<Json<SessionView>, ApiError> {
    let Json(update) = payload?;
    let mut session = state.session.write().await;
    let mut updated = session.clone();
    update.apply(&mut updated);
    state.session_store.save(&updated).await?;
    *session = updated;
    Ok(Json(SessionView::from(&*session)))
}

/// Handler for GET /sessions/active/summary.
///
/// Adds the expected closing quantity and the counted discrepancy to every
/// row of the active stock-take.
#[utoipa::path(
    get,
    path = "/sessions/active/summary",
    responses(
        (status = 200, description = "Reconciled stock-take rows", body = Vec<ReconciledRow>),
        (status = 502, description = "Backend unavailable", body = ErrorResponse)
    ),
    tag = "dashboard"
)]
async fn handle_session_summary(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<Vec<ReconciledRow>>, ApiError> {
    let client = state.client_for(&headers).await;
    let rows = client.active_session_summary().await?;
    Ok(Json(
        rows.into_iter()
            .map(|row| ReconciledRow {
                expected: row.expected(),
                discrepancy: row.discrepancy(),
                row,
            })
            .collect(),
    ))
}

/// Handler for GET /status/stream (SSE).
///
/// Streams every change of the keep-alive status widget, including the
/// one-second countdown.
#[utoipa::path(
    get,
    path = "/status/stream",
    responses(
        (
            status = 200,
            description = "Streams status snapshots",
            content_type = "text/event-stream",
            body = String
        ),
        (status = 503, description = "Status polling is disabled", body = ErrorResponse)
    ),
    tag = "session"
)]
async fn handle_status_stream(State(state): State<ApiState>) -> Result<Response, ApiError> {
    let Some(rx) = state.status.clone() else {
        return Err(ApiError::Unavailable(
            "status polling is disabled (FRIDGE_INVENTORY_STATUS_POLL_ENABLED)".into(),
        ));
    };

    let stream = WatchStream::new(rx).map(|snapshot| Event::default().json_data(&snapshot));
    Ok(Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(std::time::Duration::from_secs(10))
                .text("keep-alive"),
        )
        .into_response())
}

async fn serve_openapi_json(State(_state): State<ApiState>) -> impl IntoResponse {
    Json(openapi_doc())
}

async fn serve_openapi_ui(State(_state): State<ApiState>) -> impl IntoResponse {
    Html(SWAGGER_UI_HTML)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_doc_lists_expected_paths() {
        let doc = openapi_doc();
        let paths = &doc.paths.paths;
        for path in [
            "/dashboard",
            "/dashboard/derive",
            "/quantity/evaluate",
            "/breakdown/sort",
            "/standard-order",
            "/capacity/{location_id}",
            "/capacity/{location_id}/suggest",
            "/locations/{id}",
            "/status/stream",
        ] {
            assert!(
                paths.contains_key(path),
                "OpenAPI documentation is missing the {} path",
                path
            );
        }
    }

    #[test]
    fn openapi_doc_contains_key_schemas() {
        let doc = openapi_doc();
        let components = doc
            .components
            .as_ref()
            .expect("OpenAPI documentation contains no components");
        let schemas = &components.schemas;
        for name in ["DashboardResponse", "EvaluateResponse", "ErrorResponse", "LocationView"] {
            assert!(
                schemas.contains_key(name),
                "Expected schema '{}' is missing from OpenAPI spec",
                name
            );
        }
    }

    #[test]
    fn bearer_token_is_extracted() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, "Bearer abc123".parse().unwrap());
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc123"));

        headers.insert(header::AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, "Bearer   ".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn evaluate_request_defaults_range() {
        let request: EvaluateRequest = serde_json::from_str(r#"{"text": "2*3"}"#).unwrap();
        assert_eq!(request.min, 0);
        assert_eq!(request.max, 9999);
    }

    #[test]
    fn derive_request_parses_mode() {
        let json = r#"{"overview": {"stdOrder": []}, "mode": "alpha"}"#;
        let request: DeriveRequest = serde_json::from_str(json).expect("Should parse valid JSON");
        assert_eq!(request.mode, Some(SortMode::Alpha));

        let json = r#"{"overview": {}}"#;
        let request: DeriveRequest = serde_json::from_str(json).expect("Should parse valid JSON");
        assert_eq!(request.mode, None);
    }

    #[test]
    fn validation_errors_map_to_unprocessable_entity() {
        let response = ApiError::from(ValidationError::InvalidRange { min: 5, max: 1 }).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let response = ApiError::from(ClientError::Unauthorized).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    mod routes {
        use super::*;
        use crate::types::StandardOrder;
        use std::time::Duration;

        struct TestApp {
            base: String,
            autosave: Arc<AutosaveController>,
            http: reqwest::Client,
            _dir: tempfile::TempDir,
        }

        async fn spawn_app(role: Role) -> TestApp {
            let dir = tempfile::tempdir().unwrap();
            // Nothing listens on the discard port; the long debounce keeps
            // the autosave from ever reaching it.
            let client =
                BackendClient::with_base_url("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
            let autosave = Arc::new(AutosaveController::new(
                Arc::new(client.clone()),
                Duration::from_secs(3600),
                StandardOrder::new(vec!["Milk".into()]).unwrap(),
            ));
            let session = Session {
                token: Some("stored".into()),
                role,
                ..Session::default()
            };
            let state = ApiState::new(
                EngineConfig::default(),
                client,
                session,
                SessionStore::new(dir.path().join("session.json")),
                Arc::clone(&autosave),
                None,
            );

            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, router(state)).await.unwrap();
            });

            TestApp {
                base: format!("http://{addr}"),
                autosave,
                http: reqwest::Client::new(),
                _dir: dir,
            }
        }

        #[tokio::test]
        async fn standard_order_edit_requires_admin_session() {
            let app = spawn_app(Role::User).await;
            let response = app
                .http
                .put(format!("{}/standard-order", app.base))
                .json(&serde_json::json!({"products": ["Eggs", "Milk"]}))
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), reqwest::StatusCode::FORBIDDEN);
            assert_eq!(app.autosave.order().names(), ["Milk".to_string()]);
            assert_eq!(app.autosave.status().state, SaveState::Idle);
        }

        #[tokio::test]
        async fn admin_session_schedules_standard_order_save() {
            let app = spawn_app(Role::Admin).await;
            let response = app
                .http
                .put(format!("{}/standard-order", app.base))
                .json(&serde_json::json!({"products": ["Eggs", "Milk"]}))
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);
            assert_eq!(
                app.autosave.order().names(),
                ["Eggs".to_string(), "Milk".to_string()]
            );
            assert_eq!(app.autosave.status().state, SaveState::Pending);
        }

        #[tokio::test]
        async fn capacity_write_without_token_requires_admin_session() {
            let app = spawn_app(Role::User).await;
            let response = app
                .http
                .put(format!("{}/capacity/loc-1", app.base))
                .json(&serde_json::json!({"milk": 12}))
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), reqwest::StatusCode::FORBIDDEN);
        }

        #[tokio::test]
        async fn standard_order_is_read_from_state_route_only() {
            let app = spawn_app(Role::User).await;
            let state = app
                .http
                .get(format!("{}/standard-order/state", app.base))
                .send()
                .await
                .unwrap();
            assert_eq!(state.status(), reqwest::StatusCode::OK);

            let duplicate = app
                .http
                .get(format!("{}/standard-order", app.base))
                .send()
                .await
                .unwrap();
            assert_eq!(duplicate.status(), reqwest::StatusCode::METHOD_NOT_ALLOWED);
        }
    }
}
