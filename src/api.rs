//! REST API for the packing service.
//!
//! Provides HTTP endpoints for order fulfilment tooling.
//! Uses Axum as the web framework and supports CORS.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    Router,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::OnceLock;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use utoipa::{OpenApi, ToSchema};

use crate::arrangement::placed_items;
use crate::config::{ApiConfig, EngineConfig};
use crate::layer::{Layer, LayerColumn, LayerKind};
use crate::model::{
    BoxDims, BoxId, Carton, ItemDims, ItemProfile, OrderLineEntry, PlacedItem, ValidationError,
    aggregate_lines, validate_catalog, validate_order_total,
};
use crate::optimizer::{
    OrderRequest, PackingConfig, pack_order_split, pack_order_with_progress, pack_request,
};
use crate::orientation::Permutation;
use crate::plan::{MAX_PLAN_QUANTITY, QuantityPlan, QuantityRange, plan_quantities};
use crate::summary::{
    BoxRejection, EntryQuantity, PackedLayer, PackingFailure, PackingSelection, PackingStatus,
    PackingSummary, RejectionReason, describe_layer, describe_layer_type, format_void_ratio,
};
use crate::weight::WeightBreakdown;

#[derive(Clone)]
struct ApiState {
    engine_config: EngineConfig,
}

static OPENAPI_DOC: OnceLock<utoipa::openapi::OpenApi> = OnceLock::new();

// SRI hashes verified against https://unpkg.com/swagger-ui-dist@5.17.14/ on 2025-10-29.
const SWAGGER_UI_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
    <head>
        <meta charset="utf-8" />
        <title>carton-packer API Docs</title>
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
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-standalone-preset.js"
            integrity="sha384-2YH8WDRaj7V2OqU/trsmzSagmk/E2SutiCsGkdgoQwC9pNUJV1u/141DHB6jgs8t"
            crossorigin="anonymous"
        ></script>
        <script>
            window.onload = function () {
                const ui = SwaggerUIBundle({
                    url: "/docs/openapi.json",
                    dom_id: "#swagger-ui",
                    presets: [SwaggerUIBundle.presets.apis, SwaggerUIStandalonePreset],
                    layout: "StandaloneLayout",
                });
                window.ui = ui;
            };
        </script>
    </body>
    </html>"##;

fn openapi_doc() -> &'static utoipa::openapi::OpenApi {
    OPENAPI_DOC.get_or_init(ApiDoc::openapi)
}

/// Request structure for the packing endpoints.
///
/// `boxes` is the candidate catalog; without `manualBoxId` the smallest
/// adequate box is chosen automatically.
#[derive(Deserialize, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(
    example = json!({
        "entries": [
            { "id": "SKU-1", "dims": { "w": 100.0, "d": 80.0, "h": 50.0 }, "unitWeightKg": 0.4, "quantity": 24 }
        ],
        "boxes": [
            { "id": "M-60", "inner": { "W": 600.0, "D": 400.0, "H": 400.0 }, "maxWeightKg": 25.0 }
        ]
    })
)]
pub struct PackRequest {
    pub entries: Vec<OrderLineEntry>,
    pub boxes: Vec<Carton>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub manual_box_id: Option<BoxId>,
    /// Report failures as `pending` (order still being edited).
    #[serde(default)]
    pub provisional: bool,
    /// Merge lines with identical packing profiles before packing.
    #[serde(default)]
    pub merge_identical_lines: bool,
    /// Include absolute unit positions in the response.
    #[serde(default)]
    pub include_placements: bool,
    #[serde(default)]
    #[schema(nullable = true)]
    pub packaging_multiplier: Option<f64>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub box_padding: Option<f64>,
}

/// Request for the explicit multi-box split.
#[derive(Deserialize, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SplitRequest {
    #[serde(flatten)]
    pub request: PackRequest,
    #[serde(default = "default_max_boxes")]
    pub max_boxes: usize,
}

fn default_max_boxes() -> usize {
    10
}

/// Request for a per-quantity box plan of one SKU.
#[derive(Deserialize, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlanRequest {
    pub item: ItemProfile,
    pub boxes: Vec<Carton>,
    /// Highest quantity to plan; clamped to 500.
    #[serde(default = "default_max_quantity")]
    pub max_quantity: u32,
    #[serde(default)]
    #[schema(nullable = true)]
    pub box_padding: Option<f64>,
}

fn default_max_quantity() -> u32 {
    20
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlanResponse {
    item_id: String,
    /// Quantity the plan actually walked up to.
    max_quantity: u32,
    ranges: Vec<QuantityRange>,
}

#[derive(Debug)]
struct ValidatedPackRequest {
    order: OrderRequest,
    config: PackingConfig,
    include_placements: bool,
}

impl ValidatedPackRequest {
    fn entry_count(&self) -> usize {
        self.order.entries.len()
    }

    fn box_count(&self) -> usize {
        self.order.boxes.len()
    }
}

#[derive(Debug)]
enum PackRequestValidationError {
    InvalidEntry(ValidationError),
    InvalidCatalog(ValidationError),
    InvalidConfiguration(ValidationError),
}

impl PackRequest {
    fn into_validated(
        self,
        base: PackingConfig,
    ) -> Result<ValidatedPackRequest, PackRequestValidationError> {
        let mut config = base;
        if let Some(multiplier) = self.packaging_multiplier {
            config.packaging_multiplier = multiplier;
        }
        if let Some(padding) = self.box_padding {
            config.box_padding = padding;
        }
        config
            .validate()
            .map_err(PackRequestValidationError::InvalidConfiguration)?;

        for entry in &self.entries {
            entry
                .validate()
                .map_err(PackRequestValidationError::InvalidEntry)?;
        }
        validate_order_total(&self.entries).map_err(PackRequestValidationError::InvalidEntry)?;
        validate_catalog(&self.boxes).map_err(PackRequestValidationError::InvalidCatalog)?;
        if let Some(id) = &self.manual_box_id {
            if !self.boxes.iter().any(|b| &b.id == id) {
                return Err(PackRequestValidationError::InvalidCatalog(
                    ValidationError::UnknownBox(id.clone()),
                ));
            }
        }

        let entries = if self.merge_identical_lines {
            aggregate_lines(&self.entries)
        } else {
            self.entries
        };

        Ok(ValidatedPackRequest {
            order: OrderRequest {
                entries,
                boxes: self.boxes,
                manual_box_id: self.manual_box_id,
                provisional: self.provisional,
            },
            config,
            include_placements: self.include_placements,
        })
    }
}

/// Human-readable view of one packed layer.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LayerReport {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub elevation: f64,
    pub placed: u32,
}

/// Display data for one selection.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SelectionReport {
    pub box_id: BoxId,
    pub void_ratio: String,
    pub layers: Vec<LayerReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub placements: Vec<PlacedItem>,
}

/// Response structure: the packing summary plus display data.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PackResponse {
    pub summary: PackingSummary,
    pub reports: Vec<SelectionReport>,
    pub is_complete: bool,
}

impl PackResponse {
    /// Creates a PackResponse from a PackingSummary.
    pub fn from_summary(summary: PackingSummary, include_placements: bool, box_padding: f64) -> Self {
        let reports = summary
            .selections
            .iter()
            .map(|selection| SelectionReport {
                box_id: selection.box_id.clone(),
                void_ratio: format_void_ratio(selection.void_ratio),
                layers: selection
                    .layers
                    .iter()
                    .map(|packed| LayerReport {
                        kind: describe_layer_type(&packed.layer).to_string(),
                        description: describe_layer(&packed.layer),
                        elevation: packed.elevation,
                        placed: packed.placed_total(),
                    })
                    .collect(),
                placements: if include_placements {
                    placed_items(selection, box_padding)
                } else {
                    Vec::new()
                },
            })
            .collect();

        Self {
            is_complete: summary.is_success(),
            summary,
            reports,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
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

fn json_deserialize_error(err: JsonRejection) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid JSON data",
        err.to_string(),
    )
}

fn validation_error(details: impl Into<String>) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid input data",
        details,
    )
}

fn catalog_error(details: impl Into<String>) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid box catalog",
        details,
    )
}

fn configuration_error(details: impl Into<String>) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid packing configuration",
        details,
    )
}

fn validation_response(err: PackRequestValidationError) -> Response {
    match err {
        PackRequestValidationError::InvalidEntry(err) => validation_error(err.to_string()),
        PackRequestValidationError::InvalidCatalog(err) => catalog_error(err.to_string()),
        PackRequestValidationError::InvalidConfiguration(err) => {
            configuration_error(err.to_string())
        }
    }
}

fn parse_pack_request(
    payload: Result<Json<PackRequest>, JsonRejection>,
    base: PackingConfig,
) -> Result<ValidatedPackRequest, Response> {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(err) => return Err(json_deserialize_error(err)),
    };
    payload.into_validated(base).map_err(validation_response)
}

#[derive(OpenApi)]
#[openapi(
    paths(handle_pack, handle_pack_split, handle_pack_stream, handle_plan, handle_health),
    components(
        schemas(
            PackRequest,
            SplitRequest,
            PlanRequest,
            PlanResponse,
            QuantityRange,
            QuantityPlan,
            ItemProfile,
            PackResponse,
            SelectionReport,
            LayerReport,
            HealthResponse,
            ErrorResponse,
            OrderLineEntry,
            ItemDims,
            Carton,
            BoxDims,
            PackingSummary,
            PackingSelection,
            PackedLayer,
            Layer,
            LayerColumn,
            LayerKind,
            Permutation,
            EntryQuantity,
            WeightBreakdown,
            PackingStatus,
            PackingFailure,
            BoxRejection,
            RejectionReason,
            PlacedItem
        )
    ),
    tags((name = "packing", description = "Endpoints for carton packing and box selection"))
)]
struct ApiDoc;

fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        // API endpoints
        .route("/pack", post(handle_pack))
        .route("/pack/split", post(handle_pack_split))
        .route("/pack_stream", post(handle_pack_stream))
        .route("/plan", post(handle_plan))
        .route("/health", get(handle_health))
        // API documentation
        .route("/docs/openapi.json", get(serve_openapi_json))
        .route("/docs", get(serve_openapi_ui))
        .layer(cors)
        .with_state(state)
}

/// Starts the API server.
///
/// Configures CORS for cross-origin requests.
/// Blocks until the server is terminated.
pub async fn start_api_server(config: ApiConfig, engine_config: EngineConfig) -> std::io::Result<()> {
    let app = router(ApiState { engine_config });

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let display_host = config.display_host().to_string();
    tracing::info!("Server running on http://{}:{}", display_host, config.port());
    if config.binds_to_all_interfaces() && config.uses_default_host() {
        tracing::info!("Local access: http://localhost:{}", config.port());
    }
    tracing::info!(
        "API endpoints: POST /pack, POST /pack/split, POST /pack_stream, POST /plan, GET /health"
    );
    tracing::info!("Documentation: GET /docs, GET /docs/openapi.json");

    axum::serve(listener, app).await
}

/// Handler for POST /pack endpoint.
///
/// Packs one order into a single box: the operator's box when
/// `manualBoxId` is set, otherwise the smallest adequate catalog box.
#[utoipa::path(
    post,
    path = "/pack",
    request_body = PackRequest,
    responses(
        (status = 200, description = "Packing computed (check summary.status)", body = PackResponse),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid entries, catalog or configuration",
            body = ErrorResponse
        )
    ),
    tag = "packing"
)]
async fn handle_pack(
    State(state): State<ApiState>,
    payload: Result<Json<PackRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match parse_pack_request(payload, state.engine_config.packing_config()) {
        Ok(request) => request,
        Err(response) => return response,
    };

    tracing::info!(
        entries = request.entry_count(),
        boxes = request.box_count(),
        manual = request.order.manual_box_id.is_some(),
        "New pack request"
    );
    match pack_request(&request.order, &request.config) {
        Ok(summary) => {
            tracing::info!(
                status = ?summary.status,
                primary_box = summary.primary_box_id.as_deref().unwrap_or("-"),
                leftover = summary.leftover,
                "Pack result"
            );
            let response = PackResponse::from_summary(
                summary,
                request.include_placements,
                request.config.box_padding,
            );
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(err) => validation_error(err.to_string()),
    }
}

/// Handler for POST /pack/split endpoint.
///
/// Re-runs automatic selection on the leftover until everything is packed,
/// no progress is possible, or `maxBoxes` boxes are used.
#[utoipa::path(
    post,
    path = "/pack/split",
    request_body = SplitRequest,
    responses(
        (status = 200, description = "Multi-box packing computed", body = PackResponse),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid entries, catalog or configuration",
            body = ErrorResponse
        )
    ),
    tag = "packing"
)]
async fn handle_pack_split(
    State(state): State<ApiState>,
    payload: Result<Json<SplitRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(split) = match payload {
        Ok(payload) => payload,
        Err(err) => return json_deserialize_error(err),
    };
    let max_boxes = split.max_boxes;
    let ceiling = state.engine_config.max_split_boxes();
    if max_boxes > ceiling {
        return configuration_error(format!(
            "maxBoxes must not exceed {ceiling}, got: {max_boxes}"
        ));
    }
    let request = match split
        .request
        .into_validated(state.engine_config.packing_config())
    {
        Ok(request) => request,
        Err(err) => return validation_response(err),
    };

    tracing::info!(
        entries = request.entry_count(),
        boxes = request.box_count(),
        max_boxes,
        "New split request"
    );
    match pack_order_split(&request.order, &request.config, max_boxes) {
        Ok(summary) => {
            tracing::info!(
                status = ?summary.status,
                selections = summary.selections.len(),
                leftover = summary.leftover,
                "Split result"
            );
            let response = PackResponse::from_summary(
                summary,
                request.include_placements,
                request.config.box_padding,
            );
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(err) => configuration_error(err.to_string()),
    }
}

/// Handler for POST /pack_stream endpoint (SSE).
///
/// Streams candidate evaluations, rejections and the final selection as
/// Server-Sent Events (text/event-stream).
#[utoipa::path(
    post,
    path = "/pack_stream",
    request_body = PackRequest,
    responses(
        (
            status = 200,
            description = "Streams pack events in real-time",
            content_type = "text/event-stream",
            body = String
        ),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid entries, catalog or configuration",
            body = ErrorResponse
        )
    ),
    tag = "packing"
)]
async fn handle_pack_stream(
    State(state): State<ApiState>,
    payload: Result<Json<PackRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match parse_pack_request(payload, state.engine_config.packing_config()) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let (tx, rx) = mpsc::channel::<String>(32);

    tokio::task::spawn_blocking(move || {
        let result = pack_order_with_progress(&request.order, &request.config, |evt| {
            if let Ok(json) = serde_json::to_string(evt) {
                // A closed receiver means the client went away; remaining events are dropped.
                let _ = tx.blocking_send(json);
            }
        });
        if let Err(err) = result {
            let payload = json!({ "type": "Error", "details": err.to_string() });
            let _ = tx.blocking_send(payload.to_string());
        }
    });

    let stream = ReceiverStream::new(rx)
        .map(|msg| Ok::<_, std::convert::Infallible>(Event::default().data(msg)));
    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(std::time::Duration::from_secs(10))
                .text("keep-alive"),
        )
        .into_response()
}

/// Handler for POST /plan endpoint.
///
/// Runs single-box selection for every quantity up to `maxQuantity` and
/// groups consecutive quantities sharing one arrangement into ranges.
#[utoipa::path(
    post,
    path = "/plan",
    request_body = PlanRequest,
    responses(
        (status = 200, description = "Quantity ranges with their box plan", body = PlanResponse),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid item, catalog or configuration",
            body = ErrorResponse
        )
    ),
    tag = "packing"
)]
async fn handle_plan(
    State(state): State<ApiState>,
    payload: Result<Json<PlanRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(err) => return json_deserialize_error(err),
    };
    let mut config = state.engine_config.packing_config();
    if let Some(padding) = request.box_padding {
        config.box_padding = padding;
    }
    if let Err(err) = config.validate() {
        return configuration_error(err.to_string());
    }
    if let Err(err) = validate_catalog(&request.boxes) {
        return catalog_error(err.to_string());
    }

    tracing::info!(
        item_id = %request.item.id,
        boxes = request.boxes.len(),
        max_quantity = request.max_quantity,
        "New plan request"
    );
    let max_quantity = request.max_quantity.min(MAX_PLAN_QUANTITY);
    let item_id = request.item.id.clone();
    let planned = tokio::task::spawn_blocking(move || {
        plan_quantities(&request.item, &request.boxes, request.max_quantity, &config)
    })
    .await;

    match planned {
        Ok(Ok(ranges)) => {
            tracing::info!(ranges = ranges.len(), "Plan result");
            let response = PlanResponse {
                item_id,
                max_quantity,
                ranges,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Ok(Err(err)) => validation_error(err.to_string()),
        Err(err) => {
            tracing::error!("Planning task failed: {}", err);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Planning failed",
                err.to_string(),
            )
        }
    }
}

/// Handler for GET /health endpoint.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is running", body = HealthResponse)),
    tag = "packing"
)]
async fn handle_health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn serve_openapi_json(State(_state): State<ApiState>) -> impl IntoResponse {
    Json(openapi_doc())
}

async fn serve_openapi_ui(State(_state): State<ApiState>) -> impl IntoResponse {
    Html(SWAGGER_UI_HTML)
}
