//! REST API for the splitting service.
//!
//! Accepts a facility layout, item quantities and zip code occurrences, runs the planner on the
//! blocking pool and returns the best candidate. Uses Axum as the web framework and supports CORS.

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
#[allow(unused_imports)]
use serde_json::json;
use std::sync::{Arc, OnceLock};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};
use utoipa::{OpenApi, ToSchema};

use crate::config::{ApiConfig, SolverConfig};
use crate::facility::{ConfigGroup, Facility, Line, LineConfiguration};
use crate::loader::{self, LoadError};
use crate::model::{Allocation, Item, ValidationError, ZipOccurrences, validate_items};
use crate::planner::{PlanError, PlanEvent, PlanInput, PlanReport, plan, plan_with_progress};

#[derive(Clone)]
struct ApiState {
    solver: SolverConfig,
}

static OPENAPI_DOC: OnceLock<utoipa::openapi::OpenApi> = OnceLock::new();

// SRI hashes verified against https://unpkg.com/swagger-ui-dist@5.17.14/ on 2025-10-29.
const SWAGGER_UI_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
    <head>
        <meta charset="utf-8" />
        <title>split-it-now API Docs</title>
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

/// Line configuration as sent by the client.
#[derive(Deserialize, Clone, ToSchema)]
pub struct ConfigurationRequest {
    pub id: u32,
    pub pockets: usize,
    pub min_quantity_per_line: u64,
    pub max_quantity_all_lines: u64,
}

/// Physical line referencing a configuration id.
#[derive(Deserialize, Clone, ToSchema)]
pub struct LineRequest {
    pub configuration: u32,
}

#[derive(Deserialize, Clone, ToSchema)]
pub struct ItemRequest {
    pub id: String,
    pub quantity: u64,
}

/// Ordered item occurrences of one zip code.
#[derive(Deserialize, Clone, ToSchema)]
pub struct ZipOccurrenceRequest {
    pub zip_code: String,
    pub items: Vec<String>,
}

/// Request structure for the planning endpoints.
///
/// `items` may be omitted; quantities are then derived from the occurrence counts.
/// `occurrence_records` accepts `zip_code,item_id` lines in addition to `zip_occurrences`.
#[derive(Deserialize, ToSchema)]
#[schema(
    example = json!({
        "configurations": [
            { "id": 1, "pockets": 2, "min_quantity_per_line": 0, "max_quantity_all_lines": 10 },
            { "id": 2, "pockets": 2, "min_quantity_per_line": 0, "max_quantity_all_lines": 100 }
        ],
        "lines": [ { "configuration": 1 }, { "configuration": 2 } ],
        "items": [
            { "id": "a", "quantity": 8 },
            { "id": "b", "quantity": 9 },
            { "id": "c", "quantity": 30 }
        ],
        "zip_occurrences": [
            { "zip_code": "10001", "items": ["c", "c", "b"] }
        ]
    })
)]
pub struct PlanRequest {
    pub configurations: Vec<ConfigurationRequest>,
    pub lines: Vec<LineRequest>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub items: Option<Vec<ItemRequest>>,
    #[serde(default)]
    pub zip_occurrences: Vec<ZipOccurrenceRequest>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub occurrence_records: Option<String>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub max_candidates: Option<usize>,
}

#[derive(Debug)]
struct ValidatedPlanRequest {
    input: PlanInput,
    max_candidates: Option<usize>,
}

#[derive(Debug)]
enum PlanRequestValidationError {
    MissingLines,
    InvalidFacility(ValidationError),
    InvalidItems(ValidationError),
    InvalidRecords(LoadError),
}

impl PlanRequest {
    fn into_validated(self) -> Result<ValidatedPlanRequest, PlanRequestValidationError> {
        if self.lines.is_empty() {
            return Err(PlanRequestValidationError::MissingLines);
        }

        let configurations = self
            .configurations
            .into_iter()
            .map(|c| {
                LineConfiguration::new(
                    c.id,
                    c.pockets,
                    c.min_quantity_per_line,
                    c.max_quantity_all_lines,
                )
            })
            .collect::<Result<Vec<_>, ValidationError>>()
            .map_err(PlanRequestValidationError::InvalidFacility)?;
        let lines = self
            .lines
            .into_iter()
            .map(|l| Line {
                configuration: l.configuration,
            })
            .collect();
        let facility = Facility::new(configurations, lines)
            .map_err(PlanRequestValidationError::InvalidFacility)?;

        let mut zip_occurrences = ZipOccurrences::new();
        for zip in self.zip_occurrences {
            let code = zip.zip_code.trim();
            if code.is_empty() {
                return Err(PlanRequestValidationError::InvalidItems(
                    ValidationError::EmptyZipCode,
                ));
            }
            zip_occurrences.extend_zip(code, zip.items.iter().map(|i| Arc::from(i.trim())));
        }
        if let Some(records) = self.occurrence_records {
            loader::parse_into(records.as_bytes(), &mut zip_occurrences)
                .map_err(PlanRequestValidationError::InvalidRecords)?;
        }

        let items = match self.items {
            Some(items) => items
                .into_iter()
                .map(|i| Item::new(&i.id, i.quantity))
                .collect::<Result<Vec<_>, ValidationError>>()
                .map_err(PlanRequestValidationError::InvalidItems)?,
            None => zip_occurrences.item_counts(),
        };
        validate_items(&items).map_err(PlanRequestValidationError::InvalidItems)?;
        zip_occurrences
            .validate_against(&items)
            .map_err(PlanRequestValidationError::InvalidItems)?;

        Ok(ValidatedPlanRequest {
            input: PlanInput::new(facility, items, zip_occurrences),
            max_candidates: self.max_candidates,
        })
    }
}

/// Response of the planning endpoint.
///
/// # Fields
/// * `best` - Allocations of the best candidate per configuration group, `null` when no
///   candidate earned a package
/// * `scores` - Package count of every validated candidate
#[derive(Serialize, ToSchema)]
pub struct PlanResponse {
    pub best_packages: u64,
    pub best_index: Option<usize>,
    pub best: Option<Vec<AllocationResponse>>,
    pub scores: Vec<u64>,
    pub groups: Vec<GroupResponse>,
    pub split_budget: usize,
    pub generated: usize,
    pub valid: usize,
    pub nodes_explored: u64,
    pub truncated: bool,
    pub generation_ms: u64,
    pub scoring_ms: u64,
}

/// Merged configuration group, in search order.
#[derive(Serialize, ToSchema)]
pub struct GroupResponse {
    pub pockets: usize,
    pub min_quantity_per_line: u64,
    pub max_quantity_all_lines: u64,
    pub size: usize,
}

#[derive(Serialize, ToSchema)]
pub struct AllocationResponse {
    pub group: usize,
    pub total: u64,
    pub slots: Vec<SlotResponse>,
}

#[derive(Serialize, ToSchema)]
pub struct SlotResponse {
    pub item: String,
    pub quantity: u64,
}

impl From<&ConfigGroup> for GroupResponse {
    fn from(group: &ConfigGroup) -> Self {
        Self {
            pockets: group.pockets,
            min_quantity_per_line: group.min_quantity_per_line,
            max_quantity_all_lines: group.max_quantity_all_lines,
            size: group.size,
        }
    }
}

impl AllocationResponse {
    fn new(group: usize, allocation: &Allocation) -> Self {
        Self {
            group,
            total: allocation.total(),
            slots: allocation
                .slots
                .iter()
                .map(|(item, quantity)| SlotResponse {
                    item: item.to_string(),
                    quantity: *quantity,
                })
                .collect(),
        }
    }
}

impl PlanResponse {
    pub fn from_report(report: PlanReport) -> Self {
        let PlanReport {
            groups,
            split_budget,
            generated,
            valid,
            nodes_explored,
            truncated,
            score,
            generation_ms,
            scoring_ms,
        } = report;

        Self {
            best_packages: score.best_packages,
            best_index: score.best_index,
            best: score.best.map(|candidate| {
                candidate
                    .allocations
                    .iter()
                    .enumerate()
                    .map(|(idx, allocation)| AllocationResponse::new(idx, allocation))
                    .collect()
            }),
            scores: score.scores,
            groups: groups.iter().map(GroupResponse::from).collect(),
            split_budget,
            generated,
            valid,
            nodes_explored,
            truncated,
            generation_ms,
            scoring_ms,
        }
    }
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

fn facility_config_error(details: impl Into<String>) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid facility configuration",
        details,
    )
}

fn internal_error(details: impl Into<String>) -> Response {
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal consistency error",
        details,
    )
}

fn parse_plan_request(
    payload: Result<Json<PlanRequest>, JsonRejection>,
) -> Result<ValidatedPlanRequest, Response> {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(err) => return Err(json_deserialize_error(err)),
    };

    match payload.into_validated() {
        Ok(validated) => Ok(validated),
        Err(PlanRequestValidationError::MissingLines) => Err(facility_config_error(
            "At least one line must be specified",
        )),
        Err(PlanRequestValidationError::InvalidFacility(err)) => {
            Err(facility_config_error(err.to_string()))
        }
        Err(PlanRequestValidationError::InvalidItems(err)) => {
            Err(validation_error(err.to_string()))
        }
        Err(PlanRequestValidationError::InvalidRecords(err)) => {
            Err(validation_error(err.to_string()))
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(handle_plan, handle_plan_stream),
    components(
        schemas(
            PlanRequest,
            ConfigurationRequest,
            LineRequest,
            ItemRequest,
            ZipOccurrenceRequest,
            PlanResponse,
            GroupResponse,
            AllocationResponse,
            SlotResponse,
            ErrorResponse
        )
    ),
    tags((name = "planning", description = "Endpoints for version splitting"))
)]
struct ApiDoc;

fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        // API endpoints
        .route("/plan", post(handle_plan))
        .route("/plan_stream", post(handle_plan_stream))
        // API documentation
        .route("/docs/openapi.json", get(serve_openapi_json))
        .route("/docs", get(serve_openapi_ui))
        .layer(cors)
        .with_state(state)
}

/// Starts the API server.
///
/// Configures CORS for cross-origin requests. Returns once the server stops.
pub async fn start_api_server(config: ApiConfig, solver: SolverConfig) -> std::io::Result<()> {
    let app = router(ApiState { solver });

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(
        "Server running on http://{}:{}",
        config.display_host(),
        config.port()
    );
    if config.binds_to_all_interfaces() && config.uses_default_host() {
        info!("Local access: http://localhost:{}", config.port());
    }
    info!("API endpoints: POST /plan, POST /plan_stream");
    info!("Documentation: GET /docs, GET /docs/openapi.json");

    axum::serve(listener, app).await
}

/// Handler for POST /plan endpoint.
///
/// Runs the planner and returns the best candidate with diagnostics.
#[utoipa::path(
    post,
    path = "/plan",
    request_body = PlanRequest,
    responses(
        (status = 200, description = "Planning finished", body = PlanResponse),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request or facility configuration",
            body = ErrorResponse
        ),
        (
            status = INTERNAL_SERVER_ERROR,
            description = "Quantity conservation failed during splitting",
            body = ErrorResponse
        )
    ),
    tag = "planning"
)]
async fn handle_plan(
    State(state): State<ApiState>,
    payload: Result<Json<PlanRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match parse_plan_request(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };

    info!(
        items = request.input.items.len(),
        lines = request.input.facility.lines().len(),
        zip_codes = request.input.zip_occurrences.len(),
        "new plan request"
    );
    let config = planner_config(&state, request.max_candidates);
    let input = request.input;
    let result = tokio::task::spawn_blocking(move || plan(&input, &config)).await;

    match result {
        Ok(Ok(report)) => {
            info!(
                valid = report.valid,
                best_packages = report.score.best_packages,
                "plan request finished"
            );
            (StatusCode::OK, Json(PlanResponse::from_report(report))).into_response()
        }
        Ok(Err(PlanError::Validation(err))) => validation_error(err.to_string()),
        Ok(Err(PlanError::Split(err))) => {
            error!(error = %err, "plan aborted");
            internal_error(err.to_string())
        }
        Err(err) => {
            error!(error = %err, "planner task failed");
            internal_error(err.to_string())
        }
    }
}

/// Handler for POST /plan_stream endpoint (SSE).
///
/// Streams planner events as Server-Sent Events (text/event-stream).
#[utoipa::path(
    post,
    path = "/plan_stream",
    request_body = PlanRequest,
    responses(
        (
            status = 200,
            description = "Streams planner events in real-time",
            content_type = "text/event-stream",
            body = String
        ),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request or facility configuration",
            body = ErrorResponse
        )
    ),
    tag = "planning"
)]
async fn handle_plan_stream(
    State(state): State<ApiState>,
    payload: Result<Json<PlanRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match parse_plan_request(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let config = planner_config(&state, request.max_candidates);
    let input = request.input;
    let (tx, rx) = mpsc::channel::<String>(32);

    tokio::task::spawn_blocking(move || {
        let send = |evt: &PlanEvent| {
            if let Ok(json) = serde_json::to_string(evt) {
                // A closed receiver only means the client went away.
                let _ = tx.blocking_send(json);
            }
        };
        if let Err(PlanError::Validation(err)) = plan_with_progress(&input, &config, send) {
            warn!(error = %err, "streamed plan rejected");
            if let Ok(json) = serde_json::to_string(&PlanEvent::Aborted {
                reason: err.to_string(),
            }) {
                let _ = tx.blocking_send(json);
            }
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

fn planner_config(
    state: &ApiState,
    max_candidates: Option<usize>,
) -> crate::planner::PlannerConfig {
    let mut config = state.solver.planner_config();
    if let Some(max) = max_candidates {
        config.limits.max_candidates = Some(max);
    }
    config
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

    const REQUEST: &str = r#"{
        "configurations": [
            {"id": 1, "pockets": 2, "min_quantity_per_line": 0, "max_quantity_all_lines": 10},
            {"id": 2, "pockets": 2, "min_quantity_per_line": 0, "max_quantity_all_lines": 100}
        ],
        "lines": [{"configuration": 2}, {"configuration": 1}],
        "items": [
            {"id": "a", "quantity": 8},
            {"id": "b", "quantity": 9},
            {"id": "c", "quantity": 30}
        ],
        "zip_occurrences": [
            {"zip_code": "10001", "items": ["c", "c", "c", "c", "c", "c", "c", "c", "c", "c"]}
        ]
    }"#;

    fn state() -> ApiState {
        ApiState {
            solver: SolverConfig::default(),
        }
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Body should be readable");
        serde_json::from_slice(&bytes).expect("Body should be JSON")
    }

    #[test]
    fn openapi_doc_lists_expected_paths() {
        let doc = openapi_doc();
        let paths = &doc.paths.paths;
        assert!(
            paths.contains_key("/plan"),
            "OpenAPI documentation is missing the /plan path"
        );
        assert!(
            paths.contains_key("/plan_stream"),
            "OpenAPI documentation is missing the /plan_stream path"
        );
    }

    #[test]
    fn openapi_doc_contains_key_schemas() {
        let doc = openapi_doc();
        let components = doc
            .components
            .as_ref()
            .expect("OpenAPI documentation contains no components");
        let schemas = &components.schemas;
        for name in ["PlanRequest", "PlanResponse", "ErrorResponse"] {
            assert!(
                schemas.contains_key(name),
                "Expected schema '{}' is missing from the OpenAPI document",
                name
            );
        }
    }

    #[test]
    fn plan_request_optional_fields_default_to_none() {
        let json = r#"{
            "configurations": [{"id": 1, "pockets": 1, "min_quantity_per_line": 0, "max_quantity_all_lines": 5}],
            "lines": [{"configuration": 1}]
        }"#;
        let request: PlanRequest = serde_json::from_str(json).expect("Should parse valid JSON");
        assert!(request.items.is_none());
        assert!(request.zip_occurrences.is_empty());
        assert!(request.occurrence_records.is_none());
        assert_eq!(request.max_candidates, None);
    }

    #[test]
    fn items_are_derived_from_records_when_absent() {
        let json = r#"{
            "configurations": [{"id": 1, "pockets": 2, "min_quantity_per_line": 0, "max_quantity_all_lines": 50}],
            "lines": [{"configuration": 1}],
            "zip_occurrences": [{"zip_code": "10001", "items": ["x"]}],
            "occurrence_records": "10001,y\n20002|x\n"
        }"#;
        let request: PlanRequest = serde_json::from_str(json).expect("Should parse valid JSON");
        let validated = request
            .into_validated()
            .expect("Should validate successfully");
        let counts: Vec<(&str, u64)> = validated
            .input
            .items
            .iter()
            .map(|i| (i.id.as_ref(), i.quantity))
            .collect();
        assert_eq!(counts, vec![("x", 2), ("y", 1)]);
        assert_eq!(validated.input.zip_occurrences.len(), 2);
    }

    #[test]
    fn request_validation_rejects_bad_layouts() {
        let json = r#"{
            "configurations": [{"id": 1, "pockets": 0, "min_quantity_per_line": 0, "max_quantity_all_lines": 5}],
            "lines": [{"configuration": 1}]
        }"#;
        let request: PlanRequest = serde_json::from_str(json).unwrap();
        assert!(matches!(
            request.into_validated(),
            Err(PlanRequestValidationError::InvalidFacility(_))
        ));

        let json = r#"{"configurations": [], "lines": []}"#;
        let request: PlanRequest = serde_json::from_str(json).unwrap();
        assert!(matches!(
            request.into_validated(),
            Err(PlanRequestValidationError::MissingLines)
        ));

        let json = r#"{
            "configurations": [{"id": 1, "pockets": 1, "min_quantity_per_line": 0, "max_quantity_all_lines": 5}],
            "lines": [{"configuration": 1}],
            "items": [{"id": "a", "quantity": 1}],
            "zip_occurrences": [{"zip_code": "10001", "items": ["ghost"]}]
        }"#;
        let request: PlanRequest = serde_json::from_str(json).unwrap();
        assert!(matches!(
            request.into_validated(),
            Err(PlanRequestValidationError::InvalidItems(
                ValidationError::UnknownOccurrenceItem { .. }
            ))
        ));
    }

    #[test]
    fn request_max_candidates_overrides_config() {
        let config = planner_config(&state(), Some(4));
        assert_eq!(config.limits.max_candidates, Some(4));
        assert_eq!(planner_config(&state(), None).limits.max_candidates, None);
    }

    #[tokio::test]
    async fn plan_handler_returns_best_candidate() {
        let request: PlanRequest = serde_json::from_str(REQUEST).unwrap();
        let response = handle_plan(State(state()), Ok(Json(request)))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["best_packages"], 1);
        assert_eq!(body["best_index"], 0);
        assert_eq!(body["valid"], 2);
        assert_eq!(body["groups"][0]["max_quantity_all_lines"], 10);
        assert_eq!(body["best"][0]["total"], 10);
        assert_eq!(body["best"][1]["slots"][1]["item"], "c");
        assert_eq!(body["best"][1]["slots"][1]["quantity"], 30);
    }

    #[tokio::test]
    async fn plan_handler_rejects_invalid_items() {
        let json = REQUEST.replace(r#""id": "b""#, r#""id": "a""#);
        let request: PlanRequest = serde_json::from_str(&json).unwrap();
        let response = handle_plan(State(state()), Ok(Json(request)))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = body_json(response).await;
        assert_eq!(body["error"], "Invalid input data");
    }
}
