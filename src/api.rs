//! REST API for the quoting service.
//!
//! Exposes the cross-carrier planner and the master data lookups a client
//! needs to build a request. Uses Axum as the web framework and supports
//! CORS.

use std::sync::{Arc, OnceLock};

use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, Query, State};
use axum::{
    Router,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use utoipa::{IntoParams, OpenApi, ToSchema};

use crate::carriers::Planner;
use crate::catalog::{
    CatalogRepository, Destination, GeographyResolver, InMemoryCatalog, Province, Zone,
};
use crate::config::ApiConfig;
use crate::error::{CatalogError, PlanError};
use crate::geometry::CatalogIssue;
use crate::model::{CarrierId, ContainerCode, ContainerSpec, ZoneId};
use crate::optimizer::{ContainerUtilization, Layer, LoadedContainer, PlanWarning};
use crate::planner::{
    Candidate, CandidateMetrics, CarrierTag, MixPart, Plan, PlanOutcome, PlanRequest,
    Recommendation, RecommendationReason, Rejection, RejectionReason,
};
use crate::types::{ItemCounts, ItemType};

/// Shared, read-only state of the HTTP layer.
#[derive(Clone)]
pub struct ApiState {
    catalog: Arc<InMemoryCatalog>,
    planner: Arc<Planner>,
    default_allow_mixed_heights: bool,
}

impl ApiState {
    pub fn new(
        catalog: InMemoryCatalog,
        planner: Planner,
        default_allow_mixed_heights: bool,
    ) -> Self {
        Self {
            catalog: Arc::new(catalog),
            planner: Arc::new(planner),
            default_allow_mixed_heights,
        }
    }
}

static OPENAPI_DOC: OnceLock<utoipa::openapi::OpenApi> = OnceLock::new();

// SRI hashes of swagger-ui-dist@5.17.14.
const SWAGGER_UI_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
    <head>
        <meta charset="utf-8" />
        <title>pallet-planner API Docs</title>
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
                    presets: [SwaggerUIBundle.presets.apis],
                });
            };
        </script>
    </body>
</html>"##;

fn openapi_doc() -> &'static utoipa::openapi::OpenApi {
    OPENAPI_DOC.get_or_init(ApiDoc::openapi)
}

/// Quote request.
///
/// `destination` is either `{"province_id": n}` or `{"zone_id": n}`.
/// `carrier_id` scopes the quote to one carrier, `carrier_ids` narrows the
/// set of carriers compared; at most one of them may be given.
#[derive(Deserialize, Clone, Debug, ToSchema)]
#[schema(
    example = json!({
        "destination": { "province_id": 13 },
        "items": { "tower": 10, "laptop": 4, "mini_pc": 0 },
        "allow_mixed_heights": true
    })
)]
pub struct QuoteRequest {
    pub destination: Destination,
    pub items: ItemCounts,
    #[serde(default)]
    #[schema(nullable = true)]
    pub container_types: Option<Vec<ContainerCode>>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub allow_mixed_heights: Option<bool>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub carrier_id: Option<CarrierId>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub carrier_ids: Option<Vec<CarrierId>>,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct QuoteResponse {
    pub zone_id: ZoneId,
    pub destination: String,
    pub items: ItemCounts,
    pub outcome: PlanOutcome,
}

#[derive(Deserialize, Debug, Default, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CarrierQuery {
    /// Pricing zone
    pub zone_id: Option<u32>,
    /// Province, resolved to its zone
    pub province_id: Option<u32>,
}

#[derive(Deserialize, Debug, Default, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ZoneQuery {
    /// ISO country code, e.g. `ES`
    pub country_code: Option<String>,
}

#[derive(Deserialize, Debug, Default, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProvinceQuery {
    pub zone_id: Option<u32>,
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

fn catalog_error(err: CatalogError) -> Response {
    match err {
        CatalogError::UnknownZone(_) | CatalogError::UnknownProvince(_) => error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Unknown destination",
            err.to_string(),
        ),
        other => {
            error!(error = %other, "master data lookup failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Master data unavailable",
                other.to_string(),
            )
        }
    }
}

fn plan_error(err: PlanError) -> Response {
    match err {
        PlanError::UnknownContainerType(_)
        | PlanError::UnknownCarrier(_)
        | PlanError::ConflictingCarrierScope => {
            validation_error(err.to_string())
        }
        PlanError::WorkerPool(_) => {
            error!(error = %err, "planner failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Planning failed",
                err.to_string(),
            )
        }
    }
}

fn parse_quote_request(
    payload: Result<Json<QuoteRequest>, JsonRejection>,
) -> Result<QuoteRequest, Response> {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(err) => return Err(json_deserialize_error(err)),
    };

    if payload.carrier_id.is_some() && payload.carrier_ids.is_some() {
        return Err(validation_error(
            "carrier_id and carrier_ids cannot be combined",
        ));
    }
    Ok(payload)
}

impl QuoteRequest {
    fn into_plan_request(self, zone: ZoneId, default_allow_mixed_heights: bool) -> PlanRequest {
        let mut request = PlanRequest::new(zone, self.items).with_allow_mixed_heights(
            self.allow_mixed_heights
                .unwrap_or(default_allow_mixed_heights),
        );
        if let Some(codes) = self.container_types {
            request = request.with_container_codes(codes);
        }
        if let Some(carrier) = self.carrier_id {
            request = request.with_carrier(carrier);
        }
        if let Some(carriers) = self.carrier_ids {
            request = request.with_carrier_ids(carriers);
        }
        request
    }
}

fn resolve_query_zone(
    catalog: &InMemoryCatalog,
    zone_id: Option<u32>,
    province_id: Option<u32>,
) -> Result<Option<ZoneId>, CatalogError> {
    match (zone_id, province_id) {
        (Some(zone), _) => catalog.resolve_zone(Destination::Zone(ZoneId(zone))).map(Some),
        (None, Some(province)) => catalog
            .resolve_zone(Destination::Province(province))
            .map(Some),
        (None, None) => Ok(None),
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(handle_quote, handle_carriers, handle_zones, handle_provinces, handle_pallet_types),
    components(
        schemas(
            QuoteRequest,
            QuoteResponse,
            ErrorResponse,
            Destination,
            ItemCounts,
            ItemType,
            PlanOutcome,
            Plan,
            Candidate,
            CandidateMetrics,
            MixPart,
            CarrierTag,
            Recommendation,
            RecommendationReason,
            Rejection,
            RejectionReason,
            CatalogIssue,
            LoadedContainer,
            Layer,
            ContainerUtilization,
            PlanWarning,
            ContainerSpec,
            Zone,
            Province
        )
    ),
    tags(
        (name = "quoting", description = "Pallet shipment quotes"),
        (name = "master-data", description = "Destinations, carriers and pallet types")
    )
)]
struct ApiDoc;

fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .route("/quote", post(handle_quote))
        .route("/carriers", get(handle_carriers))
        .route("/zones", get(handle_zones))
        .route("/provinces", get(handle_provinces))
        .route("/pallet-types", get(handle_pallet_types))
        // API documentation
        .route("/docs/openapi.json", get(serve_openapi_json))
        .route("/docs", get(serve_openapi_ui))
        .layer(cors)
        .with_state(state)
}

/// Starts the API server and blocks until it terminates.
pub async fn start_api_server(config: ApiConfig, state: ApiState) {
    let app = router(state);

    let addr = config.socket_addr();
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(%addr, error = %err, "could not bind API server");
            return;
        }
    };

    let display_host = config.display_host().to_string();
    println!(
        "🚀 Server running on http://{}:{}",
        display_host,
        config.port()
    );
    if config.binds_to_all_interfaces() && config.uses_default_host() {
        println!("💡 Local access: http://localhost:{}", config.port());
    }
    println!("📦 API Endpoints:");
    println!("   - POST /quote");
    println!("   - GET  /carriers");
    println!("   - GET  /zones");
    println!("   - GET  /provinces");
    println!("   - GET  /pallet-types");
    println!("📑 Documentation:");
    println!("   - GET /docs");
    println!("   - GET /docs/openapi.json");

    if let Err(err) = axum::serve(listener, app).await {
        error!(error = %err, "API server terminated with an error");
    }
}

/// Handler for POST /quote.
///
/// Resolves the destination to its pricing zone and plans the shipment
/// across every carrier serving it, or within one carrier when
/// `carrier_id` is set. An empty result is still a 200 with a
/// `no_candidates` or `no_carriers_available` outcome.
#[utoipa::path(
    post,
    path = "/quote",
    request_body = QuoteRequest,
    responses(
        (status = 200, description = "Planning finished", body = QuoteResponse),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request, unknown destination, pallet type or carrier",
            body = ErrorResponse
        ),
        (status = INTERNAL_SERVER_ERROR, description = "Planner failure", body = ErrorResponse)
    ),
    tag = "quoting"
)]
async fn handle_quote(
    State(state): State<ApiState>,
    payload: Result<Json<QuoteRequest>, JsonRejection>,
) -> Response {
    let request = match parse_quote_request(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let zone = match state.catalog.resolve_zone(request.destination) {
        Ok(zone) => zone,
        Err(err) => return catalog_error(err),
    };
    let snapshot = match state.catalog.snapshot(zone) {
        Ok(snapshot) => snapshot,
        Err(err) => return catalog_error(err),
    };
    let destination = state
        .catalog
        .destination_label(request.destination)
        .unwrap_or_else(|| zone.to_string());
    let items = request.items;
    let plan_request = request.into_plan_request(zone, state.default_allow_mixed_heights);

    info!(
        zone = %zone,
        destination = %destination,
        units = items.total(),
        "quote requested"
    );

    let planner = Arc::clone(&state.planner);
    let joined = tokio::task::spawn_blocking(move || {
        if plan_request.carrier.is_some() {
            planner.plan(&snapshot, &plan_request)
        } else {
            planner.plan_across_carriers(&snapshot, &plan_request)
        }
    })
    .await;

    let outcome = match joined {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(err)) => return plan_error(err),
        Err(err) => {
            error!(error = %err, "planning task aborted");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Planning failed",
                err.to_string(),
            );
        }
    };

    if let Some(plan) = outcome.plan() {
        info!(
            best = %plan.best.label,
            total = plan.best.total_price,
            alternatives = plan.alternatives.len(),
            "quote ready"
        );
    }

    let response = QuoteResponse {
        zone_id: zone,
        destination,
        items,
        outcome,
    };
    (StatusCode::OK, Json(response)).into_response()
}

/// Handler for GET /carriers.
///
/// Lists active carriers by name. With a zone or province only those
/// carrying a rate for the zone are returned.
#[utoipa::path(
    get,
    path = "/carriers",
    params(CarrierQuery),
    responses(
        (status = 200, description = "Active carriers", body = [CarrierTag]),
        (status = UNPROCESSABLE_ENTITY, description = "Unknown zone or province", body = ErrorResponse)
    ),
    tag = "master-data"
)]
async fn handle_carriers(
    State(state): State<ApiState>,
    Query(query): Query<CarrierQuery>,
) -> Response {
    let carriers = resolve_query_zone(&state.catalog, query.zone_id, query.province_id)
        .and_then(|zone| state.catalog.carriers_for_zone(zone));
    match carriers {
        Ok(carriers) => {
            let tags: Vec<CarrierTag> = carriers.iter().map(CarrierTag::from).collect();
            (StatusCode::OK, Json(tags)).into_response()
        }
        Err(err) => catalog_error(err),
    }
}

/// Handler for GET /zones.
#[utoipa::path(
    get,
    path = "/zones",
    params(ZoneQuery),
    responses((status = 200, description = "Pricing zones", body = [Zone])),
    tag = "master-data"
)]
async fn handle_zones(State(state): State<ApiState>, Query(query): Query<ZoneQuery>) -> Response {
    let zones = state.catalog.zones(query.country_code.as_deref());
    (StatusCode::OK, Json(zones)).into_response()
}

/// Handler for GET /provinces.
#[utoipa::path(
    get,
    path = "/provinces",
    params(ProvinceQuery),
    responses((status = 200, description = "Provinces sorted by name", body = [Province])),
    tag = "master-data"
)]
async fn handle_provinces(
    State(state): State<ApiState>,
    Query(query): Query<ProvinceQuery>,
) -> Response {
    let provinces = state.catalog.provinces(query.zone_id.map(ZoneId));
    (StatusCode::OK, Json(provinces)).into_response()
}

/// Handler for GET /pallet-types.
#[utoipa::path(
    get,
    path = "/pallet-types",
    responses((status = 200, description = "Pallet types in catalog order", body = [ContainerSpec])),
    tag = "master-data"
)]
async fn handle_pallet_types(State(state): State<ApiState>) -> Response {
    (StatusCode::OK, Json(&state.catalog.data().pallet_types)).into_response()
}

async fn serve_openapi_json(State(_state): State<ApiState>) -> impl IntoResponse {
    Json(openapi_doc())
}

async fn serve_openapi_ui(State(_state): State<ApiState>) -> impl IntoResponse {
    Html(SWAGGER_UI_HTML)
}
