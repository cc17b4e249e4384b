use crate::error::{PricingError, PricingResult};
use crate::models::{Leg, Parlay};
use crate::utils::correlation::{CorrelationSpec, CorrelationTable};
use crate::utils::data::{parlay_rows, ParlayRow};
use crate::utils::ev_calculator::{EvCalculator, LegComparison};
use crate::utils::parlay_builder::{ParlayBuild, ParlayBuilder, ParlayPolicy};
use askama::Template;
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::warn;

// Custom filters for formatting
mod filters {
    pub fn format_odds(odds: &i32) -> ::askama::Result<String> {
        Ok(format!("{:+}", odds))
    }

    pub fn format_percent(value: &f64) -> ::askama::Result<String> {
        Ok(format!("{:.1}%", value))
    }

    pub fn format_decimal(value: &f64) -> ::askama::Result<String> {
        Ok(format!("{:.2}", value))
    }
}

#[derive(Template)]
#[template(path = "home.html")]
struct HomeTemplate {
    generated_at: String,
    pool_loaded: bool,
    pool_size: usize,
    combinations: usize,
    rows: Vec<ParlayRow>,
}

struct HtmlTemplate<T>(T);

impl<T> IntoResponse for HtmlTemplate<T>
where
    T: Template,
{
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(html) => Html(html).into_response(),
            Err(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to render template: {}", err),
            )
                .into_response(),
        }
    }
}

/// Errors rendered as `{"error": ...}`
#[derive(Debug)]
pub enum ApiError {
    Pricing(PricingError),
    Internal(String),
}

impl From<PricingError> for ApiError {
    fn from(err: PricingError) -> Self {
        Self::Pricing(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Pricing(PricingError::LegNotFound { .. }) => StatusCode::NOT_FOUND,
            ApiError::Pricing(err) if err.is_domain_error() => StatusCode::BAD_REQUEST,
            ApiError::Pricing(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::Pricing(err) => err.to_string(),
            ApiError::Internal(message) => message,
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub calculator: Arc<EvCalculator>,
    pub policy: ParlayPolicy,
    /// Parlays for the overview page, built once from the startup pool
    pub overview: Option<Arc<ParlayBuild>>,
}

impl AppState {
    /// Validates the policy and prices the startup pool, if any
    pub fn new(
        table: CorrelationTable,
        policy: ParlayPolicy,
        pool: Option<Vec<Leg>>,
    ) -> PricingResult<Self> {
        let calculator = EvCalculator::new(table);
        let builder = ParlayBuilder::new(calculator.adjuster().clone(), policy.clone())?;
        let overview = match pool {
            Some(legs) => Some(Arc::new(builder.build(&legs)?)),
            None => None,
        };
        Ok(Self {
            calculator: Arc::new(calculator),
            policy,
            overview,
        })
    }

    fn builder(&self, policy: ParlayPolicy) -> PricingResult<ParlayBuilder> {
        ParlayBuilder::new(self.calculator.adjuster().clone(), policy)
    }
}

#[derive(Debug, Deserialize)]
pub struct CompareRequest {
    pub our_prob: f64,
    pub book_american: i32,
}

#[derive(Debug, Deserialize)]
pub struct PriceRequest {
    pub legs: Vec<Leg>,
    #[serde(default)]
    pub correlation: CorrelationSpec,
}

#[derive(Debug, Deserialize)]
pub struct BuildRequest {
    pub pool: Vec<Leg>,
    /// Falls back to the server's configured policy
    #[serde(default)]
    pub policy: Option<ParlayPolicy>,
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
}

/// Build the router for the pricing API and overview page
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .route("/api/compare", post(compare))
        .route("/api/price", post(price))
        .route("/api/parlays", post(parlays))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

/// POST /api/compare
async fn compare(
    State(state): State<AppState>,
    Json(request): Json<CompareRequest>,
) -> Result<Json<LegComparison>, ApiError> {
    let comparison = state
        .calculator
        .compare(request.our_prob, request.book_american)?;
    Ok(Json(comparison))
}

/// POST /api/price
async fn price(
    State(state): State<AppState>,
    Json(request): Json<PriceRequest>,
) -> Result<Json<Parlay>, ApiError> {
    let parlay = state
        .calculator
        .price_ticket(&request.legs, &request.correlation)?;
    Ok(Json(parlay))
}

/// POST /api/parlays
async fn parlays(
    State(state): State<AppState>,
    Json(request): Json<BuildRequest>,
) -> Result<Json<ParlayBuild>, ApiError> {
    let policy = request.policy.unwrap_or_else(|| state.policy.clone());
    let builder = state.builder(policy)?;

    // Enumeration is CPU-bound
    let build = tokio::task::spawn_blocking(move || builder.build(&request.pool))
        .await
        .map_err(|err| {
            warn!(error = %err, "Parlay build task failed");
            ApiError::Internal("parlay build failed".to_string())
        })??;
    Ok(Json(build))
}

async fn home(State(state): State<AppState>) -> Response {
    let (pool_size, combinations, rows) = match state.overview.as_deref() {
        Some(build) => (
            build.diagnostics.pool_size,
            build.diagnostics.combinations_evaluated,
            parlay_rows(&build.parlays),
        ),
        None => (0, 0, Vec::new()),
    };

    let template = HomeTemplate {
        generated_at: chrono::Utc::now().format("%Y-%m-%d %H:%M UTC").to_string(),
        pool_loaded: state.overview.is_some(),
        pool_size,
        combinations,
        rows,
    };

    HtmlTemplate(template).into_response()
}
