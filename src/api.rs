//! HTTP route layer over the exchange service.

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router, extract::Path, extract::Query, extract::State};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::error::ExchangeError;
use crate::models::{ExchangeRates, HistoricalRate};
use crate::service::ExchangeService;

pub struct AppState {
    pub service: Arc<ExchangeService>,
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Route-layer error wrapper: validation-style errors surface as 400 with
/// their message, everything else as a generic 500 with no detail.
pub struct ApiError(ExchangeError);

impl From<ExchangeError> for ApiError {
    fn from(err: ExchangeError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = if self.0.is_client_error() {
            (StatusCode::BAD_REQUEST, self.0.to_string())
        } else {
            error!(error = %self.0, "Request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
        };
        (status, Json(serde_json::json!({ "detail": detail }))).into_response()
    }
}

#[derive(Serialize)]
struct StatusMessage {
    status: &'static str,
    message: String,
}

#[derive(Serialize)]
struct CurrenciesResponse {
    currencies: Vec<String>,
}

#[derive(Deserialize)]
struct RatesQuery {
    date: Option<NaiveDate>,
}

async fn get_rates(
    State(state): State<Arc<AppState>>,
    Path(base_currency): Path<String>,
    Query(query): Query<RatesQuery>,
) -> ApiResult<Json<ExchangeRates>> {
    let rates = state
        .service
        .get_all_currency_exchange_rates(&base_currency, query.date)
        .await?;
    Ok(Json(rates))
}

async fn get_historical_rates(
    State(state): State<Arc<AppState>>,
    Path((currency, base_currency, days)): Path<(String, String, u32)>,
) -> ApiResult<Json<Vec<HistoricalRate>>> {
    let rates = state
        .service
        .get_historical_rates(&currency, &base_currency, days)
        .await?;
    Ok(Json(rates))
}

async fn update_rates(State(state): State<Arc<AppState>>) -> Json<StatusMessage> {
    state.service.update_daily_rates().await;
    Json(StatusMessage {
        status: "success",
        message: "Rates updated successfully".to_string(),
    })
}

async fn preload_data(
    State(state): State<Arc<AppState>>,
    Path(days): Path<u32>,
) -> Json<StatusMessage> {
    state.service.preload_historical_data(days).await;
    Json(StatusMessage {
        status: "success",
        message: format!("Preloaded {days} days of historical data"),
    })
}

async fn get_currencies(State(state): State<Arc<AppState>>) -> Json<CurrenciesResponse> {
    let currencies = state.service.get_all_available_currencies().await;
    Json(CurrenciesResponse { currencies })
}

async fn health_check() -> &'static str {
    "ok"
}

pub fn app_router(state: Arc<AppState>) -> Router {
    let currency_routes = Router::new()
        .route("/rates/{base_currency}", get(get_rates))
        .route(
            "/historical/{currency}/{base_currency}/{days}",
            get(get_historical_rates),
        )
        .route("/update-rates", post(update_rates))
        .route("/preload-data/{days}", post(preload_data))
        .route("/currencies", get(get_currencies));

    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("http://localhost:3000"))
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api/currency", currency_routes)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_map_to_400() {
        let response =
            ApiError(ExchangeError::CurrencyNotFound("XYZ".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response =
            ApiError(ExchangeError::BaseCurrencyNotFound("XYZ".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_backend_errors_map_to_500() {
        let response =
            ApiError(ExchangeError::FeedUnavailable("boom".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
