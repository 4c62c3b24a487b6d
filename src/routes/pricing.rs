use axum::extract::State;
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use tracing::{error, info};

use crate::errors::AppError;
use crate::models::{PriceResponse, PricingRequest};
use crate::state::AppState;

pub const CACHE_STATUS_HEADER: &str = "x-cache-status";

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(get_price))
}

pub async fn get_price(
    State(state): State<AppState>,
    Json(request): Json<PricingRequest>,
) -> Result<Response, AppError> {
    info!(
        "POST /price - Pricing {} for {} (prime: {})",
        request.product_id, request.user_location, request.is_prime_member
    );

    let quote = state
        .pricing
        .get_price(&request.product_id, &request.user_location, request.is_prime_member)
        .await
        .map_err(|e| {
            error!("Failed to price {}: {}", request.product_id, e);
            e
        })?;

    let mut response = Json(PriceResponse::from(&quote.record)).into_response();
    response
        .headers_mut()
        .insert(CACHE_STATUS_HEADER, HeaderValue::from_static(quote.cache_status.as_str()));
    Ok(response)
}
