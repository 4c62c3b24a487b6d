use std::str::FromStr;

use bigdecimal::{BigDecimal, RoundingMode};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Discount granted to prime members on the request path.
pub const PRIME_DISCOUNT_RATE: f64 = 0.05;

/// Where a price record came from. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    Live,
    Cache,
    ProactiveWorker,
}

impl std::fmt::Display for PriceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            PriceSource::Live => "live",
            PriceSource::Cache => "cache",
            PriceSource::ProactiveWorker => "proactive_worker",
        };
        f.write_str(label)
    }
}

/// A computed price for one product.
///
/// Fields are private so a record can only come out of [`PriceRecord::new`]
/// (which computes `final_price`) or out of a cache payload that passes
/// [`PriceRecord::verify`]. Changing provenance yields a new record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    product_id: String,
    base_price: f64,
    market_multiplier: f64,
    discount_rate: f64,
    final_price: f64,
    source: PriceSource,
}

impl PriceRecord {
    pub fn new(
        product_id: impl Into<String>,
        base_price: f64,
        market_multiplier: f64,
        discount_rate: f64,
        source: PriceSource,
    ) -> Result<Self, AppError> {
        let product_id = product_id.into();
        validate_inputs(&product_id, base_price, market_multiplier, discount_rate)?;
        let final_price = compute_final_price(base_price, market_multiplier, discount_rate)?;

        Ok(Self {
            product_id,
            base_price,
            market_multiplier,
            discount_rate,
            final_price,
            source,
        })
    }

    pub fn with_source(&self, source: PriceSource) -> Self {
        Self {
            source,
            ..self.clone()
        }
    }

    /// Replays the pricing formula over the stored inputs and checks it
    /// reproduces `final_price`.
    pub fn verify(&self) -> Result<(), AppError> {
        validate_inputs(&self.product_id, self.base_price, self.market_multiplier, self.discount_rate)?;
        let expected = compute_final_price(self.base_price, self.market_multiplier, self.discount_rate)?;
        if expected != self.final_price {
            return Err(AppError::Validation(format!(
                "final_price {} for {} does not match formula result {}",
                self.final_price, self.product_id, expected
            )));
        }
        Ok(())
    }

    pub fn product_id(&self) -> &str {
        &self.product_id
    }

    pub fn base_price(&self) -> f64 {
        self.base_price
    }

    pub fn market_multiplier(&self) -> f64 {
        self.market_multiplier
    }

    pub fn discount_rate(&self) -> f64 {
        self.discount_rate
    }

    pub fn final_price(&self) -> f64 {
        self.final_price
    }

    pub fn source(&self) -> PriceSource {
        self.source
    }
}

pub fn discount_for(is_prime_member: bool) -> f64 {
    if is_prime_member {
        PRIME_DISCOUNT_RATE
    } else {
        0.0
    }
}

/// `round(base_price * market_multiplier * (1 - discount_rate), 2)`.
///
/// Inputs are lifted to decimals through their shortest text form, so
/// `0.95` is multiplied as exactly 0.95. Rounding is half-up.
pub fn compute_final_price(base_price: f64, market_multiplier: f64, discount_rate: f64) -> Result<f64, AppError> {
    let base = to_decimal("base_price", base_price)?;
    let multiplier = to_decimal("market_multiplier", market_multiplier)?;
    let discount = to_decimal("discount_rate", discount_rate)?;

    let raw = base * multiplier * (BigDecimal::from(1) - discount);
    let rounded = raw.with_scale_round(2, RoundingMode::HalfUp);

    rounded
        .to_string()
        .parse::<f64>()
        .map_err(|e| AppError::Internal(format!("Failed to convert {} to f64: {}", rounded, e)))
}

fn to_decimal(field: &str, value: f64) -> Result<BigDecimal, AppError> {
    if !value.is_finite() {
        return Err(AppError::Validation(format!("{} must be finite, got {}", field, value)));
    }
    BigDecimal::from_str(&value.to_string())
        .map_err(|e| AppError::Validation(format!("{} is not a decimal: {}", field, e)))
}

fn validate_inputs(product_id: &str, base_price: f64, market_multiplier: f64, discount_rate: f64) -> Result<(), AppError> {
    if product_id.trim().is_empty() {
        return Err(AppError::Validation("product_id must not be empty".to_string()));
    }
    if !(base_price.is_finite() && base_price > 0.0) {
        return Err(AppError::Validation(format!("base_price must be positive, got {}", base_price)));
    }
    if !(market_multiplier.is_finite() && market_multiplier >= 0.0) {
        return Err(AppError::Validation(format!(
            "market_multiplier must be non-negative, got {}",
            market_multiplier
        )));
    }
    if !(0.0..1.0).contains(&discount_rate) {
        return Err(AppError::Validation(format!("discount_rate must be within [0, 1), got {}", discount_rate)));
    }
    Ok(())
}

/// Body of `POST /api/v1/price`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingRequest {
    pub product_id: String,
    pub user_location: String,
    #[serde(default)]
    pub is_prime_member: bool,
}

/// Wire shape returned to API callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceResponse {
    pub product_id: String,
    pub final_price: f64,
    pub base_price: f64,
    pub discount_rate: f64,
    pub source: PriceSource,
}

impl From<&PriceRecord> for PriceResponse {
    fn from(record: &PriceRecord) -> Self {
        Self {
            product_id: record.product_id.clone(),
            final_price: record.final_price,
            base_price: record.base_price,
            discount_rate: record.discount_rate,
            source: record.source,
        }
    }
}
