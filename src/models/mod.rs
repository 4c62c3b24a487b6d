mod job;
mod price_record;

pub use job::{job_status_key, JobState, JobStatus, RecalculationJob, RunOutcome};
pub use price_record::{
    compute_final_price, discount_for, PriceRecord, PriceResponse, PriceSource, PricingRequest,
    PRIME_DISCOUNT_RATE,
};
