//! Background Jobs Module
//!
//! Jobs here are executed by the queue worker, one delivery at a time, and
//! report how the run went through [`RunOutcome`]. The worker owns retry
//! and acknowledgement; a job only has to say what happened.
//!
//! # Available Jobs
//!
//! - `recalculate_prices_job` - Recomputes every product price under the
//!   global recalculation lock and rewrites the price cache
//!
//! Jobs are idempotent: re-running one after a crash only rewrites the same
//! cache entries.

pub mod recalculate_prices_job;

use async_trait::async_trait;

use crate::models::{RecalculationJob, RunOutcome};

#[async_trait]
pub trait RecalculationRunner: Send + Sync {
    async fn run(&self, job: &RecalculationJob) -> RunOutcome;
}
