//! Dynamic pricing engine.
//!
//! Three processes share this library:
//! - `pricing-api` answers price requests with a read-through cache
//! - `pricing-listener` turns market events into recalculation jobs
//! - `pricing-worker` consumes those jobs and rewrites every cached price

pub mod app;
pub mod clock;
pub mod config;
pub mod errors;
pub mod external;
pub mod jobs;
pub mod logging;
pub mod models;
pub mod queue;
pub mod routes;
pub mod services;
pub mod shutdown;
pub mod state;
pub mod store;

pub use state::AppState;
