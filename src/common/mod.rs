//! Shared building blocks: request coalescing and retry policy.

pub mod retry;
pub mod single_flight;

pub use retry::{retry_if, RetryPolicy};
pub use single_flight::{FlightOutcome, SingleFlight};
