//! End-to-end scenarios across the simulator, retry coordinator, circuit
//! breaker, and monitor.
//!
//! Each test file covers one scenario on seeded random sources and a paused
//! Tokio clock, so runs are reproducible.

#![cfg(test)]

mod helpers;

mod test_concurrent_monitoring;
mod test_determinism;
mod test_instant_pattern;
mod test_retry_through_breaker;
mod test_upload_with_progress;
