//! Cross-module tests.
//!
//! Unit tests live next to the code they test; the tests here exercise
//! several modules together:
//! - `scenarios.rs`: walls, rams, projectile hits and crashing agents end to end
//! - `determinism.rs`: same seed and intents give identical worlds
//! - `handshake.rs`: the wake/yield protocol against real agent threads
//! - `fairness.rs`: the per-turn shuffle is uniform
//! - `properties.rs`: randomized invariants checked with proptest
//! - `helpers.rs`: test setup utilities and factory functions

mod determinism;
mod handshake;
pub mod helpers;
mod scenarios;

/// Installs a `tracing` subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call installs it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
