//! Where turn snapshots go.
//!
//! The scheduler calls [`RecorderSink::record_turn`] once per turn in phase
//! 7, after the world has settled. While paused, a step back re-emits an
//! earlier snapshot through [`RecorderSink::review`]; the live world is never
//! rewound.
//!
//! # Example
//!
//! ```
//! use skirmish_core::recorder::{MemoryRecorder, RecorderSink};
//!
//! let recorder = MemoryRecorder::new();
//! assert!(recorder.turns().is_empty());
//! ```

use std::sync::{Mutex, PoisonError};

use serde::Serialize;

use crate::scheduler::BattleResults;
use crate::snapshot::TurnSnapshot;

/// Receives the record of a battle.
///
/// Called from the scheduler thread only, but sinks are shared behind an
/// `Arc` so they may be inspected from elsewhere.
pub trait RecorderSink: Send + Sync {
    /// A turn has been resolved.
    fn record_turn(&self, snapshot: &TurnSnapshot);

    /// A round has ended after `turns` turns.
    fn record_round_end(&self, _round: u32, _turns: u64) {}

    /// An earlier snapshot is being shown again while paused.
    fn review(&self, _snapshot: &TurnSnapshot) {}

    /// The battle is over.
    fn record_battle_end(&self, _results: &BattleResults) {}
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRecorder;

impl RecorderSink for NullRecorder {
    fn record_turn(&self, _snapshot: &TurnSnapshot) {}
}

#[derive(Debug, Default, Serialize)]
struct Recording {
    turns: Vec<TurnSnapshot>,
    rounds: Vec<(u32, u64)>,
    #[serde(skip)]
    reviewed: Vec<TurnSnapshot>,
    results: Option<BattleResults>,
}

/// Keeps the whole battle in memory.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    inner: Mutex<Recording>,
}

impl MemoryRecorder {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut Recording) -> T) -> T {
        f(&mut self.inner.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Every recorded turn, oldest first.
    #[must_use]
    pub fn turns(&self) -> Vec<TurnSnapshot> {
        self.with(|r| r.turns.clone())
    }

    /// Snapshots shown again by step-back, in request order.
    #[must_use]
    pub fn reviewed(&self) -> Vec<TurnSnapshot> {
        self.with(|r| r.reviewed.clone())
    }

    /// `(round, turns)` for every finished round.
    #[must_use]
    pub fn rounds(&self) -> Vec<(u32, u64)> {
        self.with(|r| r.rounds.clone())
    }

    /// Final results, once the battle is over.
    #[must_use]
    pub fn results(&self) -> Option<BattleResults> {
        self.with(|r| r.results.clone())
    }

    /// Serializes the recording as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        self.with(|r| serde_json::to_string(r))
    }
}

impl RecorderSink for MemoryRecorder {
    fn record_turn(&self, snapshot: &TurnSnapshot) {
        self.with(|r| r.turns.push(snapshot.clone()));
    }

    fn record_round_end(&self, round: u32, turns: u64) {
        self.with(|r| r.rounds.push((round, turns)));
    }

    fn review(&self, snapshot: &TurnSnapshot) {
        self.with(|r| r.reviewed.push(snapshot.clone()));
    }

    fn record_battle_end(&self, results: &BattleResults) {
        self.with(|r| r.results = Some(results.clone()));
    }
}
