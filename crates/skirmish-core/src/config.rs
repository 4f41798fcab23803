//! Battle configuration.
//!
//! A [`BattleConfig`] is plain data: it deserializes from JSON with every
//! field optional and falls back to the classic rule set.
//!
//! # Example
//!
//! ```
//! use skirmish_core::config::BattleConfig;
//!
//! let config = BattleConfig::from_json_str(r#"{ "num_rounds": 3, "seed": 7 }"#).unwrap();
//! assert_eq!(config.num_rounds, 3);
//! assert_eq!(config.arena_width, 800.0);
//! assert_eq!(config.max_skipped_turns, 30);
//! ```

use std::time::Duration;

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::geometry::BoundingBox;
use crate::rules;

/// Multiplier applied to the think timeout on the first turn of a round.
pub const FIRST_TURN_TIMEOUT_FACTOR: u32 = 10;

/// A fixed starting placement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InitialPosition {
    /// X coordinate
    pub x: f64,
    /// Y coordinate
    pub y: f64,
    /// Heading; random when absent
    #[serde(default)]
    pub heading: Option<f64>,
}

impl InitialPosition {
    /// The placement as a vector.
    #[must_use]
    pub fn position(&self) -> DVec2 {
        DVec2::new(self.x, self.y)
    }
}

/// Everything a battle needs to know before it starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BattleConfig {
    /// Arena width
    pub arena_width: f64,
    /// Arena height
    pub arena_height: f64,
    /// Static obstacles; agents and bullets treat them as walls
    pub obstacles: Vec<BoundingBox>,
    /// Rounds in the battle
    pub num_rounds: u32,
    /// Gun heat removed per turn
    pub gun_cooling_rate: f64,
    /// Turns without damage before everyone starts losing energy
    pub inactivity_time: u64,
    /// Base think budget per turn, in milliseconds
    pub turn_budget_ms: u64,
    /// Think budget while an agent is debugging or painting, in milliseconds
    pub debug_turn_timeout_ms: u64,
    /// Consecutive skipped turns before an agent is halted
    pub max_skipped_turns: u32,
    /// Wait after the cooperative halt request, in milliseconds
    pub interrupt_grace_ms: u64,
    /// Wait after the forced stop, in milliseconds
    pub stop_grace_ms: u64,
    /// Turns played after a round is decided or aborted
    pub end_grace_turns: u32,
    /// Turns-per-second cap; unthrottled when absent
    pub tps: Option<u32>,
    /// Capacity of each agent's event inbox
    pub event_queue_capacity: usize,
    /// Turn snapshots kept for step-back review
    pub history_len: usize,
    /// Seed for the scheduler's random number generator
    pub seed: u64,
    /// Wake every agent before waiting on any of them
    pub parallel_think: bool,
    /// Fixed starting placements, in agent registration order
    pub initial_positions: Vec<InitialPosition>,
}

impl Default for BattleConfig {
    fn default() -> Self {
        Self {
            arena_width: 800.0,
            arena_height: 600.0,
            obstacles: Vec::new(),
            num_rounds: 10,
            gun_cooling_rate: 0.1,
            inactivity_time: 450,
            turn_budget_ms: 20,
            debug_turn_timeout_ms: 10 * 60 * 1000,
            max_skipped_turns: 30,
            interrupt_grace_ms: 500,
            stop_grace_ms: 1500,
            end_grace_turns: 30,
            tps: None,
            event_queue_capacity: 256,
            history_len: 64,
            seed: 0,
            parallel_think: false,
            initial_positions: Vec::new(),
        }
    }
}

impl BattleConfig {
    /// Parses a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Checks the configuration for a battle with `agent_count` agents.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self, agent_count: usize) -> Result<(), ConfigError> {
        let min = rules::AGENT_SIZE;
        if !(self.arena_width.is_finite() && self.arena_height.is_finite())
            || self.arena_width < min
            || self.arena_height < min
        {
            return Err(ConfigError::InvalidArena {
                width: self.arena_width,
                height: self.arena_height,
            });
        }
        if self.num_rounds == 0 {
            return Err(ConfigError::NoRounds);
        }
        if self.turn_budget_ms == 0 {
            return Err(ConfigError::Zero {
                field: "turn_budget_ms",
            });
        }
        if self.max_skipped_turns == 0 {
            return Err(ConfigError::Zero {
                field: "max_skipped_turns",
            });
        }
        if self.event_queue_capacity == 0 {
            return Err(ConfigError::Zero {
                field: "event_queue_capacity",
            });
        }
        if self.tps == Some(0) {
            return Err(ConfigError::Zero { field: "tps" });
        }
        if self.initial_positions.len() > agent_count {
            return Err(ConfigError::TooManyPositions {
                positions: self.initial_positions.len(),
                agents: agent_count,
            });
        }
        let half = rules::AGENT_HALF_SIZE;
        let placeable = BoundingBox::new(
            DVec2::splat(half),
            DVec2::new(self.arena_width - half, self.arena_height - half),
        );
        if let Some(p) = self
            .initial_positions
            .iter()
            .find(|p| !placeable.contains(p.position()))
        {
            return Err(ConfigError::PositionOutOfBounds { x: p.x, y: p.y });
        }
        Ok(())
    }

    /// The arena rectangle.
    #[must_use]
    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::new(DVec2::ZERO, DVec2::new(self.arena_width, self.arena_height))
    }

    /// Base think budget.
    #[must_use]
    pub const fn turn_budget(&self) -> Duration {
        Duration::from_millis(self.turn_budget_ms)
    }

    /// Think budget while debugging or painting.
    #[must_use]
    pub const fn debug_turn_timeout(&self) -> Duration {
        Duration::from_millis(self.debug_turn_timeout_ms)
    }

    /// Wait after a cooperative halt request.
    #[must_use]
    pub const fn interrupt_grace(&self) -> Duration {
        Duration::from_millis(self.interrupt_grace_ms)
    }

    /// Wait after a forced stop.
    #[must_use]
    pub const fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    /// Minimum wall-clock length of a turn under the TPS cap.
    #[must_use]
    pub fn turn_period(&self) -> Option<Duration> {
        self.tps
            .filter(|&tps| tps > 0)
            .map(|tps| Duration::from_secs(1) / tps)
    }
}
