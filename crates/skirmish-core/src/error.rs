//! Error types for the skirmish engine.
//!
//! Two families live here:
//!
//! - [`EngineError`] and [`ConfigError`] are ordinary `Result` errors. They
//!   abort a battle and surface to whoever drives the [`TurnScheduler`].
//! - [`AgentFault`] is never returned from the scheduler. It describes what
//!   went wrong with one combatant and is converted into a lifecycle
//!   transition (skip, halt, death) plus a line in that agent's log.
//!
//! [`TurnScheduler`]: crate::scheduler::TurnScheduler

use thiserror::Error;

use crate::entity::AgentId;

/// Errors raised while validating or parsing a [`BattleConfig`](crate::config::BattleConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Arena dimensions must be finite and large enough to hold an agent.
    #[error("invalid arena size {width}x{height}")]
    InvalidArena {
        /// Configured width
        width: f64,
        /// Configured height
        height: f64,
    },

    /// A battle needs at least one round.
    #[error("num_rounds must be at least 1")]
    NoRounds,

    /// A duration or rate that must be positive was zero.
    #[error("{field} must be greater than zero")]
    Zero {
        /// Name of the offending field
        field: &'static str,
    },

    /// More initial positions than agents were supplied.
    #[error("{positions} initial positions supplied for {agents} agents")]
    TooManyPositions {
        /// Number of positions in the config
        positions: usize,
        /// Number of registered agents
        agents: usize,
    },

    /// An initial position puts the agent partly outside the arena.
    #[error("initial position ({x}, {y}) does not fit inside the arena walls")]
    PositionOutOfBounds {
        /// X coordinate
        x: f64,
        /// Y coordinate
        y: f64,
    },

    /// The JSON document could not be parsed.
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors that abort a battle.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A battle was started without any registered agents.
    #[error("battle has no agents")]
    NoAgents,

    /// A command or query referenced an agent that does not exist.
    #[error("unknown agent {0}")]
    UnknownAgent(AgentId),

    /// The operating system refused to spawn an agent thread.
    #[error("failed to spawn agent thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),

    /// The battle has already run to completion.
    #[error("battle already finished")]
    BattleFinished,
}

/// A fault attributed to a single agent.
///
/// Faults are contained at the agent boundary; the scheduler records them in
/// the agent's log and applies the matching lifecycle transition.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AgentFault {
    /// One think-cycle did not yield within its timeout.
    #[error("skipped turn {turn}")]
    Timeout {
        /// Turn on which the skip was recorded
        turn: u64,
    },

    /// Too many consecutive skipped turns.
    #[error("not responding after {skips} skipped turns")]
    Runaway {
        /// Consecutive skips at the time of the halt
        skips: u32,
    },

    /// The agent's logic panicked.
    #[error("crashed: {message}")]
    Crash {
        /// Panic payload, if it was a string
        message: String,
    },

    /// The agent produced or reached a non-finite numeric state.
    #[error("invalid numeric state in {field}")]
    InvalidState {
        /// Name of the offending field
        field: &'static str,
    },
}

impl AgentFault {
    /// Builds a crash fault from a panic payload.
    #[must_use]
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };
        Self::Crash { message }
    }

    /// Returns true if this fault removes the agent from the round.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Timeout { .. })
    }
}
