//! # Skirmish Core
//!
//! Turn-synchronized combat engine for autonomous agents.
//!
//! Each combatant runs its own logic on its own thread. The engine wakes
//! every agent once per turn, collects the orders it commits, and resolves
//! the turn deterministically on a single scheduler thread.
//!
//! ## Architecture
//!
//! - **Scheduler**: [`scheduler::TurnScheduler`] drives the seven-phase turn
//!   loop, battle commands and the round lifecycle
//! - **Agents**: [`agent`] holds the wake/yield handshake, timeouts and the
//!   thread runtime
//! - **Resolvers**: [`resolver`] resolves projectiles, movement and scans,
//!   composed by [`pipeline::TurnPipeline`]
//! - **Rules**: [`scoring::ScoringPolicy`] and [`rules`] hold the game rules
//!
//! ## Usage
//!
//! ```rust,ignore
//! use skirmish_core::config::BattleConfig;
//! use skirmish_core::scheduler::{AgentSpec, TurnScheduler};
//!
//! let mut battle = TurnScheduler::new(BattleConfig::default(), roster)?;
//! let results = battle.run()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod agent;
pub mod collision;
pub mod config;
pub mod entity;
pub mod error;
pub mod event;
pub mod geometry;
pub mod intent;
pub mod pipeline;
pub mod recorder;
pub mod resolver;
pub mod rules;
pub mod scheduler;
pub mod scoring;
pub mod snapshot;
pub mod world;

#[cfg(test)]
mod tests;

pub use config::BattleConfig;
pub use error::{AgentFault, ConfigError, EngineError};
pub use scheduler::{AgentSpec, BattleCommand, BattleController, BattleResults, TurnScheduler};
