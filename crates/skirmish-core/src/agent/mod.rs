//! Agents: the logic that drives a combatant and the machinery that runs it.
//!
//! This module provides:
//! - [`Brain`]: the decision logic supplied by whoever writes a combatant
//! - [`AgentView`]: the read-only input to one think-cycle
//! - [`Rendezvous`]: the wake/yield handshake with one agent thread
//! - [`AgentHandle`]: scheduler-side bookkeeping (timeouts, skips, escalation)
//! - [`AgentRuntime`] and [`ThreadRuntime`]: where agent logic executes
//!
//! # Think-cycle
//!
//! In phase 7 of every turn the scheduler hands each living agent a fresh
//! [`AgentView`] and waits for it to yield. While it thinks, the agent sees
//! only the view; its [`Intent`] reaches the world through an
//! [`IntentCell`](crate::intent::IntentCell) that is collected in phase 2 of
//! the next turn.

mod handle;
mod handshake;
mod runtime;

use std::sync::Arc;

use crate::event::EventEnvelope;
use crate::intent::Intent;
use crate::snapshot::AgentStatus;

pub use handle::AgentHandle;
pub use handshake::{AgentPhase, Rendezvous, StopFlags, WakeOutcome};
pub use runtime::{AgentRuntime, ThreadRuntime};

/// Decision logic for one combatant.
///
/// `think` runs on the agent's own thread, once per wake. It returns the
/// orders for the next turn. Long-running logic should poll
/// [`AgentView::halt_requested`] and return promptly once it is set.
pub trait Brain: Send {
    /// Decides what to do next.
    fn think(&mut self, view: &AgentView) -> Intent;
}

/// Builds a fresh brain at the start of every round.
pub type BrainFactory = Arc<dyn Fn() -> Box<dyn Brain> + Send + Sync>;

/// Everything an agent is told when it is woken.
#[derive(Debug, Clone)]
pub struct AgentView {
    /// Own state at the end of the last turn
    pub status: AgentStatus,
    /// Events raised since the previous wake, oldest first
    pub events: Vec<EventEnvelope>,
    flags: Arc<StopFlags>,
}

impl AgentView {
    /// Creates a view.
    #[must_use]
    pub fn new(status: AgentStatus, events: Vec<EventEnvelope>, flags: Arc<StopFlags>) -> Self {
        Self {
            status,
            events,
            flags,
        }
    }

    /// Returns true once the engine asked this agent to stop.
    #[must_use]
    pub fn halt_requested(&self) -> bool {
        self.flags.halt_requested()
    }

    /// Returns true once the battle is being aborted.
    #[must_use]
    pub fn abort_requested(&self) -> bool {
        self.flags.abort_requested()
    }

    /// Orders that keep doing whatever the agent was doing.
    #[must_use]
    pub fn continuing(&self) -> Intent {
        Intent::continuing(&self.status)
    }
}
