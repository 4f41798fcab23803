//! Scheduler-side bookkeeping for one agent.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::{BattleConfig, FIRST_TURN_TIMEOUT_FACTOR};
use crate::entity::AgentId;
use crate::error::AgentFault;

use super::{AgentRuntime, WakeOutcome};

/// How often escalation polls a context that is shutting down.
const STOP_POLL: Duration = Duration::from_millis(5);

/// Timeouts, skip counting, logs and escalation for one agent.
#[derive(Debug, Clone)]
pub struct AgentHandle {
    id: AgentId,
    name: String,
    cost_factor: f64,
    painting: bool,
    consecutive_skips: u32,
    total_skips: u32,
    wakes: u64,
    stopped: bool,
    log: Vec<String>,
}

impl AgentHandle {
    /// Creates a handle. `cost_factor` scales the turn budget.
    #[must_use]
    pub fn new(id: AgentId, name: impl Into<String>, cost_factor: f64) -> Self {
        Self {
            id,
            name: name.into(),
            cost_factor: if cost_factor.is_finite() && cost_factor > 0.0 {
                cost_factor
            } else {
                1.0
            },
            painting: false,
            consecutive_skips: 0,
            total_skips: 0,
            wakes: 0,
            stopped: false,
            log: Vec::new(),
        }
    }

    /// Agent identifier.
    #[must_use]
    pub const fn id(&self) -> AgentId {
        self.id
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Skips in a row since the last yield.
    #[must_use]
    pub const fn consecutive_skips(&self) -> u32 {
        self.consecutive_skips
    }

    /// Skips over the whole battle.
    #[must_use]
    pub const fn total_skips(&self) -> u32 {
        self.total_skips
    }

    /// Wakes actually delivered to the agent.
    #[must_use]
    pub const fn wakes(&self) -> u64 {
        self.wakes
    }

    /// Returns true once the agent's context is stopped for this round.
    #[must_use]
    pub const fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Lines written to this agent's log.
    #[must_use]
    pub fn log(&self) -> &[String] {
        &self.log
    }

    /// Appends a line to the agent's log.
    pub fn push_log(&mut self, line: impl Into<String>) {
        self.log.push(line.into());
    }

    /// Turns painting on or off. Painting agents get the debug timeout.
    pub fn set_painting(&mut self, on: bool) {
        self.painting = on;
    }

    /// Prepares for a fresh context at round start.
    pub fn start_round(&mut self) {
        self.consecutive_skips = 0;
        self.stopped = false;
    }

    /// Marks the context as stopped; no further wakes are issued.
    pub fn mark_stopped(&mut self) {
        self.stopped = true;
    }

    /// Think budget for the next wake.
    ///
    /// The first turn of a round gets [`FIRST_TURN_TIMEOUT_FACTOR`] times the
    /// normal budget. Debugging or painting agents get the debug timeout.
    #[must_use]
    pub fn timeout(&self, config: &BattleConfig, first_turn: bool, debugging: bool) -> Duration {
        if debugging || self.painting {
            return config.debug_turn_timeout();
        }
        let budget = config.turn_budget().mul_f64(self.cost_factor);
        if first_turn {
            budget * FIRST_TURN_TIMEOUT_FACTOR
        } else {
            budget
        }
    }

    /// Counts a wake that actually reached the agent.
    pub fn count_wake(&mut self) {
        self.wakes += 1;
    }

    /// Applies the outcome of one think-cycle.
    ///
    /// # Returns
    ///
    /// The fault that should halt or kill the agent, if any. A timeout only
    /// becomes a fault once the consecutive skips reach
    /// `max_skipped_turns`.
    pub fn record(&mut self, outcome: &WakeOutcome, turn: u64, max_skips: u32) -> Option<AgentFault> {
        match outcome {
            WakeOutcome::Yielded => {
                self.consecutive_skips = 0;
                None
            }
            WakeOutcome::TimedOut => {
                self.consecutive_skips += 1;
                self.total_skips += 1;
                self.log
                    .push(format!("SYSTEM: {} skipped turn {turn}", self.name));
                debug!(agent = %self.id, turn, skips = self.consecutive_skips, "turn skipped");
                (self.consecutive_skips >= max_skips).then_some(AgentFault::Runaway {
                    skips: self.consecutive_skips,
                })
            }
            WakeOutcome::Crashed(fault) => Some(fault.clone()),
            WakeOutcome::Stopped => None,
        }
    }

    /// Stops an unresponsive context.
    ///
    /// 1. Sets the halt flag and waits `interrupt_grace`.
    /// 2. Forces the stop (the thread's generation goes stale) and waits
    ///    `stop_grace`.
    /// 3. Detaches whatever is still running.
    ///
    /// Returns true if the context ended within the grace periods.
    pub fn escalate(&mut self, runtime: &mut dyn AgentRuntime, config: &BattleConfig) -> bool {
        self.stopped = true;
        let Some(rendezvous) = runtime.rendezvous(self.id) else {
            return true;
        };

        rendezvous.request_halt();
        if wait_for_exit(runtime, self.id, config.interrupt_grace()) {
            runtime.join(self.id);
            info!(agent = %self.id, "agent stopped after halt request");
            return true;
        }

        warn!(agent = %self.id, "agent ignored halt request, forcing stop");
        runtime.force_stop(self.id);
        if wait_for_exit(runtime, self.id, config.stop_grace()) {
            runtime.join(self.id);
            return true;
        }

        warn!(agent = %self.id, "agent thread still running after forced stop, detaching");
        self.log.push(format!(
            "SYSTEM: {} is not stopping; its thread was abandoned",
            self.name
        ));
        runtime.join(self.id);
        false
    }
}

fn wait_for_exit(runtime: &dyn AgentRuntime, id: AgentId, grace: Duration) -> bool {
    let deadline = Instant::now() + grace;
    loop {
        if !runtime.is_alive(id) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(STOP_POLL);
    }
}
