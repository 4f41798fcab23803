//! The wake/yield rendezvous between the scheduler and one agent thread.
//!
//! # Protocol
//!
//! ```text
//!            scheduler                         agent thread
//!   signal(view) ── Thinking, seq+1 ──▶  wait_for_wake() returns view
//!   await_yield(deadline) ◀── Asleep ──  yield_turn() after committing
//! ```
//!
//! Everything lives under one mutex with two condition variables: `wake`
//! (the agent waits on it) and `done` (the scheduler waits on it). The
//! sequence number makes a signal impossible to lose, whether the agent is
//! already waiting or still on its way back.
//!
//! # Generations
//!
//! [`Rendezvous::force_stop`] advances the generation. A thread that was
//! started under an older generation can no longer yield, crash, or be
//! woken: every agent-side call checks its generation first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::error::AgentFault;

use super::AgentView;

/// Where the agent is in its think-cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentPhase {
    /// Started, never woken.
    Idle,
    /// Woken and running its logic.
    Thinking,
    /// Yielded; waiting for the next wake.
    Asleep,
    /// Stopped by the engine.
    Halted,
    /// Its logic crashed.
    Dead,
}

/// Result of waiting for one think-cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum WakeOutcome {
    /// The agent yielded in time.
    Yielded,
    /// The timeout passed first, or the agent was still thinking from an
    /// earlier turn and was not woken.
    TimedOut,
    /// The agent's logic crashed.
    Crashed(AgentFault),
    /// The agent is halted and can no longer be woken.
    Stopped,
}

/// Flags an agent may poll while it thinks.
#[derive(Debug, Default)]
pub struct StopFlags {
    halt: AtomicBool,
    abort: AtomicBool,
}

impl StopFlags {
    /// Returns true once the engine asked the agent to stop.
    #[must_use]
    pub fn halt_requested(&self) -> bool {
        self.halt.load(Ordering::Acquire)
    }

    /// Returns true once the battle is being aborted.
    #[must_use]
    pub fn abort_requested(&self) -> bool {
        self.abort.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
struct RendezvousState {
    phase: AgentPhase,
    wake_seq: u64,
    generation: u64,
    view: Option<Arc<AgentView>>,
    fault: Option<AgentFault>,
}

/// One agent's synchronization point.
#[derive(Debug)]
pub struct Rendezvous {
    state: Mutex<RendezvousState>,
    wake: Condvar,
    done: Condvar,
    flags: Arc<StopFlags>,
}

impl Default for Rendezvous {
    fn default() -> Self {
        Self::new()
    }
}

impl Rendezvous {
    /// Creates an idle rendezvous at generation 0.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RendezvousState {
                phase: AgentPhase::Idle,
                wake_seq: 0,
                generation: 0,
                view: None,
                fault: None,
            }),
            wake: Condvar::new(),
            done: Condvar::new(),
            flags: Arc::new(StopFlags::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RendezvousState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> AgentPhase {
        self.lock().phase
    }

    /// Current generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Number of wakes issued so far.
    #[must_use]
    pub fn wake_count(&self) -> u64 {
        self.lock().wake_seq
    }

    /// Flags shared with every view handed to the agent.
    #[must_use]
    pub fn flags(&self) -> Arc<StopFlags> {
        Arc::clone(&self.flags)
    }

    // =========================================================================
    // Scheduler side
    // =========================================================================

    /// Hands `view` to the agent and marks it thinking.
    ///
    /// # Returns
    ///
    /// `false` without doing anything if the agent is thinking, halted or
    /// dead.
    pub fn signal(&self, view: Arc<AgentView>) -> bool {
        let mut state = self.lock();
        if !matches!(state.phase, AgentPhase::Idle | AgentPhase::Asleep) {
            return false;
        }
        state.view = Some(view);
        state.wake_seq += 1;
        state.phase = AgentPhase::Thinking;
        self.wake.notify_all();
        true
    }

    /// Blocks until the agent yields, crashes or stops, or `deadline` passes.
    pub fn await_yield(&self, deadline: Instant) -> WakeOutcome {
        let mut state = self.lock();
        loop {
            match state.phase {
                AgentPhase::Asleep | AgentPhase::Idle => return WakeOutcome::Yielded,
                AgentPhase::Halted => return WakeOutcome::Stopped,
                AgentPhase::Dead => {
                    let fault = state.fault.clone().unwrap_or(AgentFault::Crash {
                        message: "unknown".to_string(),
                    });
                    return WakeOutcome::Crashed(fault);
                }
                AgentPhase::Thinking => {}
            }
            let now = Instant::now();
            if now >= deadline {
                return WakeOutcome::TimedOut;
            }
            state = self
                .done
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Wakes the agent and waits for it until `deadline`.
    ///
    /// An agent that is still thinking from an earlier turn is not woken
    /// again; that counts as [`WakeOutcome::TimedOut`].
    pub fn wake(&self, view: Arc<AgentView>, deadline: Instant) -> WakeOutcome {
        match self.phase() {
            AgentPhase::Thinking => WakeOutcome::TimedOut,
            AgentPhase::Halted => WakeOutcome::Stopped,
            AgentPhase::Dead => self.await_yield(deadline),
            AgentPhase::Idle | AgentPhase::Asleep => {
                if self.signal(view) {
                    self.await_yield(deadline)
                } else {
                    WakeOutcome::TimedOut
                }
            }
        }
    }

    /// Asks the agent to stop at its next yield point.
    pub fn request_halt(&self) {
        self.flags.halt.store(true, Ordering::Release);
        let _state = self.lock();
        self.wake.notify_all();
    }

    /// Tells the agent the battle is being aborted.
    pub fn request_abort(&self) {
        self.flags.abort.store(true, Ordering::Release);
    }

    /// Abandons the current thread: advances the generation and marks the
    /// agent halted.
    pub fn force_stop(&self) {
        self.flags.halt.store(true, Ordering::Release);
        let mut state = self.lock();
        state.generation += 1;
        state.phase = AgentPhase::Halted;
        state.view = None;
        self.wake.notify_all();
        self.done.notify_all();
    }

    // =========================================================================
    // Agent side
    // =========================================================================

    /// Blocks until the scheduler issues a wake newer than `last_seq`.
    ///
    /// # Returns
    ///
    /// The new sequence number and view, or `None` if the thread should exit.
    pub fn wait_for_wake(&self, last_seq: u64, generation: u64) -> Option<(u64, Arc<AgentView>)> {
        let mut state = self.lock();
        loop {
            if state.generation != generation
                || self.flags.halt_requested()
                || matches!(state.phase, AgentPhase::Halted | AgentPhase::Dead)
            {
                return None;
            }
            if state.phase == AgentPhase::Thinking && state.wake_seq > last_seq {
                if let Some(view) = state.view.clone() {
                    return Some((state.wake_seq, view));
                }
            }
            state = self
                .wake
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Ends the current think-cycle.
    ///
    /// # Returns
    ///
    /// `false` if the caller belongs to an abandoned generation or was not
    /// thinking.
    pub fn yield_turn(&self, generation: u64) -> bool {
        let mut state = self.lock();
        if state.generation != generation || state.phase != AgentPhase::Thinking {
            return false;
        }
        state.phase = AgentPhase::Asleep;
        self.done.notify_all();
        true
    }

    /// Records a crash of the agent's logic.
    pub fn crash(&self, generation: u64, fault: AgentFault) {
        let mut state = self.lock();
        if state.generation != generation {
            return;
        }
        state.phase = AgentPhase::Dead;
        state.fault = Some(fault);
        self.done.notify_all();
    }

    /// Marks a thread that exited on its own as halted.
    pub fn finish(&self, generation: u64) {
        let mut state = self.lock();
        if state.generation != generation || state.phase == AgentPhase::Dead {
            return;
        }
        state.phase = AgentPhase::Halted;
        self.done.notify_all();
    }
}
