//! Where agent logic executes.
//!
//! [`AgentRuntime`] is the seam between the scheduler and the execution
//! contexts of agents. [`ThreadRuntime`] gives every agent one OS thread per
//! round; the thread loops over [`Rendezvous::wait_for_wake`], runs the
//! brain under `catch_unwind`, commits the intent and yields.
//!
//! A thread that ignores its halt flag cannot be killed. After a forced stop
//! its generation is stale: it can no longer commit or yield, and once the
//! stop grace period expires it is detached and left to finish on its own.

use std::collections::{BTreeMap, BTreeSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::entity::AgentId;
use crate::error::{AgentFault, EngineError};
use crate::intent::IntentCell;

use super::{BrainFactory, Rendezvous};

/// Execution contexts for agent logic.
pub trait AgentRuntime: Send {
    /// Registers the brain factory for `agent`.
    fn register(&mut self, agent: AgentId, brain: BrainFactory);

    /// Creates a fresh execution context for `agent` in `round`.
    ///
    /// Any context left over from an earlier round is stopped first.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownAgent`] for an unregistered agent, or
    /// [`EngineError::ThreadSpawn`] if the context could not be started.
    fn start_round(&mut self, agent: AgentId, round: u32) -> Result<(), EngineError>;

    /// The handshake with the current context of `agent`.
    fn rendezvous(&self, agent: AgentId) -> Option<Arc<Rendezvous>>;

    /// The intent slot of the current context of `agent`.
    fn intents(&self, agent: AgentId) -> Option<Arc<IntentCell>>;

    /// Abandons the current context of `agent`.
    fn force_stop(&mut self, agent: AgentId);

    /// Returns true while the context of `agent` is still executing.
    fn is_alive(&self, agent: AgentId) -> bool;

    /// Returns true while `agent` is being debugged.
    fn is_debugging(&self, agent: AgentId) -> bool;

    /// Marks `agent` as being debugged, which lifts its turn timeout to the
    /// debug timeout.
    fn set_debugging(&mut self, agent: AgentId, on: bool);

    /// Reaps the context of `agent`: joins it if it has finished, detaches
    /// it otherwise.
    fn join(&mut self, agent: AgentId);
}

struct Slot {
    rendezvous: Arc<Rendezvous>,
    intents: Arc<IntentCell>,
    thread: Option<JoinHandle<()>>,
}

impl Slot {
    fn reap(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.is_finished() {
                if thread.join().is_err() {
                    warn!("agent thread ended with an uncaught panic");
                }
            } else {
                debug!("detaching agent thread");
            }
        }
    }
}

/// One OS thread per agent per round.
#[derive(Default)]
pub struct ThreadRuntime {
    brains: BTreeMap<AgentId, BrainFactory>,
    slots: BTreeMap<AgentId, Slot>,
    debugging: BTreeSet<AgentId>,
}

impl ThreadRuntime {
    /// Creates a runtime with no agents.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn stop(&mut self, agent: AgentId) {
        if let Some(mut slot) = self.slots.remove(&agent) {
            slot.rendezvous.request_halt();
            slot.rendezvous.force_stop();
            slot.reap();
        }
    }
}

impl std::fmt::Debug for ThreadRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadRuntime")
            .field("agents", &self.brains.keys().collect::<Vec<_>>())
            .field("running", &self.slots.keys().collect::<Vec<_>>())
            .field("debugging", &self.debugging)
            .finish()
    }
}

impl AgentRuntime for ThreadRuntime {
    fn register(&mut self, agent: AgentId, brain: BrainFactory) {
        self.brains.insert(agent, brain);
    }

    fn start_round(&mut self, agent: AgentId, round: u32) -> Result<(), EngineError> {
        self.stop(agent);
        let brain = self
            .brains
            .get(&agent)
            .cloned()
            .ok_or(EngineError::UnknownAgent(agent))?;

        let rendezvous = Arc::new(Rendezvous::new());
        let intents = Arc::new(IntentCell::new());
        let thread = thread::Builder::new()
            .name(format!("agent-{}-r{round}", agent.as_u64()))
            .spawn({
                let rendezvous = Arc::clone(&rendezvous);
                let intents = Arc::clone(&intents);
                move || agent_loop(&brain, &rendezvous, &intents)
            })?;

        self.slots.insert(
            agent,
            Slot {
                rendezvous,
                intents,
                thread: Some(thread),
            },
        );
        Ok(())
    }

    fn rendezvous(&self, agent: AgentId) -> Option<Arc<Rendezvous>> {
        self.slots.get(&agent).map(|s| Arc::clone(&s.rendezvous))
    }

    fn intents(&self, agent: AgentId) -> Option<Arc<IntentCell>> {
        self.slots.get(&agent).map(|s| Arc::clone(&s.intents))
    }

    fn force_stop(&mut self, agent: AgentId) {
        if let Some(slot) = self.slots.get(&agent) {
            slot.rendezvous.force_stop();
        }
    }

    fn is_alive(&self, agent: AgentId) -> bool {
        self.slots
            .get(&agent)
            .and_then(|s| s.thread.as_ref())
            .is_some_and(|t| !t.is_finished())
    }

    fn is_debugging(&self, agent: AgentId) -> bool {
        self.debugging.contains(&agent)
    }

    fn set_debugging(&mut self, agent: AgentId, on: bool) {
        if on {
            self.debugging.insert(agent);
        } else {
            self.debugging.remove(&agent);
        }
    }

    fn join(&mut self, agent: AgentId) {
        if let Some(slot) = self.slots.get_mut(&agent) {
            slot.reap();
        }
    }
}

impl Drop for ThreadRuntime {
    fn drop(&mut self) {
        let agents: Vec<AgentId> = self.slots.keys().copied().collect();
        for agent in agents {
            self.stop(agent);
        }
    }
}

/// Body of an agent thread.
fn agent_loop(factory: &BrainFactory, rendezvous: &Rendezvous, intents: &IntentCell) {
    let generation = rendezvous.generation();
    let mut brain = match panic::catch_unwind(AssertUnwindSafe(|| (**factory)())) {
        Ok(brain) => brain,
        Err(payload) => {
            rendezvous.crash(generation, AgentFault::from_panic(payload.as_ref()));
            return;
        }
    };

    let mut seq = 0;
    while let Some((next, view)) = rendezvous.wait_for_wake(seq, generation) {
        seq = next;
        match panic::catch_unwind(AssertUnwindSafe(|| brain.think(&view))) {
            Ok(intent) => {
                if rendezvous.generation() != generation {
                    break;
                }
                intents.commit(intent);
                if !rendezvous.yield_turn(generation) {
                    break;
                }
            }
            Err(payload) => {
                rendezvous.crash(generation, AgentFault::from_panic(payload.as_ref()));
                return;
            }
        }
    }
    rendezvous.finish(generation);
}
