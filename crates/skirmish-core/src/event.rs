//! Events delivered to agents.
//!
//! Resolvers emit [`AgentEvent`]s into the [`EventFanout`] while a turn is
//! being resolved. Each agent has a bounded [`EventInbox`]; in phase 7 the
//! inbox is drained into the view handed to the agent, so each event is
//! delivered exactly once.
//!
//! # Backpressure
//!
//! An inbox never blocks the scheduler. When it is full, the oldest
//! non-critical event is dropped and the count is reported to the agent as a
//! single [`AgentEvent::QueueOverflow`] warning at the next drain. Critical
//! events (death, win, skipped turn, round and battle end) are never dropped.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entity::{AgentId, ProjectileId};

/// Something that happened to, or was observed by, an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AgentEvent {
    /// The radar swept over another agent.
    Scanned {
        /// Agent that was seen
        target: AgentId,
        /// Its energy
        energy: f64,
        /// Bearing relative to the scanner's body heading
        bearing: f64,
        /// Centre-to-centre distance
        distance: f64,
        /// Its body heading
        heading: f64,
        /// Its velocity
        velocity: f64,
    },
    /// The agent ran into a wall or obstacle.
    HitWall {
        /// Bearing of the wall relative to the body heading
        bearing: f64,
    },
    /// The agent collided with another agent.
    HitAgent {
        /// The other party
        other: AgentId,
        /// Bearing of the other party relative to the body heading
        bearing: f64,
        /// The other party's energy after the collision
        other_energy: f64,
        /// True if this agent's motion caused the collision
        at_fault: bool,
    },
    /// The agent was hit by a projectile.
    HitByProjectile {
        /// The projectile
        projectile: ProjectileId,
        /// Who fired it
        owner: AgentId,
        /// Its power
        power: f64,
        /// Bearing of the projectile's origin relative to the body heading
        bearing: f64,
    },
    /// One of the agent's projectiles hit someone.
    ProjectileHit {
        /// The projectile
        projectile: ProjectileId,
        /// Who was hit
        victim: AgentId,
        /// Victim energy after the hit
        victim_energy: f64,
    },
    /// One of the agent's bullets hit a wall.
    ProjectileMissed {
        /// The projectile
        projectile: ProjectileId,
    },
    /// One of the agent's projectiles collided with another projectile.
    ProjectileHitProjectile {
        /// The agent's projectile
        projectile: ProjectileId,
        /// The one it hit
        other: ProjectileId,
    },
    /// Another agent died.
    AgentDeath {
        /// Who died
        agent: AgentId,
    },
    /// This agent died.
    Death,
    /// This agent won the round.
    Win,
    /// This agent's think-cycle did not finish in time.
    ///
    /// Skips that pile up before the agent drains its inbox are folded into
    /// one event.
    SkippedTurn {
        /// Latest turn that was skipped
        turn: u64,
        /// Skips folded into this event
        count: u32,
    },
    /// The round is over.
    RoundEnded {
        /// Round number, starting at 0
        round: u32,
        /// Turns played in the round
        turns: u64,
    },
    /// The battle is over.
    BattleEnded {
        /// True if the battle was aborted
        aborted: bool,
    },
    /// Events were dropped because the inbox was full.
    QueueOverflow {
        /// Number of events dropped since the last drain
        dropped: usize,
    },
}

impl AgentEvent {
    /// Returns true for events that are never dropped on overflow.
    #[must_use]
    pub const fn is_critical(&self) -> bool {
        matches!(
            self,
            Self::Death
                | Self::Win
                | Self::SkippedTurn { .. }
                | Self::RoundEnded { .. }
                | Self::BattleEnded { .. }
        )
    }
}

/// An event stamped with the turn it was raised on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Turn the event was raised on
    pub turn: u64,
    /// The event
    pub event: AgentEvent,
}

/// A bounded FIFO of events for one agent.
#[derive(Debug, Clone)]
pub struct EventInbox {
    capacity: usize,
    queue: VecDeque<EventEnvelope>,
    dropped: usize,
    last_turn: u64,
}

impl EventInbox {
    /// Creates an inbox holding at most `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            queue: VecDeque::with_capacity(capacity.min(1024)),
            dropped: 0,
            last_turn: 0,
        }
    }

    /// Queues an event, dropping the oldest non-critical one if full.
    ///
    /// # Returns
    ///
    /// The number of events dropped by this call (0 or 1).
    pub fn push(&mut self, turn: u64, event: AgentEvent) -> usize {
        self.last_turn = turn;
        let event = self.fold_skips(event);
        let mut dropped = 0;
        if self.queue.len() >= self.capacity {
            if let Some(index) = self.queue.iter().position(|e| !e.event.is_critical()) {
                self.queue.remove(index);
                dropped = 1;
            } else if !event.is_critical() {
                self.dropped += 1;
                return 1;
            }
        }
        self.dropped += dropped;
        self.queue.push_back(EventEnvelope { turn, event });
        dropped
    }

    /// Removes a pending skip and adds its count to `event` if it is a skip.
    fn fold_skips(&mut self, event: AgentEvent) -> AgentEvent {
        let AgentEvent::SkippedTurn { turn, count } = event else {
            return event;
        };
        let pending = self
            .queue
            .iter()
            .position(|e| matches!(e.event, AgentEvent::SkippedTurn { .. }));
        match pending.and_then(|index| self.queue.remove(index)) {
            Some(EventEnvelope {
                event: AgentEvent::SkippedTurn { count: earlier, .. },
                ..
            }) => AgentEvent::SkippedTurn {
                turn,
                count: count.saturating_add(earlier),
            },
            _ => AgentEvent::SkippedTurn { turn, count },
        }
    }

    /// Number of queued events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty() && self.dropped == 0
    }

    /// Takes every queued event, preceded by an overflow warning if needed.
    pub fn drain(&mut self) -> Vec<EventEnvelope> {
        let mut out = Vec::with_capacity(self.queue.len() + 1);
        if self.dropped > 0 {
            out.push(EventEnvelope {
                turn: self.last_turn,
                event: AgentEvent::QueueOverflow {
                    dropped: self.dropped,
                },
            });
            self.dropped = 0;
        }
        out.extend(self.queue.drain(..));
        out
    }

    /// Discards everything.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.dropped = 0;
    }
}

/// Routes events to per-agent inboxes and keeps a log of the current turn.
#[derive(Debug, Clone)]
pub struct EventFanout {
    capacity: usize,
    inboxes: BTreeMap<AgentId, EventInbox>,
    turn_log: Vec<(AgentId, EventEnvelope)>,
}

impl EventFanout {
    /// Creates a fanout whose inboxes hold `capacity` events each.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inboxes: BTreeMap::new(),
            turn_log: Vec::new(),
        }
    }

    /// Adds an inbox for `agent` if it has none.
    pub fn register(&mut self, agent: AgentId) {
        let capacity = self.capacity;
        self.inboxes
            .entry(agent)
            .or_insert_with(|| EventInbox::new(capacity));
    }

    /// Sends an event to one agent.
    pub fn send(&mut self, agent: AgentId, turn: u64, event: AgentEvent) {
        let Some(inbox) = self.inboxes.get_mut(&agent) else {
            return;
        };
        self.turn_log.push((
            agent,
            EventEnvelope {
                turn,
                event: event.clone(),
            },
        ));
        if inbox.push(turn, event) > 0 {
            debug!(agent = %agent, turn, "event inbox full, dropped oldest event");
        }
    }

    /// Sends an event to every registered agent except `except`.
    pub fn broadcast(&mut self, except: Option<AgentId>, turn: u64, event: &AgentEvent) {
        let targets: Vec<AgentId> = self
            .inboxes
            .keys()
            .copied()
            .filter(|id| Some(*id) != except)
            .collect();
        for agent in targets {
            self.send(agent, turn, event.clone());
        }
    }

    /// Takes the pending events of one agent.
    pub fn drain(&mut self, agent: AgentId) -> Vec<EventEnvelope> {
        self.inboxes
            .get_mut(&agent)
            .map(EventInbox::drain)
            .unwrap_or_default()
    }

    /// Number of events waiting for `agent`.
    #[must_use]
    pub fn pending(&self, agent: AgentId) -> usize {
        self.inboxes.get(&agent).map_or(0, EventInbox::len)
    }

    /// Takes the log of every event sent since the last call.
    pub fn take_turn_log(&mut self) -> Vec<(AgentId, EventEnvelope)> {
        std::mem::take(&mut self.turn_log)
    }

    /// Empties every inbox and the turn log.
    pub fn clear(&mut self) {
        for inbox in self.inboxes.values_mut() {
            inbox.clear();
        }
        self.turn_log.clear();
    }
}
