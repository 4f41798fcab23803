//! Resolvers apply one phase of a turn to the world.
//!
//! The [`TurnPipeline`](crate::pipeline::TurnPipeline) runs its resolvers in
//! [`Phase`] order. Each resolver reads and writes the [`WorldState`] through
//! an exclusive reference and reports side effects (events, scores, deaths)
//! through a [`ResolveContext`].
//!
//! # Invariants
//!
//! - Resolvers MUST be deterministic given the same world and turn order
//! - Agent-facing effects iterate agents in [`ResolveContext::order`]
//! - A projectile makes at most one state transition per turn
//!
//! # Available Resolvers
//!
//! - [`ProjectileResolver`]: phase 3, projectile flight and hits
//! - [`MovementResolver`]: phase 4, headings, velocity, wall and ram checks
//! - [`ScanResolver`]: phase 5, radar sweeps against the moved world

mod movement;
mod projectile;
mod scan;

pub use movement::MovementResolver;
pub use projectile::ProjectileResolver;
pub use scan::ScanResolver;

use crate::entity::AgentId;
use crate::error::AgentFault;
use crate::event::EventFanout;
use crate::scoring::ScoringPolicy;
use crate::world::WorldState;

/// Energy that must be lost before the inactivity counter resets.
pub const INACTIVITY_RESET_ENERGY: f64 = 10.0;

/// Pipeline phase a resolver belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    /// Phase 3: advance and resolve projectiles.
    Projectiles,
    /// Phase 4: advance and resolve agent movement.
    Movement,
    /// Phase 5: radar scans.
    Scan,
}

/// Tracks how long the battle has gone without anyone losing energy to
/// combat.
///
/// Combat energy loss is accumulated; every [`INACTIVITY_RESET_ENERGY`]
/// accumulated resets the idle counter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InactivityMonitor {
    idle_turns: u64,
    energy_loss: f64,
}

impl InactivityMonitor {
    /// Creates a monitor with a zero count.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Turns since the counter last reset.
    #[must_use]
    pub const fn idle_turns(&self) -> u64 {
        self.idle_turns
    }

    /// Records combat energy loss.
    pub fn record_loss(&mut self, energy: f64) {
        if energy <= 0.0 || !energy.is_finite() {
            return;
        }
        self.energy_loss += energy;
        while self.energy_loss >= INACTIVITY_RESET_ENERGY {
            self.energy_loss -= INACTIVITY_RESET_ENERGY;
            self.idle_turns = 0;
        }
    }

    /// Counts one more turn.
    pub fn tick(&mut self) {
        self.idle_turns += 1;
    }

    /// Returns true once the idle count exceeds `inactivity_time`.
    #[must_use]
    pub const fn should_zap(&self, inactivity_time: u64) -> bool {
        self.idle_turns > inactivity_time
    }

    /// Resets the monitor for a new round.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Everything a resolver may touch besides the world.
pub struct ResolveContext<'a> {
    /// Turn being resolved
    pub turn: u64,
    /// This turn's randomized agent order
    pub order: &'a [AgentId],
    /// Event routing
    pub events: &'a mut EventFanout,
    /// Battle rules
    pub scoring: &'a mut dyn ScoringPolicy,
    /// Idle tracking
    pub activity: &'a mut InactivityMonitor,
    /// Gun heat removed per turn
    pub gun_cooling_rate: f64,
    /// Energy drained from every live agent this turn
    pub zap: f64,
    /// Agents killed so far this turn, in kill order
    pub deaths: Vec<AgentId>,
    /// Agents halted for invalid state this turn
    pub halts: Vec<(AgentId, AgentFault)>,
    /// Lines for agents' own logs
    pub log: Vec<(AgentId, String)>,
}

impl<'a> ResolveContext<'a> {
    /// Creates a context with empty outcome lists.
    pub fn new(
        turn: u64,
        order: &'a [AgentId],
        events: &'a mut EventFanout,
        scoring: &'a mut dyn ScoringPolicy,
        activity: &'a mut InactivityMonitor,
    ) -> Self {
        Self {
            turn,
            order,
            events,
            scoring,
            activity,
            gun_cooling_rate: 0.1,
            zap: 0.0,
            deaths: Vec::new(),
            halts: Vec::new(),
            log: Vec::new(),
        }
    }

    /// Appends a line to an agent's log.
    pub fn log_line(&mut self, agent: AgentId, line: impl Into<String>) {
        self.log.push((agent, line.into()));
    }
}

/// Applies one phase of a turn.
///
/// # Example
///
/// ```
/// use skirmish_core::resolver::{Phase, ResolveContext, Resolver};
/// use skirmish_core::world::WorldState;
///
/// struct Noop;
///
/// impl Resolver for Noop {
///     fn phase(&self) -> Phase {
///         Phase::Scan
///     }
///
///     fn resolve(&self, _world: &mut WorldState, _ctx: &mut ResolveContext<'_>) {}
/// }
/// ```
pub trait Resolver: Send + Sync {
    /// Phase this resolver runs in.
    fn phase(&self) -> Phase;

    /// Applies the phase.
    fn resolve(&self, world: &mut WorldState, ctx: &mut ResolveContext<'_>);
}

/// The three standard resolvers in phase order.
#[must_use]
pub fn standard_resolvers() -> Vec<Box<dyn Resolver>> {
    vec![
        Box::new(ProjectileResolver::new()),
        Box::new(MovementResolver::new()),
        Box::new(ScanResolver::new()),
    ]
}
