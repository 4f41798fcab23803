//! Immutable views of the world.
//!
//! An [`AgentStatus`] is what one agent is allowed to know about itself at
//! wake time. A [`TurnSnapshot`] is the full per-turn record handed to the
//! [`RecorderSink`](crate::recorder::RecorderSink). Both are plain values;
//! nothing in here points back into [`WorldState`].

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::entity::{
    AgentBody, AgentId, Lifecycle, Projectile, ProjectileId, ProjectileKind, ProjectileState,
    TeamId,
};
use crate::event::EventEnvelope;
use crate::world::WorldState;

/// One agent's own state, copied out at the end of a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStatus {
    /// Identifier
    pub id: AgentId,
    /// Display name
    pub name: String,
    /// Team membership
    pub team: Option<TeamId>,
    /// Round number
    pub round: u32,
    /// Turn within the round
    pub turn: u64,
    /// Centre of the body
    pub position: DVec2,
    /// Body heading
    pub body_heading: f64,
    /// Gun heading
    pub gun_heading: f64,
    /// Radar heading
    pub radar_heading: f64,
    /// Signed velocity
    pub velocity: f64,
    /// Energy
    pub energy: f64,
    /// Gun heat
    pub gun_heat: f64,
    /// Lifecycle state
    pub lifecycle: Lifecycle,
    /// Remaining travel
    pub distance_remaining: f64,
    /// Remaining body rotation
    pub body_turn_remaining: f64,
    /// Remaining gun rotation
    pub gun_turn_remaining: f64,
    /// Remaining radar rotation
    pub radar_turn_remaining: f64,
    /// Velocity cap in force
    pub max_velocity: f64,
    /// Turn rate cap in force
    pub max_turn_rate: f64,
    /// Gun decoupled from body turns
    pub adjust_gun_for_body_turn: bool,
    /// Radar decoupled from gun turns
    pub adjust_radar_for_gun_turn: bool,
    /// Other agents still in the round
    pub others: usize,
    /// Arena width
    pub arena_width: f64,
    /// Arena height
    pub arena_height: f64,
}

impl AgentStatus {
    /// Copies the status of `body` out of `world`.
    #[must_use]
    pub fn capture(body: &AgentBody, world: &WorldState) -> Self {
        let others = world
            .agents()
            .filter(|a| a.id != body.id && a.is_alive())
            .count();
        Self {
            id: body.id,
            name: body.name.clone(),
            team: body.team,
            round: world.round(),
            turn: world.turn(),
            position: body.position,
            body_heading: body.body_heading,
            gun_heading: body.gun_heading,
            radar_heading: body.radar_heading,
            velocity: body.velocity,
            energy: body.energy,
            gun_heat: body.gun_heat,
            lifecycle: body.lifecycle,
            distance_remaining: body.movement.distance_remaining,
            body_turn_remaining: body.movement.body_turn_remaining,
            gun_turn_remaining: body.movement.gun_turn_remaining,
            radar_turn_remaining: body.movement.radar_turn_remaining,
            max_velocity: body.movement.max_velocity,
            max_turn_rate: body.movement.max_turn_rate,
            adjust_gun_for_body_turn: body.movement.adjust_gun_for_body_turn,
            adjust_radar_for_gun_turn: body.movement.adjust_radar_for_gun_turn,
            others,
            arena_width: world.bounds().max.x,
            arena_height: world.bounds().max.y,
        }
    }

    /// Returns true while the agent takes part in the round.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.lifecycle == Lifecycle::Active
    }
}

/// A projectile as recorded for replay and rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectileSnapshot {
    /// Identifier
    pub id: ProjectileId,
    /// Who fired it
    pub owner: AgentId,
    /// Bullet or mine
    pub kind: ProjectileKind,
    /// State at the end of the turn
    pub state: ProjectileState,
    /// Clamped power
    pub power: f64,
    /// Direction of travel
    pub heading: f64,
    /// Physics position (detection point after a hit)
    pub position: DVec2,
    /// Where the projectile should be drawn
    pub display_point: DVec2,
    /// Agent it hit
    pub victim: Option<AgentId>,
}

impl ProjectileSnapshot {
    /// Copies a projectile, resolving its display point against `world`.
    #[must_use]
    pub fn capture(projectile: &Projectile, world: &WorldState) -> Self {
        let victim_position = projectile
            .victim
            .and_then(|id| world.agent(id))
            .map(|a| a.position);
        Self {
            id: projectile.id,
            owner: projectile.owner,
            kind: projectile.kind,
            state: projectile.state(),
            power: projectile.power,
            heading: projectile.heading,
            position: projectile.position,
            display_point: projectile.display_point(victim_position),
            victim: projectile.victim,
        }
    }
}

/// Everything that happened in one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnSnapshot {
    /// Round number
    pub round: u32,
    /// Turn within the round
    pub turn: u64,
    /// Every agent, in ID order
    pub agents: Vec<AgentStatus>,
    /// Every projectile still in the world, in ID order
    pub projectiles: Vec<ProjectileSnapshot>,
    /// Events raised this turn, in the order they were raised
    pub events: Vec<(AgentId, EventEnvelope)>,
}

impl TurnSnapshot {
    /// Captures the world plus this turn's events.
    #[must_use]
    pub fn capture(world: &WorldState, events: Vec<(AgentId, EventEnvelope)>) -> Self {
        Self {
            round: world.round(),
            turn: world.turn(),
            agents: world
                .agents()
                .map(|a| AgentStatus::capture(a, world))
                .collect(),
            projectiles: world
                .projectiles()
                .map(|p| ProjectileSnapshot::capture(p, world))
                .collect(),
            events,
        }
    }

    /// Looks up one agent's status.
    #[must_use]
    pub fn agent(&self, id: AgentId) -> Option<&AgentStatus> {
        self.agents.iter().find(|a| a.id == id)
    }

    /// Serializes the snapshot as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
