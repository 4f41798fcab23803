//! Bullets and mines.
//!
//! # State machine
//!
//! ```text
//! Armed → Moving → { HitWall | HitVictim | HitProjectile } → Exploding → Inactive
//! ```
//!
//! Transitions only move forward (skipping a stage is allowed), and a
//! projectile makes at most one transition per turn. [`Projectile::transition`]
//! enforces both rules, so every resolver that touches a projectile goes
//! through the same gate.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::geometry::{heading_vector, BoundingBox};
use crate::rules;

use super::{AgentId, ProjectileId};

/// What kind of projectile this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectileKind {
    /// Travels along its heading at a power-dependent speed.
    Bullet,
    /// Stays where it was dropped and triggers on contact.
    Mine,
}

/// Lifecycle of a projectile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectileState {
    /// Fired this turn, not yet advanced.
    Armed,
    /// In flight (or, for a mine, live).
    Moving,
    /// Struck a wall or obstacle.
    HitWall,
    /// Struck an agent.
    HitVictim,
    /// Struck another projectile.
    HitProjectile,
    /// Showing its explosion.
    Exploding,
    /// Finished; removed from the world.
    Inactive,
}

impl ProjectileState {
    /// Position of the state in the machine; the three hit states share one.
    #[must_use]
    pub const fn ordinal(self) -> u8 {
        match self {
            Self::Armed => 0,
            Self::Moving => 1,
            Self::HitWall | Self::HitVictim | Self::HitProjectile => 2,
            Self::Exploding => 3,
            Self::Inactive => 4,
        }
    }

    /// Returns true while the projectile can still hit something.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Armed | Self::Moving)
    }

    /// Returns true for the three hit states.
    #[must_use]
    pub const fn is_hit(self) -> bool {
        matches!(self, Self::HitWall | Self::HitVictim | Self::HitProjectile)
    }
}

/// A bullet or mine in the arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projectile {
    /// Identifier
    pub id: ProjectileId,
    /// Agent that fired it
    pub owner: AgentId,
    /// Bullet or mine
    pub kind: ProjectileKind,
    /// Clamped firing power
    pub power: f64,
    /// Direction of travel
    pub heading: f64,
    /// Current position; the detection point once it hits
    pub position: DVec2,
    /// Position at the start of this turn
    pub last_position: DVec2,
    /// Agent it hit, looked up by ID only
    pub victim: Option<AgentId>,
    /// Offset of the hit from the victim's centre at detection time
    pub victim_offset: Option<DVec2>,
    state: ProjectileState,
    frame: u32,
    last_transition: Option<u64>,
}

impl Projectile {
    /// Creates an armed projectile at `position`.
    #[must_use]
    pub fn new(
        id: ProjectileId,
        owner: AgentId,
        kind: ProjectileKind,
        power: f64,
        heading: f64,
        position: DVec2,
    ) -> Self {
        Self {
            id,
            owner,
            kind,
            power: rules::clamp_power(power),
            heading,
            position,
            last_position: position,
            victim: None,
            victim_offset: None,
            state: ProjectileState::Armed,
            frame: 0,
            last_transition: None,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ProjectileState {
        self.state
    }

    /// Frames spent in the current hit/explosion phase.
    #[must_use]
    pub const fn frame(&self) -> u32 {
        self.frame
    }

    /// Distance travelled per turn.
    #[must_use]
    pub fn speed(&self) -> f64 {
        match self.kind {
            ProjectileKind::Bullet => rules::bullet_speed(self.power),
            ProjectileKind::Mine => 0.0,
        }
    }

    /// Returns true if the projectile already changed state during `turn`.
    #[must_use]
    pub fn transitioned_in(&self, turn: u64) -> bool {
        self.last_transition == Some(turn)
    }

    /// Moves to `next` if the machine allows it this turn.
    ///
    /// # Returns
    ///
    /// `false` if `next` is not strictly later than the current state or the
    /// projectile has already transitioned during `turn`.
    pub fn transition(&mut self, next: ProjectileState, turn: u64) -> bool {
        if next.ordinal() <= self.state.ordinal() || self.transitioned_in(turn) {
            return false;
        }
        self.state = next;
        self.frame = 0;
        self.last_transition = Some(turn);
        true
    }

    /// Advances the position by one turn of travel.
    pub fn advance(&mut self) {
        self.last_position = self.position;
        self.position += heading_vector(self.heading) * self.speed();
    }

    /// Moves the projectile back to where it started this turn.
    pub fn roll_back(&mut self) {
        self.position = self.last_position;
    }

    /// Counts one frame of the hit or explosion phase.
    pub fn tick_frame(&mut self) {
        self.frame = self.frame.saturating_add(1);
    }

    /// Frames the explosion lasts.
    #[must_use]
    pub fn explosion_frames(&self) -> u32 {
        if self.victim.is_some() {
            rules::EXPLOSION_FRAMES
        } else {
            rules::SHORT_EXPLOSION_FRAMES
        }
    }

    /// Area in which a mine triggers.
    #[must_use]
    pub fn trigger_box(&self) -> BoundingBox {
        BoundingBox::centered(self.position, rules::mine_trigger_size(self.power))
    }

    /// Where the hit should be drawn.
    ///
    /// For a victim hit this follows the victim: it is the victim's current
    /// position plus the offset recorded at detection time, which differs
    /// from the detection point whenever the victim moved afterwards.
    #[must_use]
    pub fn display_point(&self, victim_position: Option<DVec2>) -> DVec2 {
        match (self.victim_offset, victim_position) {
            (Some(offset), Some(center)) => center + offset,
            _ => self.position,
        }
    }
}
