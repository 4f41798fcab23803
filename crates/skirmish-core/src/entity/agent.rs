//! Physical state of a combatant.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::geometry::BoundingBox;
use crate::intent::{FireOrder, Intent};
use crate::rules;

use super::{AgentId, Capabilities, TeamId};

/// Where an agent is in its life within the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lifecycle {
    /// Taking part in the round.
    Active,
    /// Killed in this round.
    Dead,
    /// Removed by the engine after a fault; scored inactive.
    Halted,
}

/// Remaining movement commands carried from turn to turn.
///
/// A committed [`Intent`] replaces these values; every turn the movement
/// resolver consumes part of them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovementState {
    /// Signed distance still to travel
    pub distance_remaining: f64,
    /// Body rotation still to perform (radians)
    pub body_turn_remaining: f64,
    /// Gun rotation still to perform (radians)
    pub gun_turn_remaining: f64,
    /// Radar rotation still to perform (radians)
    pub radar_turn_remaining: f64,
    /// User velocity cap
    pub max_velocity: f64,
    /// User body turn rate cap
    pub max_turn_rate: f64,
    /// Keep the gun still while the body turns
    pub adjust_gun_for_body_turn: bool,
    /// Keep the radar still while the gun turns
    pub adjust_radar_for_gun_turn: bool,
    /// Scan this turn even without moving
    pub scan_requested: bool,
}

impl Default for MovementState {
    fn default() -> Self {
        Self {
            distance_remaining: 0.0,
            body_turn_remaining: 0.0,
            gun_turn_remaining: 0.0,
            radar_turn_remaining: 0.0,
            max_velocity: rules::MAX_VELOCITY,
            max_turn_rate: rules::MAX_TURN_RATE,
            adjust_gun_for_body_turn: false,
            adjust_radar_for_gun_turn: false,
            scan_requested: false,
        }
    }
}

/// A combatant's body as the scheduler sees it.
///
/// Only the scheduler thread ever holds a mutable reference to an
/// `AgentBody`; agent threads see an [`AgentStatus`](crate::snapshot::AgentStatus)
/// copy instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentBody {
    /// Stable identifier
    pub id: AgentId,
    /// Display name
    pub name: String,
    /// Team membership
    pub team: Option<TeamId>,
    /// Capability tier
    pub capabilities: Capabilities,
    /// True for the first member of a team
    pub is_leader: bool,
    /// Centre of the body
    pub position: DVec2,
    /// Centre at the start of this turn's move
    pub last_position: DVec2,
    /// Body heading
    pub body_heading: f64,
    /// Gun heading
    pub gun_heading: f64,
    /// Radar heading
    pub radar_heading: f64,
    /// Body heading before this turn's move
    pub last_body_heading: f64,
    /// Gun heading before this turn's move
    pub last_gun_heading: f64,
    /// Radar heading before this turn's move
    pub last_radar_heading: f64,
    /// Signed velocity along the body heading
    pub velocity: f64,
    /// Energy, never negative
    pub energy: f64,
    /// Gun heat; the gun can fire at zero
    pub gun_heat: f64,
    /// Alive, dead or halted
    pub lifecycle: Lifecycle,
    /// Won the current round
    pub winner: bool,
    /// Remaining movement commands
    pub movement: MovementState,
    /// Rammed another agent last turn; skips one heading update
    pub in_collision: bool,
    /// Braking distance exceeds what is left to travel
    pub overdriving: bool,
    /// Scan triggered by movement or request this turn
    pub scan_pending: bool,
}

impl AgentBody {
    /// Creates an agent at the origin with full starting energy.
    #[must_use]
    pub fn new(
        id: AgentId,
        name: impl Into<String>,
        capabilities: Capabilities,
        team: Option<TeamId>,
        is_leader: bool,
    ) -> Self {
        let mut body = Self {
            id,
            name: name.into(),
            team,
            capabilities,
            is_leader,
            position: DVec2::ZERO,
            last_position: DVec2::ZERO,
            body_heading: 0.0,
            gun_heading: 0.0,
            radar_heading: 0.0,
            last_body_heading: 0.0,
            last_gun_heading: 0.0,
            last_radar_heading: 0.0,
            velocity: 0.0,
            energy: 0.0,
            gun_heat: 0.0,
            lifecycle: Lifecycle::Active,
            winner: false,
            movement: MovementState::default(),
            in_collision: false,
            overdriving: false,
            scan_pending: false,
        };
        body.reset(DVec2::ZERO, 0.0);
        body
    }

    /// Energy this agent starts every round with.
    #[must_use]
    pub fn starting_energy(&self) -> f64 {
        let mut energy = rules::INITIAL_ENERGY;
        if self.is_leader {
            energy += rules::LEADER_BONUS_ENERGY;
        }
        if self.capabilities.contains(Capabilities::DROID) {
            energy += rules::DROID_BONUS_ENERGY;
        }
        energy
    }

    /// Puts the agent back into its round-start state at `position`.
    pub fn reset(&mut self, position: DVec2, heading: f64) {
        self.position = position;
        self.last_position = position;
        self.body_heading = heading;
        self.gun_heading = heading;
        self.radar_heading = heading;
        self.last_body_heading = heading;
        self.last_gun_heading = heading;
        self.last_radar_heading = heading;
        self.velocity = 0.0;
        self.energy = self.starting_energy();
        self.gun_heat = rules::INITIAL_GUN_HEAT;
        self.lifecycle = Lifecycle::Active;
        self.winner = false;
        self.movement = MovementState::default();
        self.in_collision = false;
        self.overdriving = false;
        self.scan_pending = false;
    }

    /// Returns true while the agent takes part in the round.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.lifecycle == Lifecycle::Active
    }

    /// Returns true if the agent was halted by the engine.
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.lifecycle == Lifecycle::Halted
    }

    /// Bounding box at the current position.
    #[must_use]
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::centered(self.position, rules::AGENT_SIZE)
    }

    /// Adds `delta` to the energy, flooring at zero.
    ///
    /// Energy below [`rules::ENERGY_EPSILON`] snaps to zero and cancels any
    /// remaining travel.
    pub fn adjust_energy(&mut self, delta: f64) {
        self.energy += delta;
        if self.energy < rules::ENERGY_EPSILON {
            self.energy = 0.0;
            self.movement.distance_remaining = 0.0;
        }
    }

    /// Marks the agent dead. Returns false if it was not alive.
    pub fn kill(&mut self) -> bool {
        if !self.is_alive() {
            return false;
        }
        self.lifecycle = Lifecycle::Dead;
        self.velocity = 0.0;
        self.movement.distance_remaining = 0.0;
        true
    }

    /// Marks the agent halted. A dead agent stays dead.
    pub fn halt(&mut self) {
        if self.lifecycle == Lifecycle::Active {
            self.lifecycle = Lifecycle::Halted;
            self.velocity = 0.0;
        }
    }

    /// Returns true if teammates with `other`.
    #[must_use]
    pub fn is_teammate(&self, other: &Self) -> bool {
        self.team.is_some() && self.team == other.team
    }

    /// Replaces the movement commands with a committed intent.
    ///
    /// # Returns
    ///
    /// The fire order carried by the intent, if any.
    pub fn commit(&mut self, intent: &Intent) -> Option<FireOrder> {
        self.movement = MovementState {
            distance_remaining: intent.distance,
            body_turn_remaining: intent.body_turn,
            gun_turn_remaining: intent.gun_turn,
            radar_turn_remaining: if self.capabilities.has_radar() {
                intent.radar_turn
            } else {
                0.0
            },
            max_velocity: intent.max_velocity.clamp(0.0, rules::MAX_VELOCITY),
            max_turn_rate: intent.max_turn_rate.clamp(0.0, rules::MAX_TURN_RATE),
            adjust_gun_for_body_turn: intent.adjust_gun_for_body_turn,
            adjust_radar_for_gun_turn: intent.adjust_radar_for_gun_turn,
            scan_requested: intent.scan && self.capabilities.has_radar(),
        };
        intent.fire
    }

    /// Name of the first non-finite physical field, if any.
    #[must_use]
    pub fn invalid_field(&self) -> Option<&'static str> {
        if !self.position.is_finite() {
            Some("position")
        } else if !self.body_heading.is_finite() {
            Some("body_heading")
        } else if !self.gun_heading.is_finite() {
            Some("gun_heading")
        } else if !self.radar_heading.is_finite() {
            Some("radar_heading")
        } else if !self.velocity.is_finite() {
            Some("velocity")
        } else if !self.energy.is_finite() {
            Some("energy")
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(caps: Capabilities, leader: bool) -> AgentBody {
        AgentBody::new(AgentId::new(1), "tester", caps, None, leader)
    }

    mod energy_tests {
        use super::*;

        #[test]
        fn starting_energy_by_tier() {
            assert_eq!(body(Capabilities::empty(), false).energy, 100.0);
            assert_eq!(body(Capabilities::TEAM, true).energy, 200.0);
            assert_eq!(body(Capabilities::TEAM | Capabilities::DROID, false).energy, 120.0);
        }

        #[test]
        fn energy_floors_at_zero() {
            let mut b = body(Capabilities::empty(), false);
            b.movement.distance_remaining = 50.0;
            b.adjust_energy(-500.0);
            assert_eq!(b.energy, 0.0);
            assert_eq!(b.movement.distance_remaining, 0.0);
        }

        #[test]
        fn tiny_energy_snaps_to_zero() {
            let mut b = body(Capabilities::empty(), false);
            b.adjust_energy(-99.995);
            assert_eq!(b.energy, 0.0);
        }
    }

    mod lifecycle_tests {
        use super::*;

        #[test]
        fn kill_only_once() {
            let mut b = body(Capabilities::empty(), false);
            assert!(b.kill());
            assert!(!b.kill());
            assert_eq!(b.lifecycle, Lifecycle::Dead);
        }

        #[test]
        fn halt_does_not_resurrect() {
            let mut b = body(Capabilities::empty(), false);
            b.kill();
            b.halt();
            assert_eq!(b.lifecycle, Lifecycle::Dead);
        }

        #[test]
        fn reset_restores_round_state() {
            let mut b = body(Capabilities::empty(), false);
            b.kill();
            b.adjust_energy(-40.0);
            b.reset(DVec2::new(50.0, 60.0), 1.0);
            assert!(b.is_alive());
            assert_eq!(b.energy, 100.0);
            assert_eq!(b.gun_heat, rules::INITIAL_GUN_HEAT);
            assert_eq!(b.position, DVec2::new(50.0, 60.0));
        }
    }

    mod commit_tests {
        use super::*;

        #[test]
        fn commit_replaces_movement_and_returns_fire() {
            let mut b = body(Capabilities::empty(), false);
            let intent = Intent::new().ahead(100.0).turn_body(0.5).fire(2.0);
            let fire = b.commit(&intent);
            assert_eq!(b.movement.distance_remaining, 100.0);
            assert_eq!(b.movement.body_turn_remaining, 0.5);
            assert!(fire.is_some());
        }

        #[test]
        fn droid_radar_commands_are_ignored() {
            let mut b = body(Capabilities::TEAM | Capabilities::DROID, false);
            b.commit(&Intent::new().turn_radar(1.0).scan());
            assert_eq!(b.movement.radar_turn_remaining, 0.0);
            assert!(!b.movement.scan_requested);
        }

        #[test]
        fn caps_are_clamped() {
            let mut b = body(Capabilities::empty(), false);
            let mut intent = Intent::new();
            intent.max_velocity = 20.0;
            b.commit(&intent);
            assert_eq!(b.movement.max_velocity, rules::MAX_VELOCITY);
        }
    }
}
