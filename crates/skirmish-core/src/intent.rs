//! Committed intents and the single-slot cell that carries them.
//!
//! An agent thread builds an [`Intent`] during its think-cycle and commits it
//! into its [`IntentCell`]. The scheduler takes the cell's content in phase 2
//! of the next turn (swap-and-clear). The cell is the only piece of memory
//! both threads write to.
//!
//! # Example
//!
//! ```
//! use skirmish_core::intent::{Intent, IntentCell};
//!
//! let cell = IntentCell::new();
//! cell.commit(Intent::new().ahead(100.0).fire(1.5));
//! assert!(cell.take().is_some());
//! assert!(cell.take().is_none());
//! ```

use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::entity::ProjectileKind;
use crate::error::AgentFault;
use crate::rules;
use crate::snapshot::AgentStatus;

/// A request to fire this turn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FireOrder {
    /// Requested power; clamped when the projectile is created
    pub power: f64,
    /// Bullet or mine
    pub kind: ProjectileKind,
}

/// The actions an agent wants applied.
///
/// Movement and turn values are *remaining* amounts: they replace whatever
/// the agent had left and are consumed over the following turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    /// Signed distance to travel
    pub distance: f64,
    /// Body rotation (radians, counter-clockwise positive)
    pub body_turn: f64,
    /// Gun rotation
    pub gun_turn: f64,
    /// Radar rotation
    pub radar_turn: f64,
    /// Velocity cap
    pub max_velocity: f64,
    /// Body turn rate cap
    pub max_turn_rate: f64,
    /// Keep the gun still while the body turns
    pub adjust_gun_for_body_turn: bool,
    /// Keep the radar still while the gun turns
    pub adjust_radar_for_gun_turn: bool,
    /// Fire this turn
    pub fire: Option<FireOrder>,
    /// Scan even without moving
    pub scan: bool,
}

impl Default for Intent {
    fn default() -> Self {
        Self::new()
    }
}

impl Intent {
    /// An intent that stands still.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            distance: 0.0,
            body_turn: 0.0,
            gun_turn: 0.0,
            radar_turn: 0.0,
            max_velocity: rules::MAX_VELOCITY,
            max_turn_rate: rules::MAX_TURN_RATE,
            adjust_gun_for_body_turn: false,
            adjust_radar_for_gun_turn: false,
            fire: None,
            scan: false,
        }
    }

    /// An intent that keeps doing whatever the status says is still pending.
    #[must_use]
    pub fn continuing(status: &AgentStatus) -> Self {
        Self {
            distance: status.distance_remaining,
            body_turn: status.body_turn_remaining,
            gun_turn: status.gun_turn_remaining,
            radar_turn: status.radar_turn_remaining,
            max_velocity: status.max_velocity,
            max_turn_rate: status.max_turn_rate,
            adjust_gun_for_body_turn: status.adjust_gun_for_body_turn,
            adjust_radar_for_gun_turn: status.adjust_radar_for_gun_turn,
            fire: None,
            scan: false,
        }
    }

    /// Travel `distance` forward (negative goes backward).
    #[must_use]
    pub const fn ahead(mut self, distance: f64) -> Self {
        self.distance = distance;
        self
    }

    /// Turn the body by `angle`.
    #[must_use]
    pub const fn turn_body(mut self, angle: f64) -> Self {
        self.body_turn = angle;
        self
    }

    /// Turn the gun by `angle`.
    #[must_use]
    pub const fn turn_gun(mut self, angle: f64) -> Self {
        self.gun_turn = angle;
        self
    }

    /// Turn the radar by `angle`.
    #[must_use]
    pub const fn turn_radar(mut self, angle: f64) -> Self {
        self.radar_turn = angle;
        self
    }

    /// Fire a bullet of the given power.
    #[must_use]
    pub const fn fire(mut self, power: f64) -> Self {
        self.fire = Some(FireOrder {
            power,
            kind: ProjectileKind::Bullet,
        });
        self
    }

    /// Drop a mine of the given power.
    #[must_use]
    pub const fn drop_mine(mut self, power: f64) -> Self {
        self.fire = Some(FireOrder {
            power,
            kind: ProjectileKind::Mine,
        });
        self
    }

    /// Request a scan this turn.
    #[must_use]
    pub const fn scan(mut self) -> Self {
        self.scan = true;
        self
    }

    /// Rejects non-finite values.
    ///
    /// Infinite travel is allowed (it means "keep going"); NaN anywhere, or
    /// an infinite turn or power, is a fault.
    ///
    /// # Errors
    ///
    /// Returns [`AgentFault::InvalidState`] naming the first bad field.
    pub fn sanitize(&self) -> Result<(), AgentFault> {
        let checks: [(&'static str, bool); 7] = [
            ("distance", !self.distance.is_nan()),
            ("body_turn", self.body_turn.is_finite()),
            ("gun_turn", self.gun_turn.is_finite()),
            ("radar_turn", self.radar_turn.is_finite()),
            ("max_velocity", !self.max_velocity.is_nan()),
            ("max_turn_rate", !self.max_turn_rate.is_nan()),
            (
                "fire.power",
                self.fire.map_or(true, |order| order.power.is_finite()),
            ),
        ];
        match checks.into_iter().find(|(_, ok)| !ok) {
            Some((field, _)) => Err(AgentFault::InvalidState { field }),
            None => Ok(()),
        }
    }
}

/// Single-producer, single-consumer slot for the latest committed intent.
///
/// A later commit within the same think-cycle overwrites an earlier one;
/// the scheduler sees only the last.
#[derive(Debug, Default)]
pub struct IntentCell {
    slot: Mutex<Option<Intent>>,
}

impl IntentCell {
    /// Creates an empty cell.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an intent, replacing any uncollected one.
    pub fn commit(&self, intent: Intent) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(intent);
    }

    /// Swaps the content out, leaving the cell empty.
    pub fn take(&self) -> Option<Intent> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Drops any uncollected intent.
    pub fn clear(&self) {
        self.take();
    }
}
