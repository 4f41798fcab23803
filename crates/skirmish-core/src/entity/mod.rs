//! Entities that live in the arena.
//!
//! This module provides the identifiers and records the scheduler mutates:
//! - [`AgentId`], [`ProjectileId`], [`TeamId`]: typed identifiers
//! - [`Capabilities`]: the tier flags of a combatant
//! - [`AgentBody`]: the physical state of a combatant
//! - [`Projectile`]: a bullet or mine and its state machine
//! - [`Team`]: an ordered group of agents with a leader
//!
//! # Ordering
//!
//! All identifiers order by their numeric value. Storage in
//! [`WorldState`](crate::world::WorldState) is keyed by these IDs in
//! `BTreeMap`s, which makes iteration deterministic.
//!
//! # Example
//!
//! ```
//! use skirmish_core::entity::{AgentId, Capabilities};
//!
//! let id = AgentId::new(3);
//! assert_eq!(id.as_u64(), 3);
//! assert_eq!(id.to_string(), "agent:3");
//!
//! let caps = Capabilities::ADVANCED | Capabilities::TEAM;
//! assert!(caps.has_radar());
//! ```

mod agent;
mod projectile;
mod team;

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

pub use agent::{AgentBody, Lifecycle, MovementState};
pub use projectile::{Projectile, ProjectileKind, ProjectileState};
pub use team::Team;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(u64);

        impl $name {
            /// Creates an identifier from a raw value.
            #[must_use]
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Returns the raw value of this identifier.
            #[must_use]
            pub const fn as_u64(self) -> u64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self::new(id)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

id_type!(
    /// Identifier of a combatant. Stable across rounds.
    AgentId,
    "agent"
);

id_type!(
    /// Identifier of a projectile. Unique within a battle.
    ProjectileId,
    "projectile"
);

id_type!(
    /// Identifier of a team.
    TeamId,
    "team"
);

bitflags! {
    /// Capability tier of a combatant.
    ///
    /// The scheduler only relies on the minimal contract shared by every
    /// agent; flags adjust starting energy, radar and timeouts.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Capabilities: u8 {
        /// Non-blocking command set; wall hits cost energy.
        const ADVANCED = 1 << 0;
        /// Member of a team.
        const TEAM = 1 << 1;
        /// Team member without a radar and with extra energy.
        const DROID = 1 << 2;
        /// Receives user input events.
        const INTERACTIVE = 1 << 3;
        /// May paint debug graphics; extends its think timeout while painting.
        const PAINTING = 1 << 4;
    }
}

impl Capabilities {
    /// Droids have no radar.
    #[must_use]
    pub const fn has_radar(self) -> bool {
        !self.contains(Self::DROID)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod id_tests {
        use super::*;

        #[test]
        fn ids_order_numerically() {
            assert!(AgentId::new(1) < AgentId::new(2));
            assert!(ProjectileId::new(10) > ProjectileId::new(9));
        }

        #[test]
        fn display_and_debug() {
            assert_eq!(AgentId::new(7).to_string(), "agent:7");
            assert_eq!(format!("{:?}", TeamId::new(2)), "TeamId(2)");
            assert_eq!(ProjectileId::new(4).to_string(), "projectile:4");
        }

        #[test]
        fn conversions() {
            let id: AgentId = 5.into();
            let raw: u64 = id.into();
            assert_eq!(raw, 5);
        }
    }

    mod capability_tests {
        use super::*;

        #[test]
        fn droid_has_no_radar() {
            assert!(Capabilities::empty().has_radar());
            assert!(!(Capabilities::TEAM | Capabilities::DROID).has_radar());
        }

        #[test]
        fn serializes() {
            let caps = Capabilities::ADVANCED | Capabilities::PAINTING;
            let json = serde_json::to_string(&caps).unwrap();
            let back: Capabilities = serde_json::from_str(&json).unwrap();
            assert_eq!(caps, back);
        }
    }
}
