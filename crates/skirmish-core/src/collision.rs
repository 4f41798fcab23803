//! Collision checks.
//!
//! Every function in this module is pure: it reads bodies, projectiles and
//! arena geometry and describes what happened, without mutating anything.
//! The resolvers in [`crate::resolver`] apply the outcomes.
//!
//! | Check | Test |
//! |---|---|
//! | Wall | centre outside the arena shrunk by half an agent |
//! | Obstacle | body box overlaps an obstacle box |
//! | Agent ↔ agent | body boxes overlap and the mover points at the other |
//! | Projectile ↔ agent | travel segment crosses the body box |
//! | Projectile ↔ projectile | `ua`/`ub` segment intersection |

use std::f64::consts::{FRAC_PI_2, PI};

use glam::DVec2;

use crate::entity::{AgentBody, AgentId, Projectile, ProjectileKind};
use crate::geometry::{
    bearing, heading_vector, normal_relative_angle, segment_intersection, BoundingBox,
};
use crate::rules;

/// An agent pushed back out of a wall or obstacle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WallContact {
    /// Corrected centre
    pub position: DVec2,
    /// Bearing of the wall relative to the body heading
    pub bearing: f64,
}

/// Checks an agent centre against the arena walls.
///
/// The body is moved back along its heading so that it touches the wall:
/// when the heading is not axis-aligned, the overshoot on one axis is
/// projected onto the other through the tangent of the heading. The result
/// is finally clamped into the legal area.
///
/// # Returns
///
/// `None` if the body is inside the arena.
#[must_use]
pub fn wall_contact(position: DVec2, heading: f64, bounds: &BoundingBox) -> Option<WallContact> {
    let half = rules::AGENT_HALF_SIZE;
    let min = bounds.min + DVec2::splat(half);
    let max = bounds.max - DVec2::splat(half);

    let mut adjust = DVec2::ZERO;
    let wall_angle;
    if position.x < min.x {
        adjust.x = min.x - position.x;
        wall_angle = PI;
    } else if position.x > max.x {
        adjust.x = max.x - position.x;
        wall_angle = 0.0;
    } else if position.y < min.y {
        adjust.y = min.y - position.y;
        wall_angle = -FRAC_PI_2;
    } else if position.y > max.y {
        adjust.y = max.y - position.y;
        wall_angle = FRAC_PI_2;
    } else {
        return None;
    }

    if heading % FRAC_PI_2 != 0.0 {
        let tan = heading.tan();
        if adjust.x == 0.0 {
            adjust.x = adjust.y / tan;
        } else if adjust.y == 0.0 {
            adjust.y = adjust.x * tan;
        }
        if !adjust.is_finite() {
            adjust = DVec2::new(
                if adjust.x.is_finite() { adjust.x } else { 0.0 },
                if adjust.y.is_finite() { adjust.y } else { 0.0 },
            );
        }
    }

    let corrected = (position + adjust).clamp(min, max);
    Some(WallContact {
        position: corrected,
        bearing: normal_relative_angle(wall_angle - heading),
    })
}

/// Checks an agent against static obstacles.
///
/// An agent that moved into an obstacle returns to where it started the
/// turn.
#[must_use]
pub fn obstacle_contact(
    position: DVec2,
    last_position: DVec2,
    heading: f64,
    obstacles: &[BoundingBox],
) -> Option<WallContact> {
    let bb = BoundingBox::centered(position, rules::AGENT_SIZE);
    obstacles.iter().find(|o| o.intersects(&bb)).map(|o| WallContact {
        position: last_position,
        bearing: normal_relative_angle(bearing(position, o.center()) - heading),
    })
}

/// A collision in which the mover is at fault.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RamContact {
    /// The agent that was run into
    pub other: AgentId,
    /// Bearing of the other agent relative to the mover's heading
    pub bearing: f64,
    /// Bearing of the mover relative to the other agent's heading
    pub other_bearing: f64,
    /// The mover's displacement this turn, to be rolled back
    pub displacement: DVec2,
}

/// Checks whether `mover` rammed `other`.
///
/// The mover is at fault when it moves forward with the other agent within
/// ±90° of its heading, or backward with the other agent behind it. A
/// collision in which the mover is not at fault is left to the other
/// agent's own check.
#[must_use]
pub fn ram_contact(mover: &AgentBody, other: &AgentBody) -> Option<RamContact> {
    if mover.id == other.id || !other.is_alive() {
        return None;
    }
    if !mover.bounding_box().intersects(&other.bounding_box()) {
        return None;
    }
    let angle = bearing(mover.position, other.position);
    let relative = normal_relative_angle(angle - mover.body_heading);
    let ahead = relative > -FRAC_PI_2 && relative < FRAC_PI_2;
    let at_fault = (mover.velocity > 0.0 && ahead) || (mover.velocity < 0.0 && !ahead);
    if !at_fault {
        return None;
    }
    Some(RamContact {
        other: other.id,
        bearing: relative,
        other_bearing: normal_relative_angle(PI + angle - other.body_heading),
        displacement: heading_vector(mover.body_heading) * mover.velocity,
    })
}

/// Returns true if a bullet centre touches the arena walls.
#[must_use]
pub fn projectile_hits_wall(position: DVec2, bounds: &BoundingBox) -> bool {
    let r = rules::BULLET_RADIUS;
    position.x - r <= bounds.min.x
        || position.y - r <= bounds.min.y
        || position.x + r >= bounds.max.x
        || position.y + r >= bounds.max.y
}

/// Returns true if a projectile's travel this turn crosses an obstacle.
#[must_use]
pub fn projectile_hits_obstacle(projectile: &Projectile, obstacles: &[BoundingBox]) -> bool {
    obstacles
        .iter()
        .any(|o| o.intersects_segment(projectile.last_position, projectile.position))
}

/// Where a projectile meets an agent body, if it does.
///
/// Bullets are tested with their whole travel segment so that fast bullets
/// cannot pass through a body between two turns. Mines test their trigger
/// box against the body.
#[must_use]
pub fn projectile_agent_hit(projectile: &Projectile, target: &AgentBody) -> Option<DVec2> {
    if target.id == projectile.owner || !target.is_alive() {
        return None;
    }
    let body = target.bounding_box();
    match projectile.kind {
        ProjectileKind::Bullet => body.segment_entry(projectile.last_position, projectile.position),
        ProjectileKind::Mine => projectile
            .trigger_box()
            .intersects(&body)
            .then_some(projectile.position),
    }
}

/// Where two bullets' travel segments cross, if they do.
///
/// Only bullets of different owners collide, and mines never do.
#[must_use]
pub fn projectiles_cross(a: &Projectile, b: &Projectile) -> Option<DVec2> {
    if a.id == b.id
        || a.owner == b.owner
        || a.kind != ProjectileKind::Bullet
        || b.kind != ProjectileKind::Bullet
    {
        return None;
    }
    segment_intersection(a.last_position, a.position, b.last_position, b.position)
}
