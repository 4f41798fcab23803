//! Phase 4: agent movement.
//!
//! Each live agent, in the turn order:
//!
//! 1. cools its gun
//! 2. turns body, gun and radar by at most their turn rates
//! 3. accelerates or brakes towards its remaining distance and moves
//! 4. is pushed out of walls and obstacles
//! 5. is checked for rams against every other agent
//!
//! An agent that moved or turned, or asked to scan, is flagged for phase 5.

use tracing::error;

use crate::collision::{obstacle_contact, ram_contact, wall_contact};
use crate::entity::{AgentBody, AgentId};
use crate::error::AgentFault;
use crate::event::AgentEvent;
use crate::geometry::{heading_vector, normal_absolute_angle, BoundingBox};
use crate::rules;
use crate::scoring::KillBasis;
use crate::world::WorldState;

use super::{Phase, ResolveContext, Resolver};

/// Speeds below this count as stopped when leaving overdrive.
const STOPPED: f64 = 0.00001;

/// Moves agents and applies wall and ram collisions.
#[derive(Debug, Clone, Copy, Default)]
pub struct MovementResolver;

impl MovementResolver {
    /// Creates the resolver.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Resolver for MovementResolver {
    fn phase(&self) -> Phase {
        Phase::Movement
    }

    fn resolve(&self, world: &mut WorldState, ctx: &mut ResolveContext<'_>) {
        let bounds = *world.bounds();
        let obstacles = world.obstacles().to_vec();
        let order = ctx.order;
        for &id in order {
            let moved = match world.agent_mut(id) {
                Some(body) if body.is_alive() => {
                    step_body(body, ctx.gun_cooling_rate);
                    hit_walls(body, &bounds, &obstacles, ctx);
                    true
                }
                _ => false,
            };
            if !moved {
                continue;
            }
            ram(world, ctx, id);
            if let Some(body) = world.agent_mut(id) {
                finish(body, ctx);
            }
        }
    }
}

// =============================================================================
// Kinematics
// =============================================================================

fn step_body(body: &mut AgentBody, cooling: f64) {
    body.gun_heat = (body.gun_heat - cooling).max(0.0);
    body.last_body_heading = body.body_heading;
    body.last_gun_heading = body.gun_heading;
    body.last_radar_heading = body.radar_heading;
    body.last_position = body.position;

    if !body.in_collision {
        turn_body(body);
    }
    turn_gun(body);
    turn_radar(body);
    advance(body);
}

fn turn_body(body: &mut AgentBody) {
    let m = &mut body.movement;
    let rate = rules::turn_rate(body.velocity).min(m.max_turn_rate);
    let delta = m.body_turn_remaining.clamp(-rate, rate);
    if delta == 0.0 {
        return;
    }
    m.body_turn_remaining -= delta;
    body.body_heading = normal_absolute_angle(body.body_heading + delta);
    if !m.adjust_gun_for_body_turn {
        body.gun_heading = normal_absolute_angle(body.gun_heading + delta);
        if !m.adjust_radar_for_gun_turn {
            body.radar_heading = normal_absolute_angle(body.radar_heading + delta);
        }
    }
}

fn turn_gun(body: &mut AgentBody) {
    let m = &mut body.movement;
    let delta = m
        .gun_turn_remaining
        .clamp(-rules::GUN_TURN_RATE, rules::GUN_TURN_RATE);
    if delta == 0.0 {
        return;
    }
    m.gun_turn_remaining -= delta;
    body.gun_heading = normal_absolute_angle(body.gun_heading + delta);
    if !m.adjust_radar_for_gun_turn {
        body.radar_heading = normal_absolute_angle(body.radar_heading + delta);
    }
}

fn turn_radar(body: &mut AgentBody) {
    let m = &mut body.movement;
    let delta = m
        .radar_turn_remaining
        .clamp(-rules::RADAR_TURN_RATE, rules::RADAR_TURN_RATE);
    if delta == 0.0 {
        return;
    }
    m.radar_turn_remaining -= delta;
    body.radar_heading = normal_absolute_angle(body.radar_heading + delta);
}

fn advance(body: &mut AgentBody) {
    let mut distance = body.movement.distance_remaining;
    if distance.is_nan() {
        distance = 0.0;
    }
    body.velocity = rules::next_velocity(body.velocity, distance, body.movement.max_velocity);

    if body.velocity.abs() < STOPPED && body.overdriving {
        distance = 0.0;
        body.overdriving = false;
    }
    if (distance * body.velocity).signum() >= 0.0 {
        body.overdriving = rules::stopping_distance(body.velocity) > distance.abs();
    }

    body.movement.distance_remaining = distance - body.velocity;
    if body.velocity != 0.0 {
        body.position += heading_vector(body.body_heading) * body.velocity;
    }
}

// =============================================================================
// Collisions
// =============================================================================

fn hit_walls(
    body: &mut AgentBody,
    bounds: &BoundingBox,
    obstacles: &[BoundingBox],
    ctx: &mut ResolveContext<'_>,
) {
    let contact = wall_contact(body.position, body.body_heading, bounds).or_else(|| {
        obstacle_contact(body.position, body.last_position, body.body_heading, obstacles)
    });
    let Some(contact) = contact else {
        return;
    };
    let damage = rules::wall_hit_damage(body.velocity);
    body.position = contact.position;
    body.adjust_energy(-damage);
    body.movement.distance_remaining = 0.0;
    body.velocity = 0.0;
    ctx.scoring.score_wall_hit(body.id, damage);
    ctx.events.send(
        body.id,
        ctx.turn,
        AgentEvent::HitWall {
            bearing: contact.bearing,
        },
    );
}

fn ram(world: &mut WorldState, ctx: &mut ResolveContext<'_>, id: AgentId) {
    if let Some(body) = world.agent_mut(id) {
        body.in_collision = false;
    }
    let order = ctx.order;
    for &other_id in order {
        let (Some(mover), Some(other)) = (world.agent(id), world.agent(other_id)) else {
            continue;
        };
        let Some(contact) = ram_contact(mover, other) else {
            continue;
        };
        let teammates = mover.is_teammate(other);
        let other_name = other.name.clone();

        let mover_energy = match world.agent_mut(id) {
            Some(mover) => {
                mover.position -= contact.displacement;
                mover.velocity = 0.0;
                mover.movement.distance_remaining = 0.0;
                mover.in_collision = true;
                mover.adjust_energy(-rules::RAM_DAMAGE);
                mover.energy
            }
            None => continue,
        };
        let (other_energy, killed) = match world.agent_mut(other_id) {
            Some(other) => {
                other.adjust_energy(-rules::RAM_DAMAGE);
                let killed = other.energy <= 0.0 && other.kill();
                (other.energy, killed)
            }
            None => continue,
        };
        ctx.activity.record_loss(rules::RAM_DAMAGE);
        ctx.activity.record_loss(rules::RAM_DAMAGE);

        if !teammates {
            ctx.scoring.score_ram_damage(id, other_id);
        }
        if killed {
            ctx.deaths.push(other_id);
            if !teammates {
                let bonus = ctx.scoring.score_kill(id, other_id, KillBasis::Ram);
                if bonus > 0.0 {
                    ctx.log_line(id, format!("SYSTEM: Ram bonus for killing {other_name}: {bonus:.0}"));
                }
            }
        }

        ctx.events.send(
            id,
            ctx.turn,
            AgentEvent::HitAgent {
                other: other_id,
                bearing: contact.bearing,
                other_energy,
                at_fault: true,
            },
        );
        ctx.events.send(
            other_id,
            ctx.turn,
            AgentEvent::HitAgent {
                other: id,
                bearing: contact.other_bearing,
                other_energy: mover_energy,
                at_fault: false,
            },
        );
    }
}

fn finish(body: &mut AgentBody, ctx: &mut ResolveContext<'_>) {
    #[allow(clippy::float_cmp)]
    let moved = body.last_body_heading != body.body_heading
        || body.last_gun_heading != body.gun_heading
        || body.last_radar_heading != body.radar_heading
        || body.last_position != body.position;
    body.scan_pending = body.movement.scan_requested || moved;
    body.movement.scan_requested = false;

    if let Some(field) = body.invalid_field() {
        error!(agent = %body.id, turn = ctx.turn, field, "non-finite agent state, halting");
        body.halt();
        ctx.halts.push((body.id, AgentFault::InvalidState { field }));
        return;
    }

    if ctx.zap > 0.0 && body.energy > 0.0 {
        body.adjust_energy(-ctx.zap);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::helpers::TestBed;
    use glam::DVec2;
    use std::f64::consts::PI;

    mod kinematics_tests {
        use super::*;

        #[test]
        fn accelerates_one_per_turn() {
            let mut bed = TestBed::arena(800.0, 600.0);
            bed.add_agent(1, DVec2::new(100.0, 300.0), 0.0);
            bed.start();
            bed.agent_mut(1).movement.distance_remaining = 1000.0;

            for expected in [1.0, 2.0, 3.0] {
                bed.run(&MovementResolver::new());
                assert_eq!(bed.agent(1).velocity, expected);
            }
            assert_eq!(bed.agent(1).position, DVec2::new(106.0, 300.0));
        }

        #[test]
        fn stops_exactly_on_target() {
            let mut bed = TestBed::arena(800.0, 600.0);
            bed.add_agent(1, DVec2::new(100.0, 300.0), 0.0);
            bed.start();
            bed.agent_mut(1).movement.distance_remaining = 100.0;

            for _ in 0..40 {
                bed.run(&MovementResolver::new());
            }
            let body = bed.agent(1);
            assert_eq!(body.velocity, 0.0);
            assert!((body.position.x - 200.0).abs() < 1e-9);
        }

        #[test]
        fn body_turn_is_rate_limited_and_carries_gun() {
            let mut bed = TestBed::arena(800.0, 600.0);
            bed.add_agent(1, DVec2::new(100.0, 300.0), 0.0);
            bed.start();
            bed.agent_mut(1).movement.body_turn_remaining = PI / 2.0;

            bed.run(&MovementResolver::new());

            let body = bed.agent(1);
            assert!((body.body_heading - rules::MAX_TURN_RATE).abs() < 1e-12);
            assert!((body.gun_heading - rules::MAX_TURN_RATE).abs() < 1e-12);
            assert!(body.scan_pending);
        }

        #[test]
        fn gun_cools_each_turn() {
            let mut bed = TestBed::arena(800.0, 600.0);
            bed.add_agent(1, DVec2::new(100.0, 300.0), 0.0);
            bed.start();
            bed.run(&MovementResolver::new());
            assert!((bed.agent(1).gun_heat - 2.9).abs() < 1e-12);
            assert!(!bed.agent(1).scan_pending);
        }
    }

    mod wall_tests {
        use super::*;

        #[test]
        fn wall_stops_and_damages() {
            let mut bed = TestBed::arena(120.0, 600.0);
            bed.add_agent(1, DVec2::new(100.0, 300.0), 0.0);
            bed.start();
            {
                let body = bed.agent_mut(1);
                body.velocity = 5.0;
                body.movement.distance_remaining = 100.0;
            }

            bed.run(&MovementResolver::new());

            let body = bed.agent(1);
            assert_eq!(body.position.x, 102.0);
            assert_eq!(body.velocity, 0.0);
            assert_eq!(body.movement.distance_remaining, 0.0);
            assert!((body.energy - 98.0).abs() < 1e-12);
            let events = bed.events_for(AgentId::new(1));
            assert!(matches!(events.as_slice(), [AgentEvent::HitWall { .. }]));
        }
    }

    mod ram_tests {
        use super::*;

        #[test]
        fn at_fault_mover_rolls_back() {
            let mut bed = TestBed::arena(800.0, 600.0);
            bed.add_agent(1, DVec2::new(100.0, 300.0), 0.0);
            bed.add_agent(2, DVec2::new(140.0, 300.0), 0.0);
            bed.start();
            {
                let body = bed.agent_mut(1);
                body.velocity = 7.0;
                body.movement.distance_remaining = 100.0;
            }

            bed.run(&MovementResolver::new());

            let a = bed.agent(1);
            assert_eq!(a.position, DVec2::new(100.0, 300.0));
            assert_eq!(a.velocity, 0.0);
            assert!(a.in_collision);
            assert!((a.energy - 99.4).abs() < 1e-12);
            assert!((bed.agent(2).energy - 99.4).abs() < 1e-12);

            let mover = bed.events_for(AgentId::new(1));
            let other = bed.events_for(AgentId::new(2));
            assert!(matches!(mover[0], AgentEvent::HitAgent { at_fault: true, .. }));
            assert!(matches!(other[0], AgentEvent::HitAgent { at_fault: false, .. }));
        }

        #[test]
        fn ram_kill_is_credited() {
            let mut bed = TestBed::arena(800.0, 600.0);
            bed.add_agent(1, DVec2::new(100.0, 300.0), 0.0);
            bed.add_agent(2, DVec2::new(140.0, 300.0), 0.0);
            bed.start();
            bed.agent_mut(1).velocity = 7.0;
            bed.agent_mut(1).movement.distance_remaining = 100.0;
            bed.agent_mut(2).energy = 0.5;

            let outcome = bed.run(&MovementResolver::new());

            assert_eq!(outcome.deaths, vec![AgentId::new(2)]);
            let score = bed.scoring.round_score(AgentId::new(1)).unwrap();
            assert!(score.ram_kill_bonus > 0.0);
        }
    }

    mod fault_tests {
        use super::*;

        #[test]
        fn nan_heading_halts_agent() {
            let mut bed = TestBed::arena(800.0, 600.0);
            bed.add_agent(1, DVec2::new(100.0, 300.0), 0.0);
            bed.start();
            bed.agent_mut(1).body_heading = f64::NAN;

            let outcome = bed.run(&MovementResolver::new());

            assert!(bed.agent(1).is_halted());
            assert_eq!(
                outcome.halts,
                vec![(AgentId::new(1), AgentFault::InvalidState { field: "body_heading" })]
            );
        }
    }
}
