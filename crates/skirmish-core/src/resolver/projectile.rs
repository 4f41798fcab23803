//! Phase 3: projectile flight and hits.
//!
//! Projectiles are resolved against the agent positions of the previous
//! turn, before anybody moves. Within a turn the checks run in this order:
//!
//! 1. projectile ↔ projectile (bullets of different owners)
//! 2. projectile ↔ agent, visiting agents in the turn order
//! 3. projectile ↔ wall or obstacle
//!
//! The first hit wins. Projectiles that already hit something spend the
//! following turns exploding and are then removed from the world.

use std::f64::consts::PI;

use glam::DVec2;

use crate::collision::{
    projectile_agent_hit, projectile_hits_obstacle, projectile_hits_wall, projectiles_cross,
};
use crate::entity::{AgentId, ProjectileId, ProjectileKind, ProjectileState};
use crate::event::AgentEvent;
use crate::geometry::normal_relative_angle;
use crate::rules;
use crate::scoring::KillBasis;
use crate::world::WorldState;

use super::{Phase, ResolveContext, Resolver};

/// Moves projectiles and applies their hits.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectileResolver;

impl ProjectileResolver {
    /// Creates the resolver.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Resolver for ProjectileResolver {
    fn phase(&self) -> Phase {
        Phase::Projectiles
    }

    fn resolve(&self, world: &mut WorldState, ctx: &mut ResolveContext<'_>) {
        let ids = flight_order(world, ctx.order);

        for &id in &ids {
            step_explosion(world, id, ctx.turn);
        }

        let flying: Vec<ProjectileId> = ids
            .iter()
            .copied()
            .filter(|&id| world.projectile(id).is_some_and(|p| p.state().is_active()))
            .collect();
        for &id in &flying {
            if let Some(p) = world.projectile_mut(id) {
                p.advance();
            }
        }

        for &id in &flying {
            resolve_flight(world, ctx, id, &flying);
        }

        for &id in &flying {
            if let Some(p) = world.projectile_mut(id) {
                if p.state() == ProjectileState::Armed {
                    p.transition(ProjectileState::Moving, ctx.turn);
                }
            }
        }

        world.remove_inactive();
    }
}

/// Projectiles grouped by their owner's place in the turn order.
fn flight_order(world: &WorldState, order: &[AgentId]) -> Vec<ProjectileId> {
    let rank = |owner: AgentId| order.iter().position(|&a| a == owner).unwrap_or(order.len());
    let mut ids: Vec<(usize, ProjectileId)> =
        world.projectiles().map(|p| (rank(p.owner), p.id)).collect();
    ids.sort_unstable();
    ids.into_iter().map(|(_, id)| id).collect()
}

/// Moves a spent projectile one step through its explosion.
fn step_explosion(world: &mut WorldState, id: ProjectileId, turn: u64) {
    let Some(p) = world.projectile_mut(id) else {
        return;
    };
    if p.state().is_hit() {
        p.transition(ProjectileState::Exploding, turn);
    } else if p.state() == ProjectileState::Exploding {
        p.tick_frame();
        if p.frame() >= p.explosion_frames() {
            p.transition(ProjectileState::Inactive, turn);
        }
    }
}

fn resolve_flight(
    world: &mut WorldState,
    ctx: &mut ResolveContext<'_>,
    id: ProjectileId,
    flying: &[ProjectileId],
) {
    let Some(p) = world.projectile(id).cloned() else {
        return;
    };
    if !p.state().is_active() || p.transitioned_in(ctx.turn) {
        return;
    }

    let crossed = flying.iter().copied().find(|&other| {
        world.projectile(other).is_some_and(|q| {
            q.state().is_active()
                && !q.transitioned_in(ctx.turn)
                && projectiles_cross(&p, q).is_some()
        })
    });
    if let Some(other) = crossed {
        collide_projectiles(world, ctx, id, other);
        return;
    }

    let struck = ctx.order.iter().copied().find_map(|agent| {
        world
            .agent(agent)
            .and_then(|target| projectile_agent_hit(&p, target))
            .map(|point| (agent, point))
    });
    if let Some((victim, point)) = struck {
        hit_agent(world, ctx, id, victim, point);
        return;
    }

    if p.kind == ProjectileKind::Bullet
        && (projectile_hits_wall(p.position, world.bounds())
            || projectile_hits_obstacle(&p, world.obstacles()))
    {
        if let Some(p) = world.projectile_mut(id) {
            p.transition(ProjectileState::HitWall, ctx.turn);
        }
        ctx.events
            .send(p.owner, ctx.turn, AgentEvent::ProjectileMissed { projectile: id });
    }
}

fn collide_projectiles(
    world: &mut WorldState,
    ctx: &mut ResolveContext<'_>,
    a: ProjectileId,
    b: ProjectileId,
) {
    let mut owners = [None, None];
    for (slot, id) in owners.iter_mut().zip([a, b]) {
        if let Some(p) = world.projectile_mut(id) {
            p.roll_back();
            p.transition(ProjectileState::HitProjectile, ctx.turn);
            *slot = Some(p.owner);
        }
    }
    if let [Some(owner_a), Some(owner_b)] = owners {
        ctx.events.send(
            owner_a,
            ctx.turn,
            AgentEvent::ProjectileHitProjectile { projectile: a, other: b },
        );
        ctx.events.send(
            owner_b,
            ctx.turn,
            AgentEvent::ProjectileHitProjectile { projectile: b, other: a },
        );
    }
}

fn hit_agent(
    world: &mut WorldState,
    ctx: &mut ResolveContext<'_>,
    id: ProjectileId,
    victim_id: AgentId,
    point: DVec2,
) {
    let Some(p) = world.projectile(id).cloned() else {
        return;
    };
    let teammates = match (world.agent(p.owner), world.agent(victim_id)) {
        (Some(owner), Some(victim)) => owner.is_teammate(victim),
        _ => false,
    };
    let damage = rules::bullet_damage(p.power);

    let Some(victim) = world.agent_mut(victim_id) else {
        return;
    };
    let before = victim.energy;
    victim.adjust_energy(-damage);
    let dealt = damage.min(before);
    let killed = victim.energy <= 0.0 && victim.kill();
    let victim_energy = victim.energy;
    let victim_position = victim.position;
    let victim_heading = victim.body_heading;
    let victim_name = victim.name.clone();

    ctx.activity.record_loss(damage);
    if !teammates {
        ctx.scoring.score_bullet_damage(p.owner, victim_id, dealt);
    }
    if killed {
        ctx.deaths.push(victim_id);
        if !teammates {
            let bonus = ctx.scoring.score_kill(p.owner, victim_id, KillBasis::Bullet);
            if bonus > 0.0 {
                ctx.log_line(
                    p.owner,
                    format!("SYSTEM: Bonus for killing {victim_name}: {bonus:.0}"),
                );
            }
        }
    }

    if let Some(owner) = world.agent_mut(p.owner) {
        if owner.is_alive() {
            owner.adjust_energy(rules::bullet_hit_bonus(p.power));
        }
    }

    if let Some(proj) = world.projectile_mut(id) {
        proj.position = point;
        proj.victim = Some(victim_id);
        proj.victim_offset = Some(point - victim_position);
        proj.transition(ProjectileState::HitVictim, ctx.turn);
    }

    ctx.events.send(
        victim_id,
        ctx.turn,
        AgentEvent::HitByProjectile {
            projectile: id,
            owner: p.owner,
            power: p.power,
            bearing: normal_relative_angle(p.heading + PI - victim_heading),
        },
    );
    ctx.events.send(
        p.owner,
        ctx.turn,
        AgentEvent::ProjectileHit {
            projectile: id,
            victim: victim_id,
            victim_energy,
        },
    );
}
