//! End-to-end scenarios.
//!
//! The first three drive a [`TurnPipeline`] directly with hand-written
//! intents; the last one runs real agent threads through the
//! [`TurnScheduler`].

use std::collections::BTreeMap;
use std::f64::consts::FRAC_PI_2;

use glam::DVec2;

use crate::entity::{AgentId, Lifecycle, ProjectileState};
use crate::event::AgentEvent;
use crate::intent::Intent;
use crate::pipeline::TurnPipeline;
use crate::rules;
use crate::scheduler::TurnScheduler;

use super::helpers::{crashing_brain, fast_config, idle_brain, spec, TestBed};
use super::init_tracing;

fn intents(entries: &[(u64, Intent)]) -> BTreeMap<AgentId, Intent> {
    entries
        .iter()
        .map(|(id, intent)| (AgentId::new(*id), intent.clone()))
        .collect()
}

// =============================================================================
// Walls
// =============================================================================

#[test]
fn agent_driving_into_wall_stops_once() {
    let mut bed = TestBed::arena(120.0, 600.0);
    bed.add_agent(1, DVec2::new(100.0, 100.0), 0.0);
    bed.add_agent(2, DVec2::new(60.0, 500.0), FRAC_PI_2);
    bed.start();
    bed.agent_mut(1).velocity = 5.0;
    let mut pipeline = TurnPipeline::new(&bed.config);

    bed.run_pipeline(&mut pipeline, &intents(&[(1, Intent::new().ahead(100.0))]));
    for _ in 0..5 {
        bed.run_pipeline(&mut pipeline, &BTreeMap::new());
    }

    let body = bed.agent(1);
    assert_eq!(body.position.x, 120.0 - rules::AGENT_HALF_SIZE);
    assert_eq!(body.velocity, 0.0);
    assert!(body.energy < 100.0);
    let walls = bed
        .events_for(AgentId::new(1))
        .into_iter()
        .filter(|e| matches!(e, AgentEvent::HitWall { .. }))
        .count();
    assert_eq!(walls, 1);
}

// =============================================================================
// Rams
// =============================================================================

fn ramming_bed() -> (TestBed, TurnPipeline) {
    let mut bed = TestBed::arena(800.0, 600.0);
    bed.add_agent(1, DVec2::new(100.0, 300.0), 0.0);
    bed.add_agent(2, DVec2::new(150.0, 300.0), 0.0);
    bed.start();
    bed.agent_mut(1).velocity = rules::MAX_VELOCITY;
    let pipeline = TurnPipeline::new(&bed.config);
    (bed, pipeline)
}

#[test]
fn ramming_agent_is_at_fault_and_rolls_back() {
    let (mut bed, mut pipeline) = ramming_bed();

    bed.run_pipeline(&mut pipeline, &intents(&[(1, Intent::new().ahead(100.0))]));
    assert_eq!(bed.agent(1).position.x, 108.0);
    bed.run_pipeline(&mut pipeline, &BTreeMap::new());

    let a = bed.agent(1);
    assert_eq!(a.position.x, 108.0);
    assert_eq!(a.velocity, 0.0);
    assert!((a.energy - (100.0 - rules::RAM_DAMAGE)).abs() < 1e-9);
    assert!((bed.agent(2).energy - (100.0 - rules::RAM_DAMAGE)).abs() < 1e-9);

    let mover = bed.events_for(AgentId::new(1));
    let other = bed.events_for(AgentId::new(2));
    assert!(mover
        .iter()
        .any(|e| matches!(e, AgentEvent::HitAgent { at_fault: true, .. })));
    assert!(other
        .iter()
        .any(|e| matches!(e, AgentEvent::HitAgent { at_fault: false, .. })));
}

#[test]
fn ramming_kill_is_credited() {
    let (mut bed, mut pipeline) = ramming_bed();
    bed.agent_mut(2).energy = 0.5;

    bed.run_pipeline(&mut pipeline, &intents(&[(1, Intent::new().ahead(100.0))]));
    let report = bed.run_pipeline(&mut pipeline, &BTreeMap::new());

    assert_eq!(report.deaths, vec![AgentId::new(2)]);
    assert_eq!(bed.agent(2).lifecycle, Lifecycle::Dead);
    let score = bed.scoring.round_score(AgentId::new(1)).unwrap();
    assert!(score.ram_kill_bonus > 0.0);
    assert!(report
        .log
        .iter()
        .any(|(id, line)| *id == AgentId::new(1) && line.contains("Ram bonus for killing agent2")));
    assert!(report.decided);
    assert!(bed.agent(1).winner);
}

// =============================================================================
// Projectiles
// =============================================================================

#[test]
fn power_three_bullet_hits_moving_victim() {
    let mut bed = TestBed::arena(800.0, 600.0);
    bed.add_agent(1, DVec2::new(100.0, 300.0), 0.0);
    bed.add_agent(2, DVec2::new(150.0, 300.0), FRAC_PI_2);
    bed.start();
    bed.agent_mut(1).gun_heat = 0.0;
    let mut pipeline = TurnPipeline::new(&bed.config);

    let report = bed.run_pipeline(
        &mut pipeline,
        &intents(&[
            (1, Intent::new().fire(3.0)),
            (2, Intent::new().ahead(100.0)),
        ]),
    );
    assert_eq!(report.fired.len(), 1);
    let shot = report.fired[0];
    assert_eq!(bed.world.projectile(shot).unwrap().speed(), rules::bullet_speed(3.0));

    bed.run_pipeline(&mut pipeline, &BTreeMap::new());
    bed.run_pipeline(&mut pipeline, &BTreeMap::new());

    let victim = bed.agent(2);
    assert!((victim.energy - (100.0 - rules::bullet_damage(3.0))).abs() < 1e-9);
    let owner = bed.agent(1);
    assert!((owner.energy - (100.0 - 3.0 + rules::bullet_hit_bonus(3.0))).abs() < 1e-9);

    let p = bed.world.projectile(shot).unwrap();
    assert_eq!(p.state(), ProjectileState::HitVictim);
    assert_eq!(p.victim, Some(AgentId::new(2)));
    let display = p.display_point(Some(victim.position));
    assert_ne!(display, p.position);
    assert!((display.y - p.position.y - 3.0).abs() < 1e-9);

    let hits = bed
        .events_for(AgentId::new(2))
        .into_iter()
        .filter(|e| matches!(e, AgentEvent::HitByProjectile { .. }))
        .count();
    assert_eq!(hits, 1);
}

// =============================================================================
// Crashing agents
// =============================================================================

#[test]
fn crashing_agent_dies_and_others_continue() {
    init_tracing();
    let agents = vec![
        spec("steady", idle_brain()),
        spec("fragile", crashing_brain(3)),
        spec("calm", idle_brain()),
    ];
    let mut battle = TurnScheduler::new(fast_config(1), agents).unwrap();

    for _ in 0..3 {
        let report = battle.run_turn().unwrap();
        assert!(report.deaths.is_empty());
    }
    let report = battle.run_turn().unwrap();

    let fragile = AgentId::new(2);
    assert_eq!(report.deaths, vec![fragile]);
    assert_eq!(
        battle.world().agent(fragile).unwrap().lifecycle,
        Lifecycle::Dead
    );
    assert!(battle
        .handle(fragile)
        .unwrap()
        .log()
        .iter()
        .any(|line| line.contains("brain failure on turn 3")));

    let woken_before = battle.handle(AgentId::new(1)).unwrap().wakes();
    battle.run_turn().unwrap();
    for id in [AgentId::new(1), AgentId::new(3)] {
        let body = battle.world().agent(id).unwrap();
        assert!(body.is_alive());
        assert_eq!(body.energy, 100.0);
    }
    assert_eq!(battle.handle(AgentId::new(1)).unwrap().wakes(), woken_before + 1);
}
