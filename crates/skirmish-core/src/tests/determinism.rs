//! Determinism verification tests.
//!
//! These tests verify that a battle produces identical results when:
//! - Started with the same seed
//! - Given the same recorded intents
//!
//! This is critical for:
//! - Replaying a recorded battle
//! - Reproducing a bug report

use std::collections::BTreeMap;
use std::sync::Arc;

use glam::DVec2;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::config::BattleConfig;
use crate::entity::AgentId;
use crate::intent::Intent;
use crate::pipeline::TurnPipeline;
use crate::recorder::MemoryRecorder;
use crate::scheduler::TurnScheduler;

use super::helpers::{aggressive_brain, brain, spec, TestBed};

/// Per-turn intents for four agents, generated once and replayed.
fn recorded_intents(seed: u64, turns: usize) -> Vec<BTreeMap<AgentId, Intent>> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..turns)
        .map(|_| {
            (1..=4)
                .map(|id| {
                    let mut intent = Intent::new()
                        .ahead(rng.gen_range(-150.0..150.0))
                        .turn_body(rng.gen_range(-1.0..1.0))
                        .turn_gun(rng.gen_range(-1.0..1.0))
                        .turn_radar(rng.gen_range(-1.0..1.0));
                    if rng.gen_bool(0.3) {
                        intent = intent.fire(rng.gen_range(0.1..3.0));
                    }
                    (AgentId::new(id), intent)
                })
                .collect()
        })
        .collect()
}

/// Bit patterns of every agent's position and energy after each turn.
type Trace = Vec<Vec<(u64, u64, u64)>>;

/// Replays `intents` through a fresh pipeline with a seeded shuffle.
fn replay(seed: u64, intents: &[BTreeMap<AgentId, Intent>]) -> Trace {
    let mut bed = TestBed::arena(400.0, 400.0);
    bed.add_agent(1, DVec2::new(60.0, 60.0), 0.0);
    bed.add_agent(2, DVec2::new(340.0, 60.0), 1.5);
    bed.add_agent(3, DVec2::new(60.0, 340.0), 3.0);
    bed.add_agent(4, DVec2::new(340.0, 340.0), 4.5);
    bed.start();
    for id in 1..=4 {
        bed.agent_mut(id).gun_heat = 0.0;
    }

    let mut pipeline = TurnPipeline::new(&bed.config);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut trace = Vec::with_capacity(intents.len());
    for turn in intents {
        let mut order = bed.world.agent_ids();
        order.shuffle(&mut rng);
        pipeline.run_turn(
            &mut bed.world,
            turn,
            &order,
            &mut bed.events,
            &mut bed.scoring,
        );
        trace.push(
            bed.world
                .agents()
                .map(|a| (a.position.x.to_bits(), a.position.y.to_bits(), a.energy.to_bits()))
                .collect(),
        );
    }
    trace
}

#[test]
fn same_seed_and_intents_are_bit_identical() {
    let intents = recorded_intents(11, 300);
    let first = replay(42, &intents);
    let second = replay(42, &intents);
    assert_eq!(first, second);
}

#[test]
fn different_intents_diverge() {
    let first = replay(42, &recorded_intents(11, 100));
    let second = replay(42, &recorded_intents(12, 100));
    assert_ne!(first, second);
}

#[test]
fn recorded_battles_match() {
    let run = || {
        let recorder = Arc::new(MemoryRecorder::new());
        let config = BattleConfig {
            num_rounds: 2,
            turn_budget_ms: 2000,
            end_grace_turns: 2,
            inactivity_time: 60,
            seed: 5,
            ..BattleConfig::default()
        };
        let agents = vec![
            spec("hunter", aggressive_brain()),
            spec("spinner", brain(|_| Intent::new().turn_body(0.2).ahead(40.0))),
            spec("sitter", brain(|_| Intent::new())),
        ];
        let mut battle = TurnScheduler::new(config, agents)
            .unwrap()
            .with_recorder(recorder.clone());
        let results = battle.run().unwrap();
        (results, recorder.turns())
    };

    let (first_results, first_turns) = run();
    let (second_results, second_turns) = run();

    assert_eq!(first_results, second_results);
    assert_eq!(first_turns.len(), second_turns.len());
    for (a, b) in first_turns.iter().zip(&second_turns) {
        assert_eq!(a.agents, b.agents);
        assert_eq!(a.projectiles, b.projectiles);
    }
}
