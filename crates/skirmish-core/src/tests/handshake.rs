//! The wake/yield protocol against real agent threads.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::BattleConfig;
use crate::entity::{AgentId, Lifecycle};
use crate::error::AgentFault;
use crate::event::AgentEvent;
use crate::intent::Intent;
use crate::scheduler::TurnScheduler;

use super::helpers::{brain, counting_brain, fast_config, idle_brain, spec};
use super::init_tracing;

#[test]
fn unresponsive_agent_is_halted_after_k_skips() {
    init_tracing();
    let thinks = Arc::new(AtomicUsize::new(0));
    let stuck = {
        let thinks = Arc::clone(&thinks);
        brain(move |view| {
            thinks.fetch_add(1, Ordering::SeqCst);
            while !view.halt_requested() {
                thread::sleep(Duration::from_millis(1));
            }
            Intent::new()
        })
    };
    let agents = vec![spec("stuck", stuck), spec("fine", idle_brain())];
    let mut battle = TurnScheduler::new(fast_config(1), agents).unwrap();
    let stuck_id = AgentId::new(1);

    // Round start is the first missed wake; turns 1 and 2 find it still thinking.
    battle.run_turn().unwrap();
    assert_eq!(battle.handle(stuck_id).unwrap().consecutive_skips(), 2);
    battle.run_turn().unwrap();
    let handle = battle.handle(stuck_id).unwrap();
    assert_eq!(handle.consecutive_skips(), 3);
    assert!(handle.is_stopped());

    let report = battle.run_turn().unwrap();
    assert_eq!(
        report.halts,
        vec![(stuck_id, AgentFault::Runaway { skips: 3 })]
    );
    assert_eq!(
        battle.world().agent(stuck_id).unwrap().lifecycle,
        Lifecycle::Halted
    );

    battle.run_turn().unwrap();
    let handle = battle.handle(stuck_id).unwrap();
    assert_eq!(handle.wakes(), 1);
    assert_eq!(thinks.load(Ordering::SeqCst), 1);
    let skipped = handle
        .log()
        .iter()
        .filter(|line| line.contains("skipped turn"))
        .count();
    assert_eq!(skipped, 3);
    assert!(handle
        .log()
        .iter()
        .any(|line| line == "SYSTEM: stuck has been halted: not responding after 3 skipped turns"));
}

#[test]
fn abort_drains_grace_turns_and_skips_remaining_rounds() {
    init_tracing();
    let abort_seen = Arc::new(AtomicUsize::new(0));
    let battle_ended = Arc::new(AtomicBool::new(false));
    let watcher = {
        let abort_seen = Arc::clone(&abort_seen);
        let battle_ended = Arc::clone(&battle_ended);
        brain(move |view| {
            if view.abort_requested() {
                abort_seen.fetch_add(1, Ordering::SeqCst);
            }
            if view
                .events
                .iter()
                .any(|e| e.event == AgentEvent::BattleEnded { aborted: true })
            {
                battle_ended.store(true, Ordering::SeqCst);
            }
            Intent::new()
        })
    };
    let config = BattleConfig {
        turn_budget_ms: 2000,
        ..fast_config(3)
    };
    let grace = u64::from(config.end_grace_turns);
    let agents = vec![spec("watcher", watcher), spec("other", idle_brain())];
    let mut battle = TurnScheduler::new(config, agents).unwrap();

    battle.run_turn().unwrap();
    assert_eq!(abort_seen.load(Ordering::SeqCst), 0);
    battle.controller().abort();
    let results = battle.run().unwrap();

    assert!(results.aborted);
    assert_eq!(results.rounds, 1);
    assert_eq!(results.ranking.len(), 2);
    // One normal turn, then the aborting turn plus its grace turns.
    assert_eq!(battle.world().turn(), 2 + grace);
    // Woken after every grace turn and once more at round end.
    assert_eq!(
        u64::try_from(abort_seen.load(Ordering::SeqCst)).unwrap(),
        grace + 1
    );
    assert!(battle_ended.load(Ordering::SeqCst));
    assert!(matches!(
        battle.run_turn(),
        Err(crate::error::EngineError::BattleFinished)
    ));
}

#[test]
fn slow_agent_is_never_woken_while_thinking() {
    let thinks = Arc::new(AtomicUsize::new(0));
    let slow = {
        let thinks = Arc::clone(&thinks);
        brain(move |_| {
            thinks.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(30));
            Intent::new()
        })
    };
    let config = BattleConfig {
        turn_budget_ms: 5,
        max_skipped_turns: 1000,
        ..fast_config(1)
    };
    let agents = vec![spec("slow", slow), spec("fast", idle_brain())];
    let mut battle = TurnScheduler::new(config, agents).unwrap();

    let turns = 40;
    for _ in 0..turns {
        battle.run_turn().unwrap();
    }
    thread::sleep(Duration::from_millis(100));

    let handle = battle.handle(AgentId::new(1)).unwrap();
    assert!(handle.total_skips() > 0);
    assert!(handle.wakes() < turns + 1);
    assert_eq!(
        u64::try_from(thinks.load(Ordering::SeqCst)).unwrap(),
        handle.wakes()
    );
}

#[test]
fn responsive_agents_think_once_per_turn() {
    let thinks = Arc::new(AtomicUsize::new(0));
    let config = BattleConfig {
        turn_budget_ms: 2000,
        ..fast_config(1)
    };
    let agents = vec![
        spec("counted", counting_brain(Arc::clone(&thinks))),
        spec("other", idle_brain()),
    ];
    let mut battle = TurnScheduler::new(config, agents).unwrap();

    for _ in 0..25 {
        battle.run_turn().unwrap();
    }

    // One wake at round start plus one after every turn.
    assert_eq!(thinks.load(Ordering::SeqCst), 26);
    let handle = battle.handle(AgentId::new(1)).unwrap();
    assert_eq!(handle.wakes(), 26);
    assert_eq!(handle.total_skips(), 0);
}

#[test]
fn parallel_think_wakes_everyone() {
    let counters: Vec<Arc<AtomicUsize>> = (0..3).map(|_| Arc::new(AtomicUsize::new(0))).collect();
    let config = BattleConfig {
        parallel_think: true,
        turn_budget_ms: 2000,
        ..fast_config(1)
    };
    let agents = counters
        .iter()
        .enumerate()
        .map(|(i, c)| spec(&format!("p{i}"), counting_brain(Arc::clone(c))))
        .collect();
    let mut battle = TurnScheduler::new(config, agents).unwrap();

    for _ in 0..10 {
        battle.run_turn().unwrap();
    }

    for counter in &counters {
        assert_eq!(counter.load(Ordering::SeqCst), 11);
    }
}

#[test]
fn paused_battle_steps_and_reviews() {
    use crate::recorder::MemoryRecorder;

    let recorder = Arc::new(MemoryRecorder::new());
    let agents = vec![spec("a", idle_brain()), spec("b", idle_brain())];
    let mut battle = TurnScheduler::new(fast_config(1), agents)
        .unwrap()
        .with_recorder(recorder.clone());
    for _ in 0..3 {
        battle.run_turn().unwrap();
    }

    let controller = battle.controller();
    controller.pause();
    controller.step_back();
    controller.step_back();
    controller.step();
    let report = battle.run_turn().unwrap();

    assert_eq!(report.turn, 4);
    assert!(battle.is_paused());
    let reviewed: Vec<u64> = recorder.reviewed().iter().map(|s| s.turn).collect();
    assert_eq!(reviewed, vec![2, 1]);
    assert_eq!(battle.world().turn(), 4);

    let waker = {
        let controller = battle.controller();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            controller.resume();
        })
    };
    battle.run_turn().unwrap();
    waker.join().unwrap();
    assert!(!battle.is_paused());
}
