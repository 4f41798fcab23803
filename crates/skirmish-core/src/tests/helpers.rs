//! Test helper functions for setting up worlds, agents and brains.
//!
//! This module provides factory functions and setup utilities that make
//! writing tests more ergonomic and consistent.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use glam::DVec2;

use crate::agent::{AgentView, Brain, BrainFactory};
use crate::config::{BattleConfig, InitialPosition};
use crate::entity::{AgentBody, AgentId, Capabilities, Team, TeamId};
use crate::error::AgentFault;
use crate::event::{AgentEvent, EventFanout};
use crate::geometry::BoundingBox;
use crate::intent::Intent;
use crate::pipeline::{TurnPipeline, TurnReport};
use crate::resolver::{InactivityMonitor, ResolveContext, Resolver};
use crate::scheduler::AgentSpec;
use crate::scoring::{ClassicScoring, ScoringPolicy};
use crate::world::WorldState;

// =============================================================================
// Thread-free test bed
// =============================================================================

/// What a single resolver run produced.
#[derive(Debug, Default)]
pub struct Outcome {
    /// Agents killed
    pub deaths: Vec<AgentId>,
    /// Agents halted
    pub halts: Vec<(AgentId, AgentFault)>,
    /// Agent log lines
    pub log: Vec<(AgentId, String)>,
}

/// A world plus everything a resolver needs, without any threads.
pub struct TestBed {
    /// Configuration the world was built from
    pub config: BattleConfig,
    /// The world under test
    pub world: WorldState,
    /// Event routing
    pub events: EventFanout,
    /// Reference scoring
    pub scoring: ClassicScoring,
    /// Idle tracking for resolver runs
    pub activity: InactivityMonitor,
}

impl TestBed {
    /// An empty arena of the given size.
    pub fn arena(width: f64, height: f64) -> Self {
        Self::from_config(BattleConfig {
            arena_width: width,
            arena_height: height,
            ..BattleConfig::default()
        })
    }

    /// An 800×600 arena with one obstacle.
    pub fn with_obstacle(min: DVec2, max: DVec2) -> Self {
        Self::from_config(BattleConfig {
            obstacles: vec![BoundingBox::new(min, max)],
            ..BattleConfig::default()
        })
    }

    /// A test bed for `config`.
    pub fn from_config(config: BattleConfig) -> Self {
        let events = EventFanout::new(config.event_queue_capacity);
        Self {
            world: WorldState::new(&config),
            config,
            events,
            scoring: ClassicScoring::new(),
            activity: InactivityMonitor::new(),
        }
    }

    /// Places a plain agent.
    pub fn add_agent(&mut self, id: u64, position: DVec2, heading: f64) -> AgentId {
        let id = AgentId::new(id);
        let mut body = AgentBody::new(id, format!("agent{}", id.as_u64()), Capabilities::ADVANCED, None, false);
        body.reset(position, heading);
        self.world.insert_agent(body);
        self.events.register(id);
        id
    }

    /// Puts agents in one team; the first one leads.
    pub fn set_team(&mut self, members: &[u64]) {
        let mut team = Team::new(TeamId::new(1), "team");
        for (i, &m) in members.iter().enumerate() {
            let id = AgentId::new(m);
            team.push(id);
            let body = self.agent_mut(m);
            body.team = Some(TeamId::new(1));
            body.is_leader = i == 0;
            body.capabilities |= Capabilities::TEAM;
            let (position, heading) = (body.position, body.body_heading);
            body.reset(position, heading);
        }
        self.world.insert_team(team);
    }

    /// Opens the round in the scoring ledger.
    pub fn start(&mut self) {
        let agents: Vec<&AgentBody> = self.world.agents().collect();
        self.scoring.start_round(&agents);
    }

    /// Looks up an agent that must exist.
    pub fn agent(&self, id: u64) -> &AgentBody {
        self.world.agent(AgentId::new(id)).expect("agent exists")
    }

    /// Looks up an agent that must exist, mutably.
    pub fn agent_mut(&mut self, id: u64) -> &mut AgentBody {
        self.world.agent_mut(AgentId::new(id)).expect("agent exists")
    }

    /// Runs one resolver for one turn, with agents in ID order.
    pub fn run(&mut self, resolver: &dyn Resolver) -> Outcome {
        self.world.advance_turn();
        let order = self.world.agent_ids();
        let mut ctx = ResolveContext::new(
            self.world.turn(),
            &order,
            &mut self.events,
            &mut self.scoring,
            &mut self.activity,
        );
        ctx.gun_cooling_rate = self.config.gun_cooling_rate;
        resolver.resolve(&mut self.world, &mut ctx);
        Outcome {
            deaths: ctx.deaths,
            halts: ctx.halts,
            log: ctx.log,
        }
    }

    /// Runs one full pipeline turn, with agents in ID order.
    pub fn run_pipeline(
        &mut self,
        pipeline: &mut TurnPipeline,
        intents: &BTreeMap<AgentId, Intent>,
    ) -> TurnReport {
        let order = self.world.agent_ids();
        pipeline.run_turn(
            &mut self.world,
            intents,
            &order,
            &mut self.events,
            &mut self.scoring,
        )
    }

    /// Drains one agent's inbox.
    pub fn events_for(&mut self, id: AgentId) -> Vec<AgentEvent> {
        self.events.drain(id).into_iter().map(|e| e.event).collect()
    }
}

// =============================================================================
// Brains
// =============================================================================

/// Wraps a closure as a brain factory.
pub fn brain<F>(think: F) -> BrainFactory
where
    F: Fn(&AgentView) -> Intent + Clone + Send + Sync + 'static,
{
    Arc::new(move || Box::new(FnBrain(think.clone())) as Box<dyn Brain>)
}

struct FnBrain<F>(F);

impl<F> Brain for FnBrain<F>
where
    F: Fn(&AgentView) -> Intent + Send,
{
    fn think(&mut self, view: &AgentView) -> Intent {
        (self.0)(view)
    }
}

/// A brain that sits still.
pub fn idle_brain() -> BrainFactory {
    brain(|_| Intent::new())
}

/// A brain that drives forward and fires whenever it can.
pub fn aggressive_brain() -> BrainFactory {
    brain(|view| {
        let mut intent = Intent::new().ahead(100.0).turn_radar(0.5);
        if view.status.gun_heat == 0.0 {
            intent = intent.fire(1.0);
        }
        intent
    })
}

/// A brain that panics on turn `turn`.
pub fn crashing_brain(turn: u64) -> BrainFactory {
    brain(move |view| {
        assert!(view.status.turn != turn, "brain failure on turn {turn}");
        Intent::new()
    })
}

/// A brain that never yields: it sleeps far longer than any turn budget.
///
/// It still checks the halt flag so that escalation can reclaim the thread.
pub fn stuck_brain() -> BrainFactory {
    brain(|view| {
        while !view.halt_requested() {
            thread::sleep(Duration::from_millis(1));
        }
        Intent::new()
    })
}

/// A brain that counts how often it was asked to think.
pub fn counting_brain(counter: Arc<AtomicUsize>) -> BrainFactory {
    brain(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Intent::new()
    })
}

/// An agent spec with default capabilities.
pub fn spec(name: &str, factory: BrainFactory) -> AgentSpec {
    AgentSpec::new(name, factory)
}

/// A small, fast configuration for threaded tests.
pub fn fast_config(rounds: u32) -> BattleConfig {
    BattleConfig {
        num_rounds: rounds,
        turn_budget_ms: 50,
        max_skipped_turns: 3,
        interrupt_grace_ms: 200,
        stop_grace_ms: 200,
        end_grace_turns: 2,
        seed: 7,
        ..BattleConfig::default()
    }
}

/// Fixed starting spots for `n` agents along the middle of the arena.
pub fn line_positions(n: usize) -> Vec<InitialPosition> {
    (0..n)
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let x = 100.0 + 150.0 * i as f64;
            InitialPosition {
                x,
                y: 300.0,
                heading: Some(0.0),
            }
        })
        .collect()
}
