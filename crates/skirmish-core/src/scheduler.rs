//! The turn scheduler.
//!
//! [`TurnScheduler`] owns the world, the agents' execution contexts and the
//! battle lifecycle. Every turn runs seven phases:
//!
//! | Phase | Work |
//! |---|---|
//! | 1 | apply queued [`BattleCommand`]s; block while paused |
//! | 2–6 | [`TurnPipeline`]: faults, intents, projectiles, movement, scans, deaths |
//! | 7 | snapshot to the [`RecorderSink`], then wake every living agent |
//!
//! # Ordering
//!
//! The agent order is reshuffled every turn from a `ChaCha8Rng` seeded with
//! [`BattleConfig::seed`]. Given the same seed, the same agents and the same
//! intents, every turn resolves identically.
//!
//! # Control
//!
//! A [`BattleController`] sends commands from any thread. They are applied
//! at the start of the next turn, in the order they were sent.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use skirmish_core::agent::{AgentView, Brain};
//! use skirmish_core::config::BattleConfig;
//! use skirmish_core::intent::Intent;
//! use skirmish_core::scheduler::{AgentSpec, TurnScheduler};
//!
//! struct Spinner;
//!
//! impl Brain for Spinner {
//!     fn think(&mut self, _view: &AgentView) -> Intent {
//!         Intent::new().turn_body(0.1).fire(1.0)
//!     }
//! }
//!
//! let agents = vec![
//!     AgentSpec::new("a", Arc::new(|| Box::new(Spinner) as Box<dyn Brain>)),
//!     AgentSpec::new("b", Arc::new(|| Box::new(Spinner) as Box<dyn Brain>)),
//! ];
//! let mut battle = TurnScheduler::new(BattleConfig::default(), agents).unwrap();
//! let results = battle.run().unwrap();
//! assert_eq!(results.ranking.len(), 2);
//! ```

use std::collections::{BTreeMap, VecDeque};
use std::f64::consts::TAU;
use std::fmt;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::agent::{
    AgentHandle, AgentPhase, AgentRuntime, AgentView, BrainFactory, Rendezvous, ThreadRuntime,
    WakeOutcome,
};
use crate::config::BattleConfig;
use crate::entity::{AgentBody, AgentId, Capabilities, Team, TeamId};
use crate::error::{AgentFault, EngineError};
use crate::event::{AgentEvent, EventFanout};
use crate::geometry::BoundingBox;
use crate::intent::Intent;
use crate::pipeline::{TurnPipeline, TurnReport};
use crate::recorder::{NullRecorder, RecorderSink};
use crate::rules;
use crate::scoring::{AgentScore, ClassicScoring, ScoringPolicy};
use crate::snapshot::{AgentStatus, TurnSnapshot};
use crate::world::WorldState;

/// How long a paused scheduler waits for a command before checking again.
const PAUSE_POLL: Duration = Duration::from_millis(10);

// =============================================================================
// Agent registration
// =============================================================================

/// Everything needed to enter one combatant into a battle.
#[derive(Clone)]
pub struct AgentSpec {
    /// Display name
    pub name: String,
    /// Tier flags
    pub capabilities: Capabilities,
    /// Team name; agents with the same name form a team, the first one
    /// registered leads it
    pub team: Option<String>,
    /// Multiplier on the turn budget
    pub cost_factor: f64,
    /// Builds the agent's logic every round
    pub brain: BrainFactory,
}

impl AgentSpec {
    /// An advanced agent with no team and the standard turn budget.
    #[must_use]
    pub fn new(name: impl Into<String>, brain: BrainFactory) -> Self {
        Self {
            name: name.into(),
            capabilities: Capabilities::ADVANCED,
            team: None,
            cost_factor: 1.0,
            brain,
        }
    }

    /// Replaces the capability flags.
    #[must_use]
    pub const fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Puts the agent into the team called `team`.
    #[must_use]
    pub fn in_team(mut self, team: impl Into<String>) -> Self {
        self.team = Some(team.into());
        self
    }

    /// Scales the agent's turn budget.
    #[must_use]
    pub const fn with_cost_factor(mut self, cost_factor: f64) -> Self {
        self.cost_factor = cost_factor;
        self
    }
}

impl fmt::Debug for AgentSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentSpec")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .field("team", &self.team)
            .field("cost_factor", &self.cost_factor)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Control
// =============================================================================

/// Requests applied at the start of the next turn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BattleCommand {
    /// Stop advancing turns.
    Pause,
    /// Continue advancing turns.
    Resume,
    /// Advance one turn while paused.
    Step,
    /// Show the previous recorded turn again while paused.
    StepBack,
    /// End the battle after the current round's grace period.
    Abort,
    /// Cap the turn rate; 0 removes the cap.
    SetTps(u32),
    /// Kill an agent at the end of the next turn.
    KillAgent(AgentId),
    /// Turn painting on or off for an agent.
    SetPaint(AgentId, bool),
}

/// Sends [`BattleCommand`]s to a running scheduler from any thread.
#[derive(Debug, Clone)]
pub struct BattleController {
    tx: Sender<BattleCommand>,
}

impl BattleController {
    /// Queues a command.
    ///
    /// Returns false if the scheduler no longer exists.
    pub fn send(&self, command: BattleCommand) -> bool {
        self.tx.send(command).is_ok()
    }

    /// Queues [`BattleCommand::Pause`].
    pub fn pause(&self) -> bool {
        self.send(BattleCommand::Pause)
    }

    /// Queues [`BattleCommand::Resume`].
    pub fn resume(&self) -> bool {
        self.send(BattleCommand::Resume)
    }

    /// Queues [`BattleCommand::Step`].
    pub fn step(&self) -> bool {
        self.send(BattleCommand::Step)
    }

    /// Queues [`BattleCommand::StepBack`].
    pub fn step_back(&self) -> bool {
        self.send(BattleCommand::StepBack)
    }

    /// Queues [`BattleCommand::Abort`].
    pub fn abort(&self) -> bool {
        self.send(BattleCommand::Abort)
    }

    /// Queues [`BattleCommand::SetTps`].
    pub fn set_tps(&self, tps: u32) -> bool {
        self.send(BattleCommand::SetTps(tps))
    }

    /// Queues [`BattleCommand::KillAgent`].
    pub fn kill_agent(&self, agent: AgentId) -> bool {
        self.send(BattleCommand::KillAgent(agent))
    }

    /// Queues [`BattleCommand::SetPaint`].
    pub fn set_paint(&self, agent: AgentId, on: bool) -> bool {
        self.send(BattleCommand::SetPaint(agent, on))
    }
}

/// Outcome of a whole battle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleResults {
    /// Rounds actually played
    pub rounds: u32,
    /// True if the battle was aborted
    pub aborted: bool,
    /// Battle totals, best first
    pub ranking: Vec<AgentScore>,
}

// =============================================================================
// Scheduler
// =============================================================================

/// Runs a battle turn by turn.
pub struct TurnScheduler {
    config: BattleConfig,
    world: WorldState,
    pipeline: TurnPipeline,
    events: EventFanout,
    scoring: Box<dyn ScoringPolicy>,
    recorder: Arc<dyn RecorderSink>,
    runtime: Box<dyn AgentRuntime>,
    handles: BTreeMap<AgentId, AgentHandle>,
    rng: ChaCha8Rng,
    commands: Receiver<BattleCommand>,
    controller: BattleController,
    paused: bool,
    pending_steps: u32,
    history: VecDeque<TurnSnapshot>,
    review_cursor: usize,
    turn_period: Option<Duration>,
    round: u32,
    round_active: bool,
    aborted: bool,
    results: Option<BattleResults>,
}

impl TurnScheduler {
    /// Creates a battle whose agents run on their own threads.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoAgents`] for an empty roster, or
    /// [`EngineError::Config`] if `config` is invalid for it.
    pub fn new(config: BattleConfig, agents: Vec<AgentSpec>) -> Result<Self, EngineError> {
        Self::with_runtime(config, agents, Box::new(ThreadRuntime::new()))
    }

    /// Creates a battle on a custom [`AgentRuntime`].
    ///
    /// Agents get IDs 1, 2, ... in roster order.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub fn with_runtime(
        config: BattleConfig,
        agents: Vec<AgentSpec>,
        mut runtime: Box<dyn AgentRuntime>,
    ) -> Result<Self, EngineError> {
        if agents.is_empty() {
            return Err(EngineError::NoAgents);
        }
        config.validate(agents.len())?;

        let mut world = WorldState::new(&config);
        let mut events = EventFanout::new(config.event_queue_capacity);
        let mut handles = BTreeMap::new();
        let mut teams: Vec<Team> = Vec::new();

        for (raw, spec) in (1_u64..).zip(agents) {
            let id = AgentId::new(raw);
            let mut capabilities = spec.capabilities;
            let mut team = None;
            let mut is_leader = false;
            if let Some(name) = &spec.team {
                let index = match teams.iter().position(|t| &t.name == name) {
                    Some(index) => index,
                    None => {
                        let team_id = TeamId::new(teams.len() as u64 + 1);
                        teams.push(Team::new(team_id, name.clone()));
                        teams.len() - 1
                    }
                };
                is_leader = teams[index].members().is_empty();
                teams[index].push(id);
                team = Some(teams[index].id);
                capabilities |= Capabilities::TEAM;
            }

            world.insert_agent(AgentBody::new(
                id,
                spec.name.clone(),
                capabilities,
                team,
                is_leader,
            ));
            events.register(id);
            runtime.register(id, spec.brain);
            handles.insert(id, AgentHandle::new(id, spec.name, spec.cost_factor));
        }
        for team in teams {
            world.insert_team(team);
        }

        let (tx, commands) = mpsc::channel();
        info!(
            agents = handles.len(),
            rounds = config.num_rounds,
            seed = config.seed,
            "battle created"
        );
        Ok(Self {
            pipeline: TurnPipeline::new(&config),
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            turn_period: config.turn_period(),
            world,
            events,
            scoring: Box::new(ClassicScoring::new()),
            recorder: Arc::new(NullRecorder),
            runtime,
            handles,
            commands,
            controller: BattleController { tx },
            paused: false,
            pending_steps: 0,
            history: VecDeque::with_capacity(config.history_len),
            review_cursor: 0,
            round: 0,
            round_active: false,
            aborted: false,
            results: None,
            config,
        })
    }

    /// Replaces the scoring rules.
    #[must_use]
    pub fn with_scoring(mut self, scoring: Box<dyn ScoringPolicy>) -> Self {
        self.scoring = scoring;
        self
    }

    /// Replaces the recorder.
    #[must_use]
    pub fn with_recorder(mut self, recorder: Arc<dyn RecorderSink>) -> Self {
        self.recorder = recorder;
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// The battle configuration.
    #[must_use]
    pub const fn config(&self) -> &BattleConfig {
        &self.config
    }

    /// The live world.
    #[must_use]
    pub const fn world(&self) -> &WorldState {
        &self.world
    }

    /// A controller for this battle.
    #[must_use]
    pub fn controller(&self) -> BattleController {
        self.controller.clone()
    }

    /// Scheduler-side state of one agent.
    #[must_use]
    pub fn handle(&self, agent: AgentId) -> Option<&AgentHandle> {
        self.handles.get(&agent)
    }

    /// Current round, starting at 0.
    #[must_use]
    pub const fn round(&self) -> u32 {
        self.round
    }

    /// Returns true while paused.
    #[must_use]
    pub const fn is_paused(&self) -> bool {
        self.paused
    }

    /// Returns true once every round has been played.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.results.is_some()
    }

    /// Final results, once the battle is over.
    #[must_use]
    pub const fn results(&self) -> Option<&BattleResults> {
        self.results.as_ref()
    }

    /// Recent turn snapshots, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &TurnSnapshot> {
        self.history.iter()
    }

    /// Marks an agent as being debugged, which lifts its turn timeout.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownAgent`] if `agent` is not registered.
    pub fn set_debugging(&mut self, agent: AgentId, on: bool) -> Result<(), EngineError> {
        if !self.handles.contains_key(&agent) {
            return Err(EngineError::UnknownAgent(agent));
        }
        self.runtime.set_debugging(agent, on);
        Ok(())
    }

    // =========================================================================
    // Driving
    // =========================================================================

    /// Plays the whole battle.
    ///
    /// # Errors
    ///
    /// Returns an error if an agent context cannot be started.
    pub fn run(&mut self) -> Result<BattleResults, EngineError> {
        while self.results.is_none() {
            self.run_turn()?;
        }
        self.results.clone().ok_or(EngineError::BattleFinished)
    }

    /// Plays the current round to its end.
    ///
    /// # Returns
    ///
    /// The number of turns the round lasted.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::BattleFinished`] if there is no round left.
    pub fn run_round(&mut self) -> Result<u64, EngineError> {
        if self.is_finished() {
            return Err(EngineError::BattleFinished);
        }
        if !self.round_active {
            self.start_round()?;
        }
        let round = self.round;
        while self.round == round && !self.is_finished() {
            self.run_turn()?;
        }
        Ok(self.world.turn())
    }

    /// Plays one turn, starting a new round first if needed.
    ///
    /// While the battle is paused this call blocks until a `Resume`, `Step`
    /// or `Abort` arrives through a [`BattleController`], so a paused battle
    /// must be driven from another thread.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::BattleFinished`] once every round has been
    /// played.
    pub fn run_turn(&mut self) -> Result<TurnReport, EngineError> {
        if self.is_finished() {
            return Err(EngineError::BattleFinished);
        }
        if !self.round_active {
            self.start_round()?;
        }
        let started = Instant::now();

        // Phase 1
        self.drain_commands();

        // Phases 2–6
        let intents = self.collect_intents();
        let order = self.shuffled_order();
        let report = self.pipeline.run_turn(
            &mut self.world,
            &intents,
            &order,
            &mut self.events,
            self.scoring.as_mut(),
        );
        for (id, line) in &report.log {
            if let Some(handle) = self.handles.get_mut(id) {
                handle.push_log(line.clone());
            }
        }
        for &id in &report.deaths {
            self.retire(id);
        }
        for (id, _) in &report.halts {
            if let Some(handle) = self.handles.get_mut(id) {
                if !handle.is_stopped() {
                    handle.escalate(self.runtime.as_mut(), &self.config);
                }
            }
        }

        // Phase 7
        let snapshot = TurnSnapshot::capture(&self.world, self.events.take_turn_log());
        self.recorder.record_turn(&snapshot);
        self.history.push_back(snapshot);
        while self.history.len() > self.config.history_len {
            self.history.pop_front();
        }
        self.review_cursor = 0;

        if report.round_over {
            self.end_round();
        } else {
            self.wake_agents(&order, false);
        }
        self.throttle(started);
        Ok(report)
    }

    // =========================================================================
    // Phase 1
    // =========================================================================

    fn drain_commands(&mut self) {
        loop {
            while let Ok(command) = self.commands.try_recv() {
                self.apply(command);
            }
            if !self.paused {
                return;
            }
            if self.pending_steps > 0 {
                self.pending_steps -= 1;
                return;
            }
            match self.commands.recv_timeout(PAUSE_POLL) {
                Ok(command) => self.apply(command),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }
    }

    fn apply(&mut self, command: BattleCommand) {
        debug!(?command, turn = self.world.turn(), "battle command");
        match command {
            BattleCommand::Pause => self.paused = true,
            BattleCommand::Resume => {
                self.paused = false;
                self.pending_steps = 0;
            }
            BattleCommand::Step => {
                if self.paused {
                    self.pending_steps += 1;
                }
            }
            BattleCommand::StepBack => self.step_back(),
            BattleCommand::Abort => {
                if !self.aborted {
                    info!(round = self.round, "battle aborted");
                }
                self.aborted = true;
                self.paused = false;
                self.pipeline.abort();
                for &id in self.handles.keys() {
                    if let Some(rendezvous) = self.runtime.rendezvous(id) {
                        rendezvous.request_abort();
                    }
                }
            }
            BattleCommand::SetTps(tps) => {
                self.turn_period = (tps > 0).then(|| Duration::from_secs(1) / tps);
            }
            BattleCommand::KillAgent(id) => self.pipeline.schedule_kill(id),
            BattleCommand::SetPaint(id, on) => {
                if let Some(handle) = self.handles.get_mut(&id) {
                    handle.set_painting(on);
                }
            }
        }
    }

    /// Re-emits an earlier snapshot. The live world is untouched.
    fn step_back(&mut self) {
        if !self.paused || self.history.is_empty() {
            return;
        }
        if self.review_cursor + 1 < self.history.len() {
            self.review_cursor += 1;
        }
        let index = self.history.len() - 1 - self.review_cursor;
        if let Some(snapshot) = self.history.get(index) {
            debug!(turn = snapshot.turn, "reviewing earlier turn");
            self.recorder.review(snapshot);
        }
    }

    // =========================================================================
    // Phases 2 and 7
    // =========================================================================

    fn collect_intents(&self) -> BTreeMap<AgentId, Intent> {
        self.world
            .living_ids()
            .into_iter()
            .filter_map(|id| Some((id, self.runtime.intents(id)?.take()?)))
            .collect()
    }

    pub(crate) fn shuffled_order(&mut self) -> Vec<AgentId> {
        let mut order = self.world.agent_ids();
        order.shuffle(&mut self.rng);
        order
    }

    fn wake_agents(&mut self, order: &[AgentId], first_turn: bool) {
        let turn = self.world.turn();
        let targets: Vec<AgentId> = order
            .iter()
            .copied()
            .filter(|id| {
                self.world.agent(*id).is_some_and(AgentBody::is_alive)
                    && self.handles.get(id).is_some_and(|h| !h.is_stopped())
            })
            .collect();

        if self.config.parallel_think {
            let mut waiting = Vec::with_capacity(targets.len());
            for id in targets {
                match self.signal(id, first_turn) {
                    Ok((rendezvous, deadline)) => waiting.push((id, rendezvous, deadline)),
                    Err(outcome) => self.after_wake(id, &outcome, turn),
                }
            }
            for (id, rendezvous, deadline) in waiting {
                let outcome = rendezvous.await_yield(deadline);
                self.after_wake(id, &outcome, turn);
            }
        } else {
            for id in targets {
                let outcome = match self.signal(id, first_turn) {
                    Ok((rendezvous, deadline)) => rendezvous.await_yield(deadline),
                    Err(outcome) => outcome,
                };
                self.after_wake(id, &outcome, turn);
            }
        }
    }

    /// Hands `id` a fresh view if it is ready for one.
    fn signal(
        &mut self,
        id: AgentId,
        first_turn: bool,
    ) -> Result<(Arc<Rendezvous>, Instant), WakeOutcome> {
        let rendezvous = self.runtime.rendezvous(id).ok_or(WakeOutcome::Stopped)?;
        match rendezvous.phase() {
            AgentPhase::Thinking => return Err(WakeOutcome::TimedOut),
            AgentPhase::Halted => return Err(WakeOutcome::Stopped),
            AgentPhase::Dead => return Ok((rendezvous, Instant::now())),
            AgentPhase::Idle | AgentPhase::Asleep => {}
        }
        let body = self.world.agent(id).ok_or(WakeOutcome::Stopped)?;
        let status = AgentStatus::capture(body, &self.world);
        let handle = self.handles.get_mut(&id).ok_or(WakeOutcome::Stopped)?;
        let timeout = handle.timeout(&self.config, first_turn, self.runtime.is_debugging(id));

        let view = Arc::new(AgentView::new(
            status,
            self.events.drain(id),
            rendezvous.flags(),
        ));
        if !rendezvous.signal(view) {
            return Err(WakeOutcome::TimedOut);
        }
        handle.count_wake();
        Ok((rendezvous, Instant::now() + timeout))
    }

    fn after_wake(&mut self, id: AgentId, outcome: &WakeOutcome, turn: u64) {
        let Some(handle) = self.handles.get_mut(&id) else {
            return;
        };
        if *outcome == WakeOutcome::TimedOut {
            self.events.send(id, turn, AgentEvent::SkippedTurn { turn, count: 1 });
        }
        match handle.record(outcome, turn, self.config.max_skipped_turns) {
            Some(AgentFault::Crash { message }) => {
                handle.mark_stopped();
                self.runtime.join(id);
                self.pipeline.schedule_crash(id, message);
            }
            Some(fault) => {
                warn!(agent = %id, turn, %fault, "agent unresponsive");
                handle.escalate(self.runtime.as_mut(), &self.config);
                self.pipeline.schedule_halt(id, fault);
            }
            None => {}
        }
    }

    /// Stops the context of an agent that died.
    fn retire(&mut self, id: AgentId) {
        if let Some(handle) = self.handles.get_mut(&id) {
            handle.mark_stopped();
        }
        if let Some(rendezvous) = self.runtime.rendezvous(id) {
            rendezvous.request_halt();
        }
        self.runtime.join(id);
    }

    fn throttle(&self, started: Instant) {
        if let Some(period) = self.turn_period {
            let elapsed = started.elapsed();
            if elapsed < period {
                thread::sleep(period - elapsed);
            }
        }
    }

    // =========================================================================
    // Rounds
    // =========================================================================

    fn start_round(&mut self) -> Result<(), EngineError> {
        let round = self.round;
        self.world.begin_round(round);
        self.events.clear();
        self.pipeline.start_round();
        self.history.clear();
        self.review_cursor = 0;
        self.place_agents();

        let bodies: Vec<&AgentBody> = self.world.agents().collect();
        self.scoring.start_round(&bodies);

        for (&id, handle) in &mut self.handles {
            handle.start_round();
            self.runtime.start_round(id, round)?;
        }
        self.round_active = true;
        info!(round, "round started");

        let order = self.shuffled_order();
        self.wake_agents(&order, true);
        Ok(())
    }

    /// Fixed starts are reserved first; random starts avoid everything
    /// placed earlier this round.
    fn place_agents(&mut self) {
        let ids = self.world.agent_ids();
        let mut occupied: Vec<BoundingBox> = self
            .config
            .initial_positions
            .iter()
            .take(ids.len())
            .map(|start| BoundingBox::centered(start.position(), rules::AGENT_SIZE))
            .collect();

        for (index, id) in ids.into_iter().enumerate() {
            let (position, heading) = match self.config.initial_positions.get(index) {
                Some(start) => (
                    start.position(),
                    start.heading.unwrap_or_else(|| self.rng.gen_range(0.0..TAU)),
                ),
                None => {
                    let position = self.world.random_free_position(&mut self.rng, &occupied);
                    occupied.push(BoundingBox::centered(position, rules::AGENT_SIZE));
                    (position, self.rng.gen_range(0.0..TAU))
                }
            };
            if let Some(body) = self.world.agent_mut(id) {
                body.reset(position, heading);
            }
        }
    }

    fn end_round(&mut self) {
        let round = self.round;
        let turns = self.world.turn();
        let last = self.aborted || round + 1 >= self.config.num_rounds;

        for id in self.world.agent_ids() {
            self.events
                .send(id, turns, AgentEvent::RoundEnded { round, turns });
            if last {
                self.events.send(
                    id,
                    turns,
                    AgentEvent::BattleEnded {
                        aborted: self.aborted,
                    },
                );
            }
        }
        // Survivors see the closing events once more before they are stopped.
        let survivors = self.world.living_ids();
        self.wake_agents(&survivors, false);

        self.scoring.end_round();
        self.stop_agents();
        self.recorder.record_round_end(round, turns);
        info!(round, turns, "round ended");

        self.round += 1;
        self.round_active = false;
        if last {
            self.finish();
        }
    }

    fn stop_agents(&mut self) {
        for (&id, handle) in &mut self.handles {
            handle.mark_stopped();
            if let Some(rendezvous) = self.runtime.rendezvous(id) {
                rendezvous.request_halt();
            }
        }
        for &id in self.handles.keys() {
            self.runtime.join(id);
        }
    }

    fn finish(&mut self) {
        let results = BattleResults {
            rounds: self.round,
            aborted: self.aborted,
            ranking: self.scoring.ranking(),
        };
        self.recorder.record_battle_end(&results);
        info!(
            rounds = results.rounds,
            aborted = results.aborted,
            "battle finished"
        );
        self.results = Some(results);
    }
}

impl fmt::Debug for TurnScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TurnScheduler")
            .field("round", &self.round)
            .field("turn", &self.world.turn())
            .field("agents", &self.handles.len())
            .field("paused", &self.paused)
            .field("aborted", &self.aborted)
            .field("finished", &self.is_finished())
            .finish_non_exhaustive()
    }
}
