//! Phases 2–6 of a turn, without threads.
//!
//! [`TurnPipeline`] takes an explicit map of intents and a turn order and
//! applies one turn to a [`WorldState`]:
//!
//! | Phase | Work |
//! |---|---|
//! | 2 | apply pending crashes and halts, commit intents, fire |
//! | 3 | [`ProjectileResolver`](crate::resolver::ProjectileResolver) |
//! | 4 | [`MovementResolver`](crate::resolver::MovementResolver) |
//! | 5 | [`ScanResolver`](crate::resolver::ScanResolver) |
//! | 6 | deaths, leader damage, survival scoring, round-over detection |
//!
//! The [`TurnScheduler`](crate::scheduler::TurnScheduler) drives the
//! pipeline with the intents its agent threads committed. Tests and replays
//! drive it directly with recorded intents; the results are identical
//! because nothing in here depends on threads or wall-clock time.
//!
//! # Round end
//!
//! Once the [`ScoringPolicy`] reports the round decided (or the battle is
//! aborted), the round keeps running for `end_grace_turns` more turns so
//! that explosions finish. Survivors are declared winners on the first
//! decided turn.

use std::collections::BTreeMap;

use tracing::{debug, error, info, warn};

use crate::config::BattleConfig;
use crate::entity::{AgentBody, AgentId, ProjectileId, TeamId};
use crate::error::AgentFault;
use crate::event::{AgentEvent, EventFanout};
use crate::intent::{FireOrder, Intent};
use crate::resolver::{
    standard_resolvers, InactivityMonitor, ResolveContext, Resolver, INACTIVITY_RESET_ENERGY,
};
use crate::rules;
use crate::scoring::ScoringPolicy;
use crate::world::WorldState;

/// What happened during one turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnReport {
    /// Turn that was resolved
    pub turn: u64,
    /// Agents killed this turn, in kill order
    pub deaths: Vec<AgentId>,
    /// Agents halted this turn
    pub halts: Vec<(AgentId, AgentFault)>,
    /// Projectiles fired this turn
    pub fired: Vec<ProjectileId>,
    /// The round is decided (or aborted) and in its grace period
    pub decided: bool,
    /// The round is over; no further turns should be played
    pub round_over: bool,
    /// Lines for agents' own logs
    pub log: Vec<(AgentId, String)>,
}

/// Runs phases 2–6 of each turn.
pub struct TurnPipeline {
    resolvers: Vec<Box<dyn Resolver>>,
    gun_cooling_rate: f64,
    inactivity_time: u64,
    end_grace_turns: u32,
    activity: InactivityMonitor,
    end_timer: Option<u32>,
    aborted: bool,
    pending_crashes: Vec<(AgentId, String)>,
    pending_halts: Vec<(AgentId, AgentFault)>,
    pending_kills: Vec<AgentId>,
}

impl TurnPipeline {
    /// Creates a pipeline with the standard resolvers.
    #[must_use]
    pub fn new(config: &BattleConfig) -> Self {
        Self::with_resolvers(config, standard_resolvers())
    }

    /// Creates a pipeline with custom resolvers, run in phase order.
    #[must_use]
    pub fn with_resolvers(config: &BattleConfig, mut resolvers: Vec<Box<dyn Resolver>>) -> Self {
        resolvers.sort_by_key(|r| r.phase());
        Self {
            resolvers,
            gun_cooling_rate: config.gun_cooling_rate,
            inactivity_time: config.inactivity_time,
            end_grace_turns: config.end_grace_turns,
            activity: InactivityMonitor::new(),
            end_timer: None,
            aborted: false,
            pending_crashes: Vec::new(),
            pending_halts: Vec::new(),
            pending_kills: Vec::new(),
        }
    }

    /// Clears per-round state.
    pub fn start_round(&mut self) {
        self.activity.reset();
        self.end_timer = None;
        self.aborted = false;
        self.pending_crashes.clear();
        self.pending_halts.clear();
        self.pending_kills.clear();
    }

    /// Starts the abort grace period.
    pub fn abort(&mut self) {
        self.aborted = true;
    }

    /// Returns true once [`abort`](Self::abort) was called this round.
    #[must_use]
    pub const fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Returns true once the round is decided or aborted.
    #[must_use]
    pub const fn is_decided(&self) -> bool {
        self.end_timer.is_some()
    }

    /// Idle tracking for the current round.
    #[must_use]
    pub const fn activity(&self) -> &InactivityMonitor {
        &self.activity
    }

    /// Kills `agent` in the next phase 2 because its logic crashed.
    pub fn schedule_crash(&mut self, agent: AgentId, message: impl Into<String>) {
        self.pending_crashes.push((agent, message.into()));
    }

    /// Halts `agent` in the next phase 2.
    pub fn schedule_halt(&mut self, agent: AgentId, fault: AgentFault) {
        self.pending_halts.push((agent, fault));
    }

    /// Kills `agent` in the next phase 6.
    pub fn schedule_kill(&mut self, agent: AgentId) {
        self.pending_kills.push(agent);
    }

    /// Resolves one turn.
    ///
    /// # Arguments
    ///
    /// * `world` - The world to advance
    /// * `intents` - Intents committed since the last turn; agents without
    ///   one keep their remaining movement
    /// * `order` - This turn's agent order
    /// * `events` - Event routing
    /// * `scoring` - Battle rules
    pub fn run_turn(
        &mut self,
        world: &mut WorldState,
        intents: &BTreeMap<AgentId, Intent>,
        order: &[AgentId],
        events: &mut EventFanout,
        scoring: &mut dyn ScoringPolicy,
    ) -> TurnReport {
        world.advance_turn();
        let turn = world.turn();
        let zap = if self.aborted {
            rules::ABORT_ZAP
        } else if self.activity.should_zap(self.inactivity_time) {
            rules::INACTIVITY_ZAP
        } else {
            0.0
        };

        let crashes = std::mem::take(&mut self.pending_crashes);
        let halts = std::mem::take(&mut self.pending_halts);
        let kills = std::mem::take(&mut self.pending_kills);

        let mut ctx = ResolveContext::new(turn, order, events, scoring, &mut self.activity);
        ctx.gun_cooling_rate = self.gun_cooling_rate;
        ctx.zap = zap;

        // Phase 2
        apply_faults(world, &mut ctx, crashes, halts);
        let fired = commit_intents(world, &mut ctx, intents);

        // Phases 3–5
        for resolver in &self.resolvers {
            resolver.resolve(world, &mut ctx);
        }

        // Phase 6
        settle(world, &mut ctx, kills);
        let ResolveContext {
            deaths, halts, log, ..
        } = ctx;
        let mut report = TurnReport {
            turn,
            deaths,
            halts,
            fired,
            log,
            ..TurnReport::default()
        };

        self.activity.tick();
        let agents: Vec<&AgentBody> = world.agents().collect();
        let decided = self.aborted || scoring.is_game_over(world.active_count(), &agents);
        if decided {
            if self.end_timer.is_none() {
                if self.aborted {
                    for body in world.agents().filter(|a| a.is_alive()) {
                        report.log.push((body.id, "SYSTEM: game aborted.".to_string()));
                    }
                } else {
                    declare_winners(world, events, scoring, turn, &mut report.log);
                }
            }
            let timer = self.end_timer.map_or(1, |t| t + 1);
            self.end_timer = Some(timer);
            report.decided = true;
            report.round_over = timer > self.end_grace_turns;
        }
        report
    }
}

impl std::fmt::Debug for TurnPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnPipeline")
            .field("resolvers", &self.resolvers.len())
            .field("activity", &self.activity)
            .field("end_timer", &self.end_timer)
            .field("aborted", &self.aborted)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Phase 2
// =============================================================================

fn apply_faults(
    world: &mut WorldState,
    ctx: &mut ResolveContext<'_>,
    crashes: Vec<(AgentId, String)>,
    halts: Vec<(AgentId, AgentFault)>,
) {
    for (id, message) in crashes {
        let Some(body) = world.agent_mut(id) else {
            continue;
        };
        if body.kill() {
            warn!(agent = %id, turn = ctx.turn, %message, "agent crashed");
            let line = format!("SYSTEM: {} crashed: {message}", body.name);
            ctx.deaths.push(id);
            ctx.log_line(id, line);
        }
    }
    for (id, fault) in halts {
        if let Some(body) = world.agent_mut(id) {
            if body.is_alive() {
                body.halt();
                ctx.halts.push((id, fault));
            }
        }
    }
}

fn commit_intents(
    world: &mut WorldState,
    ctx: &mut ResolveContext<'_>,
    intents: &BTreeMap<AgentId, Intent>,
) -> Vec<ProjectileId> {
    let mut fired = Vec::new();
    for (&id, intent) in intents {
        let Some(body) = world.agent_mut(id) else {
            continue;
        };
        if !body.is_alive() {
            continue;
        }
        if let Err(fault) = intent.sanitize() {
            error!(agent = %id, turn = ctx.turn, %fault, "rejected intent");
            body.halt();
            ctx.halts.push((id, fault));
            continue;
        }
        if let Some(shot) = body.commit(intent) {
            if let Some(projectile) = fire(world, ctx, id, shot) {
                fired.push(projectile);
            }
        }
    }
    fired
}

/// Fires if the gun is cold and the agent can afford the shot.
fn fire(
    world: &mut WorldState,
    ctx: &mut ResolveContext<'_>,
    id: AgentId,
    shot: FireOrder,
) -> Option<ProjectileId> {
    let body = world.agent_mut(id)?;
    let power = rules::clamp_power(shot.power);
    if body.gun_heat > 0.0 || body.energy <= power {
        return None;
    }
    body.adjust_energy(-power);
    body.gun_heat += rules::gun_heat(power);
    let heading = body.gun_heading;
    let position = body.position;
    ctx.activity.record_loss(power);
    Some(world.spawn_projectile(id, shot.kind, power, heading, position))
}

// =============================================================================
// Phase 6
// =============================================================================

fn settle(world: &mut WorldState, ctx: &mut ResolveContext<'_>, kills: Vec<AgentId>) {
    for id in kills {
        if world.agent_mut(id).is_some_and(AgentBody::kill) {
            info!(agent = %id, turn = ctx.turn, "agent killed by controller");
            ctx.deaths.push(id);
        }
    }

    let order = ctx.order;
    for &id in order {
        if let Some(body) = world.agent_mut(id) {
            if body.is_alive() && body.energy <= 0.0 && body.kill() {
                ctx.deaths.push(id);
            }
        }
    }

    // Leader deaths cascade through the team.
    let mut i = 0;
    while i < ctx.deaths.len() {
        let dead = ctx.deaths[i];
        i += 1;
        let team = match world.agent(dead) {
            Some(body) if body.is_leader => body.team,
            _ => None,
        };
        let Some(team) = team else {
            continue;
        };
        let mates: Vec<AgentId> = world
            .agents()
            .filter(|a| a.team == Some(team) && a.is_alive())
            .map(|a| a.id)
            .collect();
        for mate in mates {
            if let Some(body) = world.agent_mut(mate) {
                body.adjust_energy(-rules::LEADER_DEATH_DAMAGE);
                if body.energy <= 0.0 && body.kill() {
                    ctx.deaths.push(mate);
                }
            }
        }
    }

    let deaths = ctx.deaths.clone();
    for dead in deaths {
        ctx.events.send(dead, ctx.turn, AgentEvent::Death);
        ctx.activity.record_loss(INACTIVITY_RESET_ENERGY);
        let team = world.agent(dead).and_then(|a| a.team);
        for other in world.agents().filter(|a| a.is_alive()) {
            ctx.events
                .send(other.id, ctx.turn, AgentEvent::AgentDeath { agent: dead });
            if team.is_none() || other.team != team {
                ctx.scoring.score_survival(other.id);
            }
        }
        debug!(agent = %dead, turn = ctx.turn, "agent destroyed");
    }

    let halts = ctx.halts.clone();
    for (id, fault) in halts {
        ctx.scoring.set_inactive(id);
        let name = world.agent(id).map(|a| a.name.clone()).unwrap_or_default();
        warn!(agent = %id, turn = ctx.turn, %fault, "agent halted");
        ctx.log_line(id, format!("SYSTEM: {name} has been halted: {fault}"));
        for other in world.agents().filter(|a| a.is_alive()) {
            ctx.events
                .send(other.id, ctx.turn, AgentEvent::AgentDeath { agent: id });
        }
    }
}

fn declare_winners(
    world: &mut WorldState,
    events: &mut EventFanout,
    scoring: &mut dyn ScoringPolicy,
    turn: u64,
    log: &mut Vec<(AgentId, String)>,
) {
    let sides: Vec<(AgentId, Option<TeamId>)> =
        world.agents().map(|a| (a.id, a.team)).collect();
    for body in world.agents_mut().filter(|a| a.is_alive() && !a.winner) {
        let enemies = sides
            .iter()
            .filter(|(id, team)| *id != body.id && (team.is_none() || *team != body.team))
            .count();
        scoring.score_last_survivor(body.id, enemies);
        body.winner = true;
        events.send(body.id, turn, AgentEvent::Win);
        info!(agent = %body.id, turn, "round won");
        log.push((body.id, format!("SYSTEM: {} wins the round.", body.name)));
    }
}
