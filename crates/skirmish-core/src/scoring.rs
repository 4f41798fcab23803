//! Scoring policies.
//!
//! The pipeline reports every scoring-relevant happening to a
//! [`ScoringPolicy`] and asks it whether the round is decided. The policy
//! never touches the world; it only keeps its own ledger.
//!
//! [`ClassicScoring`] implements the reference rules:
//!
//! | Award | Amount |
//! |---|---|
//! | survival | 50 per enemy death while alive |
//! | last survivor | 10 per enemy in the round |
//! | bullet damage | damage dealt, capped at the victim's energy |
//! | bullet kill | 20% of all damage dealt to the victim |
//! | ram | 1.2 per ram |
//! | ram kill | 30% of all damage dealt to the victim |

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entity::{AgentBody, AgentId, TeamId};
use crate::rules;

/// Which kind of blow finished the victim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KillBasis {
    /// Killed by a projectile.
    Bullet,
    /// Killed by ramming.
    Ram,
}

/// Final or running score of one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentScore {
    /// Agent
    pub agent: AgentId,
    /// Sum of every component
    pub total: f64,
    /// Survival points
    pub survival: f64,
    /// Last survivor bonus
    pub last_survivor_bonus: f64,
    /// Bullet damage points
    pub bullet_damage: f64,
    /// Bullet kill bonus
    pub bullet_kill_bonus: f64,
    /// Ram points
    pub ram_damage: f64,
    /// Ram kill bonus
    pub ram_kill_bonus: f64,
    /// Rounds won
    pub firsts: u32,
    /// 1-based rank, filled in by [`ScoringPolicy::ranking`]
    pub rank: usize,
}

impl AgentScore {
    /// A zeroed score for `agent`.
    #[must_use]
    pub const fn new(agent: AgentId) -> Self {
        Self {
            agent,
            total: 0.0,
            survival: 0.0,
            last_survivor_bonus: 0.0,
            bullet_damage: 0.0,
            bullet_kill_bonus: 0.0,
            ram_damage: 0.0,
            ram_kill_bonus: 0.0,
            firsts: 0,
            rank: 0,
        }
    }

    fn recompute_total(&mut self) {
        self.total = self.survival
            + self.last_survivor_bonus
            + self.bullet_damage
            + self.bullet_kill_bonus
            + self.ram_damage
            + self.ram_kill_bonus;
    }

    fn accumulate(&mut self, round: &Self) {
        self.survival += round.survival;
        self.last_survivor_bonus += round.last_survivor_bonus;
        self.bullet_damage += round.bullet_damage;
        self.bullet_kill_bonus += round.bullet_kill_bonus;
        self.ram_damage += round.ram_damage;
        self.ram_kill_bonus += round.ram_kill_bonus;
        self.firsts += round.firsts;
        self.recompute_total();
    }
}

/// Pluggable battle rules.
///
/// Every `score_*` method is called by the scheduler thread only, in the
/// deterministic order the pipeline resolves the turn.
pub trait ScoringPolicy: Send {
    /// Called once before the first turn of each round.
    fn start_round(&mut self, agents: &[&AgentBody]);

    /// An agent hit a wall.
    fn score_wall_hit(&mut self, _agent: AgentId, _damage: f64) {}

    /// `attacker` rammed `victim`.
    fn score_ram_damage(&mut self, attacker: AgentId, victim: AgentId);

    /// `attacker`'s projectile dealt `damage` to `victim`.
    fn score_bullet_damage(&mut self, attacker: AgentId, victim: AgentId, damage: f64);

    /// `attacker` killed `victim`.
    ///
    /// # Returns
    ///
    /// The bonus awarded.
    fn score_kill(&mut self, attacker: AgentId, victim: AgentId, basis: KillBasis) -> f64;

    /// `agent` outlived an enemy.
    fn score_survival(&mut self, agent: AgentId);

    /// `agent` is among the last standing; `enemies` counts its opponents.
    fn score_last_survivor(&mut self, agent: AgentId, enemies: usize);

    /// `agent` was halted; its round score is forfeited.
    fn set_inactive(&mut self, agent: AgentId);

    /// Returns true if the round is decided.
    fn is_game_over(&self, active_count: usize, agents: &[&AgentBody]) -> bool;

    /// Called once after the last turn of each round.
    fn end_round(&mut self);

    /// Battle totals, best first, with ranks filled in.
    fn ranking(&self) -> Vec<AgentScore>;
}

#[derive(Debug, Clone)]
struct Ledger {
    round: AgentScore,
    total: AgentScore,
    damage_to: BTreeMap<AgentId, f64>,
    active: bool,
}

/// The reference scoring rules.
#[derive(Debug, Clone, Default)]
pub struct ClassicScoring {
    ledgers: BTreeMap<AgentId, Ledger>,
}

impl ClassicScoring {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The running score of `agent` in the current round.
    #[must_use]
    pub fn round_score(&self, agent: AgentId) -> Option<&AgentScore> {
        self.ledgers.get(&agent).map(|l| &l.round)
    }

    fn active_ledger(&mut self, agent: AgentId) -> Option<&mut Ledger> {
        self.ledgers.get_mut(&agent).filter(|l| l.active)
    }
}

/// Side an agent fights for: its team, or itself when unaffiliated.
fn side(agent: &AgentBody) -> (Option<TeamId>, Option<AgentId>) {
    match agent.team {
        Some(team) => (Some(team), None),
        None => (None, Some(agent.id)),
    }
}

impl ScoringPolicy for ClassicScoring {
    fn start_round(&mut self, agents: &[&AgentBody]) {
        for agent in agents {
            let ledger = self.ledgers.entry(agent.id).or_insert_with(|| Ledger {
                round: AgentScore::new(agent.id),
                total: AgentScore::new(agent.id),
                damage_to: BTreeMap::new(),
                active: true,
            });
            ledger.round = AgentScore::new(agent.id);
            ledger.damage_to.clear();
            ledger.active = true;
        }
    }

    fn score_ram_damage(&mut self, attacker: AgentId, victim: AgentId) {
        if let Some(ledger) = self.active_ledger(attacker) {
            *ledger.damage_to.entry(victim).or_default() += rules::RAM_DAMAGE;
            ledger.round.ram_damage += rules::RAM_SCORE;
            ledger.round.recompute_total();
        }
    }

    fn score_bullet_damage(&mut self, attacker: AgentId, victim: AgentId, damage: f64) {
        if let Some(ledger) = self.active_ledger(attacker) {
            *ledger.damage_to.entry(victim).or_default() += damage;
            ledger.round.bullet_damage += damage;
            ledger.round.recompute_total();
        }
    }

    fn score_kill(&mut self, attacker: AgentId, victim: AgentId, basis: KillBasis) -> f64 {
        let Some(ledger) = self.active_ledger(attacker) else {
            return 0.0;
        };
        let dealt = ledger.damage_to.get(&victim).copied().unwrap_or(0.0);
        let bonus = match basis {
            KillBasis::Bullet => {
                let bonus = dealt * 0.20;
                ledger.round.bullet_kill_bonus += bonus;
                bonus
            }
            KillBasis::Ram => {
                let bonus = dealt * 0.30;
                ledger.round.ram_kill_bonus += bonus;
                bonus
            }
        };
        ledger.round.recompute_total();
        bonus
    }

    fn score_survival(&mut self, agent: AgentId) {
        if let Some(ledger) = self.active_ledger(agent) {
            ledger.round.survival += 50.0;
            ledger.round.recompute_total();
        }
    }

    fn score_last_survivor(&mut self, agent: AgentId, enemies: usize) {
        if let Some(ledger) = self.active_ledger(agent) {
            #[allow(clippy::cast_precision_loss)]
            let enemies = enemies as f64;
            ledger.round.last_survivor_bonus += 10.0 * enemies;
            ledger.round.firsts += 1;
            ledger.round.recompute_total();
        }
    }

    fn set_inactive(&mut self, agent: AgentId) {
        if let Some(ledger) = self.ledgers.get_mut(&agent) {
            ledger.round = AgentScore::new(agent);
            ledger.active = false;
        }
    }

    fn is_game_over(&self, active_count: usize, agents: &[&AgentBody]) -> bool {
        if active_count <= 1 {
            return true;
        }
        let mut sides = agents.iter().filter(|a| a.is_alive()).map(|a| side(a));
        match sides.next() {
            Some(first) => sides.all(|s| s == first),
            None => true,
        }
    }

    fn end_round(&mut self) {
        for ledger in self.ledgers.values_mut() {
            let round = ledger.round.clone();
            ledger.total.accumulate(&round);
            ledger.round = AgentScore::new(ledger.round.agent);
        }
    }

    fn ranking(&self) -> Vec<AgentScore> {
        let mut scores: Vec<AgentScore> = self.ledgers.values().map(|l| l.total.clone()).collect();
        scores.sort_by(|a, b| {
            b.total
                .total_cmp(&a.total)
                .then_with(|| b.firsts.cmp(&a.firsts))
                .then_with(|| a.agent.cmp(&b.agent))
        });
        for (i, score) in scores.iter_mut().enumerate() {
            score.rank = i + 1;
        }
        scores
    }
}
