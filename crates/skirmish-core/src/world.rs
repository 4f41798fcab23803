//! Authoritative world state.
//!
//! `WorldState` owns every agent body and projectile. It is handed by
//! exclusive reference to the turn pipeline and never shared with agent
//! threads; they only ever see [`snapshot`](crate::snapshot) values copied
//! out of it.
//!
//! # Determinism
//!
//! Agents, projectiles and teams are stored in `BTreeMap`s keyed by ID, so
//! every iteration over the world visits entities in the same order.

use std::collections::BTreeMap;

use glam::DVec2;
use rand::Rng;

use crate::config::BattleConfig;
use crate::entity::{
    AgentBody, AgentId, Projectile, ProjectileId, ProjectileKind, ProjectileState, Team, TeamId,
};
use crate::geometry::BoundingBox;
use crate::rules;

/// Attempts made to find a free random starting spot.
const PLACEMENT_ATTEMPTS: usize = 1000;

/// Mutable state of one battle.
#[derive(Debug, Clone)]
pub struct WorldState {
    bounds: BoundingBox,
    obstacles: Vec<BoundingBox>,
    agents: BTreeMap<AgentId, AgentBody>,
    projectiles: BTreeMap<ProjectileId, Projectile>,
    teams: BTreeMap<TeamId, Team>,
    round: u32,
    turn: u64,
    next_projectile: u64,
}

impl WorldState {
    /// Creates an empty world with the arena of `config`.
    #[must_use]
    pub fn new(config: &BattleConfig) -> Self {
        Self {
            bounds: config.bounds(),
            obstacles: config.obstacles.clone(),
            agents: BTreeMap::new(),
            projectiles: BTreeMap::new(),
            teams: BTreeMap::new(),
            round: 0,
            turn: 0,
            next_projectile: 0,
        }
    }

    // =========================================================================
    // Clock
    // =========================================================================

    /// Current round, starting at 0.
    #[must_use]
    pub const fn round(&self) -> u32 {
        self.round
    }

    /// Current turn within the round.
    #[must_use]
    pub const fn turn(&self) -> u64 {
        self.turn
    }

    /// Moves the clock to the next turn.
    pub fn advance_turn(&mut self) {
        self.turn += 1;
    }

    /// Starts `round`: resets the turn counter and removes projectiles.
    pub fn begin_round(&mut self, round: u32) {
        self.round = round;
        self.turn = 0;
        self.projectiles.clear();
    }

    // =========================================================================
    // Arena
    // =========================================================================

    /// The arena rectangle.
    #[must_use]
    pub const fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }

    /// Static obstacles.
    #[must_use]
    pub fn obstacles(&self) -> &[BoundingBox] {
        &self.obstacles
    }

    /// Picks a random spot where an agent overlaps neither an obstacle nor
    /// any box in `occupied`.
    ///
    /// Agents already in the world are not consulted; callers pass the boxes
    /// placed so far this round. Falls back to the last candidate if no free
    /// spot is found.
    pub fn random_free_position<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        occupied: &[BoundingBox],
    ) -> DVec2 {
        let half = rules::AGENT_HALF_SIZE;
        let mut candidate = self.bounds.center();
        for _ in 0..PLACEMENT_ATTEMPTS {
            candidate = DVec2::new(
                rng.gen_range(half..=(self.bounds.max.x - half).max(half)),
                rng.gen_range(half..=(self.bounds.max.y - half).max(half)),
            );
            let bb = BoundingBox::centered(candidate, rules::AGENT_SIZE);
            let blocked = self.obstacles.iter().any(|o| o.intersects(&bb))
                || occupied.iter().any(|o| o.intersects(&bb));
            if !blocked {
                return candidate;
            }
        }
        candidate
    }

    // =========================================================================
    // Agents
    // =========================================================================

    /// Adds or replaces an agent body.
    pub fn insert_agent(&mut self, body: AgentBody) {
        self.agents.insert(body.id, body);
    }

    /// Looks up an agent.
    #[must_use]
    pub fn agent(&self, id: AgentId) -> Option<&AgentBody> {
        self.agents.get(&id)
    }

    /// Looks up an agent for mutation.
    pub fn agent_mut(&mut self, id: AgentId) -> Option<&mut AgentBody> {
        self.agents.get_mut(&id)
    }

    /// Every agent in ID order.
    pub fn agents(&self) -> impl Iterator<Item = &AgentBody> {
        self.agents.values()
    }

    /// Every agent in ID order, mutably.
    pub fn agents_mut(&mut self) -> impl Iterator<Item = &mut AgentBody> {
        self.agents.values_mut()
    }

    /// IDs of every agent in ID order.
    #[must_use]
    pub fn agent_ids(&self) -> Vec<AgentId> {
        self.agents.keys().copied().collect()
    }

    /// IDs of agents still taking part in the round.
    #[must_use]
    pub fn living_ids(&self) -> Vec<AgentId> {
        self.agents
            .values()
            .filter(|a| a.is_alive())
            .map(|a| a.id)
            .collect()
    }

    /// Number of agents still taking part in the round.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.agents.values().filter(|a| a.is_alive()).count()
    }

    // =========================================================================
    // Teams
    // =========================================================================

    /// Adds or replaces a team.
    pub fn insert_team(&mut self, team: Team) {
        self.teams.insert(team.id, team);
    }

    /// Looks up a team.
    #[must_use]
    pub fn team(&self, id: TeamId) -> Option<&Team> {
        self.teams.get(&id)
    }

    /// Every team in ID order.
    pub fn teams(&self) -> impl Iterator<Item = &Team> {
        self.teams.values()
    }

    // =========================================================================
    // Projectiles
    // =========================================================================

    /// Creates an armed projectile and returns its ID.
    pub fn spawn_projectile(
        &mut self,
        owner: AgentId,
        kind: ProjectileKind,
        power: f64,
        heading: f64,
        position: DVec2,
    ) -> ProjectileId {
        let id = ProjectileId::new(self.next_projectile);
        self.next_projectile += 1;
        self.projectiles
            .insert(id, Projectile::new(id, owner, kind, power, heading, position));
        id
    }

    /// Looks up a projectile.
    #[must_use]
    pub fn projectile(&self, id: ProjectileId) -> Option<&Projectile> {
        self.projectiles.get(&id)
    }

    /// Looks up a projectile for mutation.
    pub fn projectile_mut(&mut self, id: ProjectileId) -> Option<&mut Projectile> {
        self.projectiles.get_mut(&id)
    }

    /// Every projectile in ID order.
    pub fn projectiles(&self) -> impl Iterator<Item = &Projectile> {
        self.projectiles.values()
    }

    /// IDs of every projectile in ID order.
    #[must_use]
    pub fn projectile_ids(&self) -> Vec<ProjectileId> {
        self.projectiles.keys().copied().collect()
    }

    /// Drops projectiles that reached `Inactive`.
    ///
    /// # Returns
    ///
    /// The number removed.
    pub fn remove_inactive(&mut self) -> usize {
        let before = self.projectiles.len();
        self.projectiles
            .retain(|_, p| p.state() != ProjectileState::Inactive);
        before - self.projectiles.len()
    }
}
