//! Teams of agents.

use serde::{Deserialize, Serialize};

use super::{AgentId, TeamId};

/// An ordered group of agents. The first member leads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    /// Identifier
    pub id: TeamId,
    /// Display name
    pub name: String,
    members: Vec<AgentId>,
}

impl Team {
    /// Creates an empty team.
    #[must_use]
    pub fn new(id: TeamId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            members: Vec::new(),
        }
    }

    /// Appends a member. The first member added becomes the leader.
    pub fn push(&mut self, agent: AgentId) {
        if !self.members.contains(&agent) {
            self.members.push(agent);
        }
    }

    /// Members in join order.
    #[must_use]
    pub fn members(&self) -> &[AgentId] {
        &self.members
    }

    /// The designated leader.
    #[must_use]
    pub fn leader(&self) -> Option<AgentId> {
        self.members.first().copied()
    }

    /// Returns true if `agent` belongs to this team.
    #[must_use]
    pub fn contains(&self, agent: AgentId) -> bool {
        self.members.contains(&agent)
    }
}
