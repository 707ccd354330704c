//! Agent registry
//!
//! Single owner of the live agent table. Registration is last-write-wins by
//! agent id; a heartbeat refreshes `last_heartbeat`. Agents silent for longer
//! than the heartbeat timeout stay in the table but are not routable until
//! they heartbeat again.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::tracks::is_wildcard;
use crate::types::AgentRegistration;

/// Registration plus derived routability, as listed by the API.
#[derive(Debug, Clone, Serialize)]
pub struct AgentView {
    #[serde(flatten)]
    pub registration: AgentRegistration,
    pub routable: bool,
}

pub struct AgentRegistry {
    agents: Mutex<HashMap<String, AgentRegistration>>,
    heartbeat_timeout: Duration,
}

impl AgentRegistry {
    pub fn new(heartbeat_timeout: Duration) -> Self {
        Self {
            agents: Mutex::new(HashMap::new()),
            heartbeat_timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, AgentRegistration>> {
        self.agents.lock().unwrap_or_else(|e| {
            tracing::warn!("Agent registry mutex poisoned, recovering");
            e.into_inner()
        })
    }

    /// Store or overwrite a registration. The current load of an existing
    /// entry is kept so outstanding reservations stay accounted.
    pub fn upsert(&self, mut registration: AgentRegistration) -> AgentRegistration {
        let mut agents = self.lock();
        if let Some(existing) = agents.get(&registration.agent_id) {
            registration.load = existing.load;
        }
        agents.insert(registration.agent_id.clone(), registration.clone());
        registration
    }

    /// Refresh the heartbeat. Returns false for unknown agents.
    pub fn heartbeat(&self, agent_id: &str) -> bool {
        self.heartbeat_at(agent_id, Utc::now())
    }

    pub fn heartbeat_at(&self, agent_id: &str, now: DateTime<Utc>) -> bool {
        match self.lock().get_mut(agent_id) {
            Some(agent) => {
                agent.last_heartbeat = now;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, agent_id: &str) -> Option<AgentRegistration> {
        self.lock().get(agent_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Every registration with its routability at `now`, sorted by id.
    pub fn list(&self, now: DateTime<Utc>) -> Vec<AgentView> {
        let mut views: Vec<AgentView> = self
            .lock()
            .values()
            .map(|agent| AgentView {
                routable: !self.is_stale(agent, now) && agent.load < agent.capacity,
                registration: agent.clone(),
            })
            .collect();
        views.sort_by(|a, b| a.registration.agent_id.cmp(&b.registration.agent_id));
        views
    }

    pub fn is_stale(&self, agent: &AgentRegistration, now: DateTime<Utc>) -> bool {
        silent_longer_than(agent, now, self.heartbeat_timeout)
    }

    /// Least-loaded eligible agent for a task, ties broken by id.
    ///
    /// Eligible: has the capability, matches the (canonical) track or holds
    /// the wildcard, is not stale, and has spare capacity.
    pub fn select(&self, task_type: &str, track: &str, now: DateTime<Utc>) -> Option<String> {
        self.lock()
            .values()
            .filter(|a| a.capabilities.contains(task_type))
            .filter(|a| matches_track(&a.tracks, track))
            .filter(|a| !self.is_stale(a, now))
            .filter(|a| a.load < a.capacity)
            .min_by(|a, b| a.load.cmp(&b.load).then_with(|| a.agent_id.cmp(&b.agent_id)))
            .map(|a| a.agent_id.clone())
    }

    /// Select and reserve in one step.
    pub fn select_and_reserve(&self, task_type: &str, track: &str, now: DateTime<Utc>) -> Option<String> {
        let mut agents = self.lock();
        let agent = agents
            .values_mut()
            .filter(|a| a.capabilities.contains(task_type))
            .filter(|a| matches_track(&a.tracks, track))
            .filter(|a| !silent_longer_than(a, now, self.heartbeat_timeout))
            .filter(|a| a.load < a.capacity)
            .min_by(|a, b| a.load.cmp(&b.load).then_with(|| a.agent_id.cmp(&b.agent_id)))?;
        agent.load += 1;
        Some(agent.agent_id.clone())
    }

    /// Take one unit of load. Returns false for unknown agents.
    pub fn reserve(&self, agent_id: &str) -> bool {
        match self.lock().get_mut(agent_id) {
            Some(agent) => {
                agent.load += 1;
                true
            }
            None => false,
        }
    }

    /// Give back one unit of load. Never goes below zero.
    pub fn release(&self, agent_id: &str) {
        if let Some(agent) = self.lock().get_mut(agent_id) {
            agent.load = agent.load.saturating_sub(1);
        }
    }
}

/// Affinity match on canonical keys.
pub fn matches_track(affinity: &BTreeSet<String>, track: &str) -> bool {
    affinity.iter().any(|t| is_wildcard(t)) || affinity.contains(track)
}

/// Heartbeats in the future (clock skew) count as fresh.
fn silent_longer_than(agent: &AgentRegistration, now: DateTime<Utc>, timeout: Duration) -> bool {
    now.signed_duration_since(agent.last_heartbeat)
        .to_std()
        .map_or(false, |silent| silent > timeout)
}
