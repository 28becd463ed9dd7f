//! In-process store: an id-keyed arena behind a single `RwLock`.
//!
//! Every mutation happens under one write guard, so a commit swaps the
//! whole record at once and readers never see a half-applied turn.

use std::collections::HashMap;

use ac_domain::agent::{Agent, AgentDraft, AgentId, AgentPatch, UserId};
use ac_domain::error::{Error, Result};
use ac_domain::execution::{Execution, ExecutionId, NewExecution};
use chrono::Utc;
use parking_lot::RwLock;

use crate::{check_commit, AgentDirectory, ExecutionStore};

#[derive(Default)]
struct Arena {
    agents: HashMap<AgentId, Agent>,
    executions: HashMap<ExecutionId, Execution>,
    next_agent_id: AgentId,
    next_execution_id: ExecutionId,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Arena>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored executions.
    pub fn execution_count(&self) -> usize {
        self.inner.read().executions.len()
    }
}

fn newest_first<T>(items: &mut [T], key: impl Fn(&T) -> (chrono::DateTime<Utc>, i64)) {
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}

#[async_trait::async_trait]
impl ExecutionStore for MemoryStore {
    async fn create(&self, new: NewExecution) -> Result<ExecutionId> {
        let mut arena = self.inner.write();
        if !arena.agents.contains_key(&new.agent_id) {
            return Err(Error::Persistence(format!(
                "agent {} does not exist",
                new.agent_id
            )));
        }
        if let Some(parent) = new.parent_execution_id {
            if !arena.executions.contains_key(&parent) {
                return Err(Error::Persistence(format!(
                    "parent execution {parent} does not exist"
                )));
            }
        }
        arena.next_execution_id += 1;
        let id = arena.next_execution_id;
        arena.executions.insert(id, new.into_execution(id));
        Ok(id)
    }

    async fn get(&self, id: ExecutionId) -> Result<Execution> {
        self.inner
            .read()
            .executions
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found("execution", id))
    }

    async fn commit(&self, execution: &Execution) -> Result<()> {
        let mut arena = self.inner.write();
        let stored = arena
            .executions
            .get_mut(&execution.id)
            .ok_or_else(|| Error::not_found("execution", execution.id))?;
        check_commit(stored.status, execution)?;
        stored.status = execution.status;
        stored.output = execution.output.clone();
        stored.end_time = execution.end_time;
        stored.error_message = execution.error_message.clone();
        Ok(())
    }

    async fn children(&self, parent_id: ExecutionId) -> Result<Vec<Execution>> {
        let arena = self.inner.read();
        let mut out: Vec<Execution> = arena
            .executions
            .values()
            .filter(|e| e.parent_execution_id == Some(parent_id))
            .cloned()
            .collect();
        out.sort_by_key(|e| e.id);
        Ok(out)
    }

    async fn list_for_agent(&self, agent_id: AgentId, user_id: UserId) -> Result<Vec<Execution>> {
        let arena = self.inner.read();
        let mut out: Vec<Execution> = arena
            .executions
            .values()
            .filter(|e| e.agent_id == agent_id && e.user_id == user_id)
            .cloned()
            .collect();
        newest_first(&mut out, |e| (e.start_time, e.id));
        Ok(out)
    }

    async fn delete_for_agent(&self, agent_id: AgentId) -> Result<u64> {
        let mut arena = self.inner.write();
        let before = arena.executions.len();
        arena.executions.retain(|_, e| e.agent_id != agent_id);
        Ok((before - arena.executions.len()) as u64)
    }
}

#[async_trait::async_trait]
impl AgentDirectory for MemoryStore {
    async fn create_agent(&self, owner_id: UserId, draft: AgentDraft) -> Result<Agent> {
        draft.validate()?;
        let mut arena = self.inner.write();
        arena.next_agent_id += 1;
        let now = Utc::now();
        let agent = Agent {
            id: arena.next_agent_id,
            owner_id,
            name: draft.name,
            description: draft.description,
            system_prompt: draft.system_prompt,
            model: draft.model,
            temperature: draft.temperature,
            max_tokens: draft.max_tokens,
            is_public: draft.is_public,
            created_at: now,
            updated_at: now,
        };
        arena.agents.insert(agent.id, agent.clone());
        Ok(agent)
    }

    async fn get_agent(&self, agent_id: AgentId, owner_id: UserId) -> Result<Agent> {
        self.inner
            .read()
            .agents
            .get(&agent_id)
            .filter(|a| a.owner_id == owner_id)
            .cloned()
            .ok_or_else(|| Error::not_found("agent", agent_id))
    }

    async fn list_agents(&self, owner_id: UserId) -> Result<Vec<Agent>> {
        let arena = self.inner.read();
        let mut out: Vec<Agent> = arena
            .agents
            .values()
            .filter(|a| a.owner_id == owner_id)
            .cloned()
            .collect();
        newest_first(&mut out, |a| (a.created_at, a.id));
        Ok(out)
    }

    async fn list_public_agents(&self) -> Result<Vec<Agent>> {
        let arena = self.inner.read();
        let mut out: Vec<Agent> = arena.agents.values().filter(|a| a.is_public).cloned().collect();
        newest_first(&mut out, |a| (a.created_at, a.id));
        Ok(out)
    }

    async fn update_agent(
        &self,
        agent_id: AgentId,
        owner_id: UserId,
        patch: AgentPatch,
    ) -> Result<Agent> {
        let mut arena = self.inner.write();
        let agent = arena
            .agents
            .get_mut(&agent_id)
            .filter(|a| a.owner_id == owner_id)
            .ok_or_else(|| Error::not_found("agent", agent_id))?;
        patch.apply(agent)?;
        Ok(agent.clone())
    }

    async fn delete_agent(&self, agent_id: AgentId, owner_id: UserId) -> Result<()> {
        let mut arena = self.inner.write();
        match arena.agents.get(&agent_id) {
            Some(a) if a.owner_id == owner_id => {}
            _ => return Err(Error::not_found("agent", agent_id)),
        }
        arena.agents.remove(&agent_id);
        arena.executions.retain(|_, e| e.agent_id != agent_id);
        Ok(())
    }
}
