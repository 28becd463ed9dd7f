//! Persistence for agents and executions.
//!
//! Two backends implement the same pair of traits: [`SqliteStore`] for
//! durable deployments and [`MemoryStore`] for tests and throwaway runs.
//! Executions form a forest through `parent_execution_id`; the store is the
//! arena that owns every record and hands out copies.

pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use ac_domain::agent::{Agent, AgentDraft, AgentId, AgentPatch, UserId};
use ac_domain::config::{StoreBackend, StoreConfig};
use ac_domain::error::{Error, Result};
use ac_domain::execution::{Execution, ExecutionId, ExecutionStatus, NewExecution};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Traits
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Durable record of conversation turns.
#[async_trait::async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Persist a new execution and return its assigned id. The parent, when
    /// given, must already exist.
    async fn create(&self, new: NewExecution) -> Result<ExecutionId>;

    /// Fetch an execution by id. Unknown ids are `NotFound`.
    async fn get(&self, id: ExecutionId) -> Result<Execution>;

    /// Write the mutable fields of `execution` (status, output, end time,
    /// error message) as one atomic unit. Refuses rows that are already
    /// terminal and backwards status moves.
    async fn commit(&self, execution: &Execution) -> Result<()>;

    /// Like [`Self::get`] but executions owned by someone else read as
    /// `NotFound`.
    async fn get_for_user(&self, id: ExecutionId, user_id: UserId) -> Result<Execution> {
        let exec = self.get(id).await?;
        if exec.user_id != user_id {
            return Err(Error::not_found("execution", id));
        }
        Ok(exec)
    }

    /// Direct children of `parent_id`, oldest first.
    async fn children(&self, parent_id: ExecutionId) -> Result<Vec<Execution>>;

    /// Executions of one agent by one user, newest first.
    async fn list_for_agent(&self, agent_id: AgentId, user_id: UserId) -> Result<Vec<Execution>>;

    /// Remove every execution of an agent. Returns the number removed.
    async fn delete_for_agent(&self, agent_id: AgentId) -> Result<u64>;
}

/// Agent definitions, scoped by owner.
#[async_trait::async_trait]
pub trait AgentDirectory: Send + Sync {
    async fn create_agent(&self, owner_id: UserId, draft: AgentDraft) -> Result<Agent>;

    /// Agents owned by someone else read as `NotFound`.
    async fn get_agent(&self, agent_id: AgentId, owner_id: UserId) -> Result<Agent>;

    /// The owner's agents, newest first.
    async fn list_agents(&self, owner_id: UserId) -> Result<Vec<Agent>>;

    /// Agents flagged `is_public` by any owner, newest first.
    async fn list_public_agents(&self) -> Result<Vec<Agent>>;

    async fn update_agent(
        &self,
        agent_id: AgentId,
        owner_id: UserId,
        patch: AgentPatch,
    ) -> Result<Agent>;

    /// Remove the agent together with all of its executions.
    async fn delete_agent(&self, agent_id: AgentId, owner_id: UserId) -> Result<()>;
}

/// Both halves of the persistence layer behind one object.
pub trait Store: ExecutionStore + AgentDirectory {}

impl<T: ExecutionStore + AgentDirectory> Store for T {}

/// Open the backend selected by `cfg`.
pub fn open(cfg: &StoreConfig) -> Result<Arc<dyn Store>> {
    match cfg.backend {
        StoreBackend::Sqlite => Ok(Arc::new(SqliteStore::open(&cfg.path)?)),
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Shared commit guard
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Decide whether `next` may overwrite a row currently in `stored`.
pub(crate) fn check_commit(stored: ExecutionStatus, next: &Execution) -> Result<()> {
    if stored.is_terminal() {
        return Err(Error::Persistence(format!(
            "execution {} is already {stored}; terminal records are immutable",
            next.id
        )));
    }
    if next.status != stored && !stored.can_transition_to(next.status) {
        return Err(Error::Persistence(format!(
            "execution {}: status cannot move from {stored} to {}",
            next.id, next.status
        )));
    }
    next.check_invariants()
        .map_err(|e| Error::Persistence(e.to_string()))
}
