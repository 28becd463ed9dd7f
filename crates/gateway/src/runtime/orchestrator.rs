//! Execution orchestrator: runs one conversation turn end to end.
//!
//! A turn is persisted in `processing` before the generation service is
//! called, so an in-flight turn is always observable. Every exit after that
//! point leaves the record terminal (`completed` or `failed`), except when
//! the terminal write itself fails, which surfaces as
//! [`Error::Integrity`].

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::Instrument;

use ac_domain::agent::{Agent, AgentId, UserId};
use ac_domain::config::{EngineConfig, ForkPolicy};
use ac_domain::error::{Error, Result};
use ac_domain::execution::{Execution, ExecutionId, ExecutionStatus, NewExecution};
use ac_domain::message::Message;
use ac_providers::GenerationClient;
use ac_store::{AgentDirectory, ExecutionStore, Store};
use tokio::sync::OwnedSemaphorePermit;

use super::chain::ChainResolver;
use super::chain_lock::ChainLockMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Run parameters
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Input to a single turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub agent_id: AgentId,
    pub input: String,
    /// Continue the conversation that ends at this execution.
    #[serde(default)]
    pub parent_execution_id: Option<ExecutionId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub output: String,
    pub execution: Execution,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ExecutionOrchestrator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ExecutionOrchestrator {
    store: Arc<dyn Store>,
    chains: ChainResolver<dyn Store>,
    generator: GenerationClient,
    locks: Arc<ChainLockMap>,
    engine: EngineConfig,
}

impl ExecutionOrchestrator {
    pub fn new(store: Arc<dyn Store>, generator: GenerationClient, engine: EngineConfig) -> Self {
        Self {
            chains: ChainResolver::new(store.clone()),
            store,
            generator,
            locks: Arc::new(ChainLockMap::new()),
            engine,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn chains(&self) -> &ChainResolver<dyn Store> {
        &self.chains
    }

    pub fn locks(&self) -> &Arc<ChainLockMap> {
        &self.locks
    }

    /// Run one turn for `user_id`.
    pub async fn run(&self, user_id: UserId, req: RunRequest) -> Result<RunOutcome> {
        let span = tracing::info_span!(
            "execution_run",
            user_id,
            agent_id = req.agent_id,
            parent_execution_id = ?req.parent_execution_id,
            execution_id = tracing::field::Empty,
        );
        self.run_turn(user_id, req).instrument(span).await
    }

    async fn run_turn(&self, user_id: UserId, req: RunRequest) -> Result<RunOutcome> {
        // ── 1. Validate and resolve ownership ───────────────────────
        if req.input.trim().is_empty() {
            return Err(Error::Validation("input must not be empty".into()));
        }
        let agent = self.store.get_agent(req.agent_id, user_id).await?;
        let root = match req.parent_execution_id {
            Some(parent_id) => Some(self.check_parent(&agent, user_id, parent_id).await?),
            None => None,
        };

        // ── 2. Fork policy ──────────────────────────────────────────
        let _permit = self.enter_chain(root, req.parent_execution_id).await?;

        // ── 3. Persist the in-flight turn ───────────────────────────
        let new = NewExecution::processing(agent.id, user_id, req.input.clone(), req.parent_execution_id);
        let id = self.store.create(new.clone()).await.map_err(|e| match e {
            Error::Persistence(_) => e,
            other => Error::Persistence(other.to_string()),
        })?;
        let pending = new.into_execution(id);
        tracing::Span::current().record("execution_id", id);
        tracing::info!(execution_id = id, status = %pending.status, "execution started");

        // ── 4–5. Build context, generate, commit ────────────────────
        let started = Instant::now();
        let cause = match self.generate(&agent, &req).await {
            Ok(output) => {
                let mut done = pending.clone();
                match done.complete(output.clone()) {
                    Ok(()) => match self.store.commit(&done).await {
                        Ok(()) => {
                            tracing::info!(
                                execution_id = id,
                                status = %done.status,
                                elapsed_ms = started.elapsed().as_millis() as u64,
                                output_len = output.len(),
                                "execution completed"
                            );
                            return Ok(RunOutcome {
                                output,
                                execution: done,
                            });
                        }
                        Err(e) => e,
                    },
                    Err(e) => e,
                }
            }
            Err(e) => e,
        };

        // ── 6. Failure path ─────────────────────────────────────────
        Err(self.record_failure(pending, cause, started).await)
    }

    /// Check the parent belongs to the caller and the agent; returns the
    /// chain's root id.
    async fn check_parent(
        &self,
        agent: &Agent,
        user_id: UserId,
        parent_id: ExecutionId,
    ) -> Result<ExecutionId> {
        let parent = self.store.get_for_user(parent_id, user_id).await?;
        if parent.agent_id != agent.id {
            return Err(Error::Forbidden(format!(
                "execution {parent_id} belongs to a different agent"
            )));
        }
        self.chains.root(parent_id).await
    }

    async fn enter_chain(
        &self,
        root: Option<ExecutionId>,
        parent_id: Option<ExecutionId>,
    ) -> Result<Option<OwnedSemaphorePermit>> {
        let (Some(root), Some(parent_id)) = (root, parent_id) else {
            // A fresh turn starts its own chain.
            return Ok(None);
        };
        match self.engine.fork_policy {
            ForkPolicy::Allow => Ok(None),
            ForkPolicy::Serialize => Ok(Some(self.locks.acquire(root).await)),
            ForkPolicy::Reject => {
                let permit = self.locks.acquire(root).await;
                // A failed attempt does not count; the caller may retry it.
                let continued = self
                    .store
                    .children(parent_id)
                    .await?
                    .iter()
                    .any(|c| c.status != ExecutionStatus::Failed);
                if continued {
                    tracing::info!(parent_execution_id = parent_id, "continuation rejected: parent already continued");
                    return Err(Error::Conflict(format!(
                        "execution {parent_id} has already been continued"
                    )));
                }
                Ok(Some(permit))
            }
        }
    }

    async fn generate(&self, agent: &Agent, req: &RunRequest) -> Result<String> {
        let mut messages = vec![Message::system(&agent.system_prompt)];
        if let Some(parent_id) = req.parent_execution_id {
            let history = self
                .chains
                .history(parent_id, self.engine.history_turns)
                .await?;
            tracing::debug!(history_messages = history.len(), "history resolved");
            messages.extend(history);
        }
        messages.push(Message::user(&req.input));

        self.generator
            .generate(
                &agent.model,
                &messages,
                agent.temperature,
                Some(agent.max_tokens),
            )
            .await
    }

    /// Move the turn to `failed` and hand back the error for the caller.
    async fn record_failure(&self, pending: Execution, cause: Error, started: Instant) -> Error {
        let id = pending.id;
        let mut failed = pending;
        if let Err(e) = failed.fail(cause.to_string()) {
            return e;
        }
        match self.store.commit(&failed).await {
            Ok(()) => {
                tracing::warn!(
                    execution_id = id,
                    status = %failed.status,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    error = %cause,
                    "execution failed"
                );
                cause
            }
            Err(commit_err) => {
                tracing::error!(
                    execution_id = id,
                    error = %cause,
                    commit_error = %commit_err,
                    "execution stranded in processing; operator attention required"
                );
                Error::Integrity {
                    execution_id: id,
                    message: format!("{cause}; recording the failure also failed: {commit_err}"),
                }
            }
        }
    }

    // ── Read paths ──────────────────────────────────────────────────

    pub async fn get_execution(&self, id: ExecutionId, user_id: UserId) -> Result<Execution> {
        self.store.get_for_user(id, user_id).await
    }

    /// Full chain from the root down to `id`, for audit and display.
    pub async fn get_chain(&self, id: ExecutionId, user_id: UserId) -> Result<Vec<Execution>> {
        self.store.get_for_user(id, user_id).await?;
        self.chains.chain(id).await
    }
}
