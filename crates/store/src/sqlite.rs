//! SQLite backend.
//!
//! One connection behind a `tokio::sync::Mutex`. Each trait call takes the
//! lock for its whole duration, and every multi-statement write runs inside
//! a transaction.

use std::path::Path;
use std::sync::Arc;

use ac_domain::agent::{Agent, AgentDraft, AgentId, AgentPatch, UserId};
use ac_domain::error::{Error, Result};
use ac_domain::execution::{Execution, ExecutionId, ExecutionStatus, NewExecution};
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tokio::sync::Mutex;

use crate::{check_commit, AgentDirectory, ExecutionStore};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS agents (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id      INTEGER NOT NULL,
    name          TEXT NOT NULL,
    description   TEXT,
    system_prompt TEXT NOT NULL,
    model         TEXT NOT NULL,
    temperature   REAL NOT NULL,
    max_tokens    INTEGER NOT NULL,
    is_public     INTEGER NOT NULL DEFAULT 0,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_agents_owner ON agents(owner_id);

CREATE TABLE IF NOT EXISTS executions (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    agent_id            INTEGER NOT NULL REFERENCES agents(id) ON DELETE CASCADE,
    user_id             INTEGER NOT NULL,
    input               TEXT NOT NULL,
    output              TEXT,
    status              TEXT NOT NULL,
    start_time          TEXT NOT NULL,
    end_time            TEXT,
    parent_execution_id INTEGER REFERENCES executions(id) ON DELETE CASCADE,
    error_message       TEXT
);
CREATE INDEX IF NOT EXISTS idx_executions_agent_user ON executions(agent_id, user_id);
CREATE INDEX IF NOT EXISTS idx_executions_parent ON executions(parent_execution_id);
";

const EXECUTION_COLUMNS: &str = "id, agent_id, user_id, input, output, status, start_time, \
                                 end_time, parent_execution_id, error_message";

const AGENT_COLUMNS: &str = "id, owner_id, name, description, system_prompt, model, \
                             temperature, max_tokens, is_public, created_at, updated_at";

fn db_err(e: rusqlite::Error) -> Error {
    Error::Persistence(e.to_string())
}

pub struct SqliteStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database file at `path`, creating parent
    /// directories as needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(db_err)?;
        tracing::info!(path = %path.display(), "opened sqlite store");
        Self::init(conn)
    }

    /// A private database that disappears with the store.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory().map_err(db_err)?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }
}

// ── Row mapping ─────────────────────────────────────────────────────

fn execution_from_row(row: &Row<'_>) -> rusqlite::Result<Execution> {
    let status: String = row.get(5)?;
    let status = ExecutionStatus::parse(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            Type::Text,
            format!("unknown execution status '{status}'").into(),
        )
    })?;
    Ok(Execution {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        user_id: row.get(2)?,
        input: row.get(3)?,
        output: row.get(4)?,
        status,
        start_time: row.get(6)?,
        end_time: row.get(7)?,
        parent_execution_id: row.get(8)?,
        error_message: row.get(9)?,
    })
}

fn agent_from_row(row: &Row<'_>) -> rusqlite::Result<Agent> {
    Ok(Agent {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        system_prompt: row.get(4)?,
        model: row.get(5)?,
        temperature: row.get(6)?,
        max_tokens: row.get(7)?,
        is_public: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn query_executions(
    conn: &Connection,
    sql: &str,
    args: impl rusqlite::Params,
) -> Result<Vec<Execution>> {
    let mut stmt = conn.prepare(sql).map_err(db_err)?;
    let rows = stmt.query_map(args, execution_from_row).map_err(db_err)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
}

fn query_agents(conn: &Connection, sql: &str, args: impl rusqlite::Params) -> Result<Vec<Agent>> {
    let mut stmt = conn.prepare(sql).map_err(db_err)?;
    let rows = stmt.query_map(args, agent_from_row).map_err(db_err)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
}

fn load_owned_agent(conn: &Connection, agent_id: AgentId, owner_id: UserId) -> Result<Agent> {
    conn.query_row(
        &format!("SELECT {AGENT_COLUMNS} FROM agents WHERE id = ?1 AND owner_id = ?2"),
        params![agent_id, owner_id],
        agent_from_row,
    )
    .optional()
    .map_err(db_err)?
    .ok_or_else(|| Error::not_found("agent", agent_id))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ExecutionStore
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl ExecutionStore for SqliteStore {
    async fn create(&self, new: NewExecution) -> Result<ExecutionId> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO executions (agent_id, user_id, input, status, start_time, parent_execution_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                new.agent_id,
                new.user_id,
                new.input,
                new.status.as_str(),
                new.start_time,
                new.parent_execution_id,
            ],
        )
        .map_err(db_err)?;
        Ok(db.last_insert_rowid())
    }

    async fn get(&self, id: ExecutionId) -> Result<Execution> {
        let db = self.db.lock().await;
        db.query_row(
            &format!("SELECT {EXECUTION_COLUMNS} FROM executions WHERE id = ?1"),
            params![id],
            execution_from_row,
        )
        .optional()
        .map_err(db_err)?
        .ok_or_else(|| Error::not_found("execution", id))
    }

    async fn commit(&self, execution: &Execution) -> Result<()> {
        let mut db = self.db.lock().await;
        let tx = db.transaction().map_err(db_err)?;

        let stored: Option<String> = tx
            .query_row(
                "SELECT status FROM executions WHERE id = ?1",
                params![execution.id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        let stored = stored.ok_or_else(|| Error::not_found("execution", execution.id))?;
        let stored = ExecutionStatus::parse(&stored).ok_or_else(|| {
            Error::Persistence(format!("execution {} has unknown status '{stored}'", execution.id))
        })?;
        check_commit(stored, execution)?;

        let changed = tx
            .execute(
                "UPDATE executions
                    SET status = ?2, output = ?3, end_time = ?4, error_message = ?5
                  WHERE id = ?1 AND status NOT IN ('completed', 'failed')",
                params![
                    execution.id,
                    execution.status.as_str(),
                    execution.output,
                    execution.end_time,
                    execution.error_message,
                ],
            )
            .map_err(db_err)?;
        if changed != 1 {
            return Err(Error::Persistence(format!(
                "execution {} was not updated",
                execution.id
            )));
        }
        tx.commit().map_err(db_err)
    }

    async fn children(&self, parent_id: ExecutionId) -> Result<Vec<Execution>> {
        let db = self.db.lock().await;
        query_executions(
            &db,
            &format!(
                "SELECT {EXECUTION_COLUMNS} FROM executions
                  WHERE parent_execution_id = ?1 ORDER BY id ASC"
            ),
            params![parent_id],
        )
    }

    async fn list_for_agent(&self, agent_id: AgentId, user_id: UserId) -> Result<Vec<Execution>> {
        let db = self.db.lock().await;
        query_executions(
            &db,
            &format!(
                "SELECT {EXECUTION_COLUMNS} FROM executions
                  WHERE agent_id = ?1 AND user_id = ?2
                  ORDER BY start_time DESC, id DESC"
            ),
            params![agent_id, user_id],
        )
    }

    async fn delete_for_agent(&self, agent_id: AgentId) -> Result<u64> {
        let db = self.db.lock().await;
        let n = db
            .execute("DELETE FROM executions WHERE agent_id = ?1", params![agent_id])
            .map_err(db_err)?;
        Ok(n as u64)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// AgentDirectory
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl AgentDirectory for SqliteStore {
    async fn create_agent(&self, owner_id: UserId, draft: AgentDraft) -> Result<Agent> {
        draft.validate()?;
        let now = Utc::now();
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO agents (owner_id, name, description, system_prompt, model,
                                 temperature, max_tokens, is_public, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
            params![
                owner_id,
                draft.name,
                draft.description,
                draft.system_prompt,
                draft.model,
                draft.temperature,
                draft.max_tokens,
                draft.is_public,
                now,
            ],
        )
        .map_err(db_err)?;
        Ok(Agent {
            id: db.last_insert_rowid(),
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
        })
    }

    async fn get_agent(&self, agent_id: AgentId, owner_id: UserId) -> Result<Agent> {
        let db = self.db.lock().await;
        load_owned_agent(&db, agent_id, owner_id)
    }

    async fn list_agents(&self, owner_id: UserId) -> Result<Vec<Agent>> {
        let db = self.db.lock().await;
        query_agents(
            &db,
            &format!(
                "SELECT {AGENT_COLUMNS} FROM agents WHERE owner_id = ?1
                  ORDER BY created_at DESC, id DESC"
            ),
            params![owner_id],
        )
    }

    async fn list_public_agents(&self) -> Result<Vec<Agent>> {
        let db = self.db.lock().await;
        query_agents(
            &db,
            &format!(
                "SELECT {AGENT_COLUMNS} FROM agents WHERE is_public = 1
                  ORDER BY created_at DESC, id DESC"
            ),
            [],
        )
    }

    async fn update_agent(
        &self,
        agent_id: AgentId,
        owner_id: UserId,
        patch: AgentPatch,
    ) -> Result<Agent> {
        let db = self.db.lock().await;
        let mut agent = load_owned_agent(&db, agent_id, owner_id)?;
        patch.apply(&mut agent)?;
        db.execute(
            "UPDATE agents
                SET name = ?2, description = ?3, system_prompt = ?4, model = ?5,
                    temperature = ?6, max_tokens = ?7, is_public = ?8, updated_at = ?9
              WHERE id = ?1",
            params![
                agent.id,
                agent.name,
                agent.description,
                agent.system_prompt,
                agent.model,
                agent.temperature,
                agent.max_tokens,
                agent.is_public,
                agent.updated_at,
            ],
        )
        .map_err(db_err)?;
        Ok(agent)
    }

    async fn delete_agent(&self, agent_id: AgentId, owner_id: UserId) -> Result<()> {
        let mut db = self.db.lock().await;
        let tx = db.transaction().map_err(db_err)?;
        load_owned_agent(&tx, agent_id, owner_id)?;
        let removed = tx
            .execute("DELETE FROM executions WHERE agent_id = ?1", params![agent_id])
            .map_err(db_err)?;
        tx.execute("DELETE FROM agents WHERE id = ?1", params![agent_id])
            .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        tracing::debug!(agent_id, executions_removed = removed, "agent deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parent_must_exist() {
        let store = SqliteStore::open_in_memory().unwrap();
        let agent = store.create_agent(1, AgentDraft::new("a", "p")).await.unwrap();
        let err = store
            .create(NewExecution::processing(agent.id, 1, "hi", Some(999)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));
    }

    #[tokio::test]
    async fn file_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("agentchain.db");

        let id = {
            let store = SqliteStore::open(&path).unwrap();
            let agent = store.create_agent(7, AgentDraft::new("a", "p")).await.unwrap();
            let id = store
                .create(NewExecution::processing(agent.id, 7, "hello", None))
                .await
                .unwrap();
            let mut exec = store.get(id).await.unwrap();
            exec.complete("world").unwrap();
            store.commit(&exec).await.unwrap();
            id
        };

        let store = SqliteStore::open(&path).unwrap();
        let exec = store.get(id).await.unwrap();
        assert_eq!(exec.status, ExecutionStatus::Completed);
        assert_eq!(exec.output.as_deref(), Some("world"));
        assert!(exec.end_time.unwrap() >= exec.start_time);
    }
}
