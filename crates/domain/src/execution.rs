//! Execution records: one persisted conversation turn.
//!
//! Executions link to at most one parent through `parent_execution_id`,
//! forming a forest. Parents are referenced by id only; the store is the
//! arena that owns every record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::{AgentId, UserId};
use crate::error::{Error, Result};

pub type ExecutionId = i64;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Execution status
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Processing => 1,
            Self::Completed | Self::Failed => 2,
        }
    }

    /// Whether `self → next` is a legal forward transition.
    pub fn can_transition_to(self, next: ExecutionStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Execution record
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The fields a store needs to create a new execution. The store assigns
/// the id.
#[derive(Debug, Clone)]
pub struct NewExecution {
    pub agent_id: AgentId,
    pub user_id: UserId,
    pub input: String,
    pub status: ExecutionStatus,
    pub start_time: DateTime<Utc>,
    pub parent_execution_id: Option<ExecutionId>,
}

impl NewExecution {
    /// A turn that is about to call the generation service.
    pub fn processing(
        agent_id: AgentId,
        user_id: UserId,
        input: impl Into<String>,
        parent_execution_id: Option<ExecutionId>,
    ) -> Self {
        Self {
            agent_id,
            user_id,
            input: input.into(),
            status: ExecutionStatus::Processing,
            start_time: Utc::now(),
            parent_execution_id,
        }
    }

    pub fn into_execution(self, id: ExecutionId) -> Execution {
        Execution {
            id,
            agent_id: self.agent_id,
            user_id: self.user_id,
            input: self.input,
            output: None,
            status: self.status,
            start_time: self.start_time,
            end_time: None,
            parent_execution_id: self.parent_execution_id,
            error_message: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub agent_id: AgentId,
    pub user_id: UserId,
    pub input: String,
    pub output: Option<String>,
    pub status: ExecutionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub parent_execution_id: Option<ExecutionId>,
    pub error_message: Option<String>,
}

impl Execution {
    /// Move to `completed` with the generated output.
    pub fn complete(&mut self, output: impl Into<String>) -> Result<()> {
        self.transition(ExecutionStatus::Completed)?;
        self.output = Some(output.into());
        self.error_message = None;
        self.end_time = Some(self.clamped_now());
        Ok(())
    }

    /// Move to `failed`, recording the cause. `output` stays null.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        self.transition(ExecutionStatus::Failed)?;
        self.output = None;
        self.error_message = Some(message.into());
        self.end_time = Some(self.clamped_now());
        Ok(())
    }

    /// Duration of the turn once it has ended.
    pub fn elapsed_ms(&self) -> Option<u64> {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds().max(0) as u64)
    }

    /// Check the record-level invariants: output iff completed, end time
    /// iff terminal, and end time not before start time.
    pub fn check_invariants(&self) -> Result<()> {
        let completed = self.status == ExecutionStatus::Completed;
        if self.output.is_some() != completed {
            return Err(self.integrity("output must be set exactly when completed"));
        }
        if self.end_time.is_some() != self.status.is_terminal() {
            return Err(self.integrity("end_time must be set exactly when terminal"));
        }
        if let Some(end) = self.end_time {
            if end < self.start_time {
                return Err(self.integrity("end_time precedes start_time"));
            }
        }
        if self.parent_execution_id == Some(self.id) {
            return Err(self.integrity("execution is its own parent"));
        }
        Ok(())
    }

    fn transition(&mut self, next: ExecutionStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(self.integrity(&format!(
                "illegal transition {} -> {}",
                self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    fn clamped_now(&self) -> DateTime<Utc> {
        Utc::now().max(self.start_time)
    }

    fn integrity(&self, message: &str) -> Error {
        Error::Integrity {
            execution_id: self.id,
            message: message.into(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn processing() -> Execution {
        NewExecution::processing(1, 7, "hello", None).into_execution(10)
    }

    #[test]
    fn execution_lifecycle_completed() {
        let mut exec = processing();
        assert_eq!(exec.status, ExecutionStatus::Processing);
        assert!(exec.end_time.is_none());
        exec.check_invariants().unwrap();

        exec.complete("hi").unwrap();
        assert_eq!(exec.status, ExecutionStatus::Completed);
        assert_eq!(exec.output.as_deref(), Some("hi"));
        assert!(exec.end_time.unwrap() >= exec.start_time);
        assert!(exec.elapsed_ms().is_some());
        exec.check_invariants().unwrap();
    }

    #[test]
    fn execution_lifecycle_failed() {
        let mut exec = processing();
        exec.fail("upstream timed out").unwrap();
        assert_eq!(exec.status, ExecutionStatus::Failed);
        assert!(exec.output.is_none());
        assert_eq!(exec.error_message.as_deref(), Some("upstream timed out"));
        exec.check_invariants().unwrap();
    }

    #[test]
    fn terminal_states_never_regress() {
        let mut exec = processing();
        exec.complete("hi").unwrap();
        assert!(exec.fail("late").is_err());
        assert!(exec.complete("again").is_err());
        assert_eq!(exec.output.as_deref(), Some("hi"));

        let mut exec = processing();
        exec.fail("boom").unwrap();
        assert!(exec.complete("late").is_err());
        assert_eq!(exec.status, ExecutionStatus::Failed);
    }

    #[test]
    fn status_transitions() {
        use ExecutionStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Pending.can_transition_to(Failed));
        assert!(Processing.can_transition_to(Completed));
        assert!(!Processing.can_transition_to(Pending));
        assert!(!Processing.can_transition_to(Processing));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Completed));
    }

    #[test]
    fn status_is_terminal() {
        assert!(!ExecutionStatus::Pending.is_terminal());
        assert!(!ExecutionStatus::Processing.is_terminal());
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
    }

    #[test]
    fn status_string_roundtrip() {
        for s in ["pending", "processing", "completed", "failed"] {
            assert_eq!(ExecutionStatus::parse(s).unwrap().as_str(), s);
        }
        assert!(ExecutionStatus::parse("running").is_none());
    }

    #[test]
    fn invariant_check_catches_output_without_completion() {
        let mut exec = processing();
        exec.output = Some("sneaky".into());
        assert!(matches!(
            exec.check_invariants(),
            Err(Error::Integrity { execution_id: 10, .. })
        ));
    }
}
