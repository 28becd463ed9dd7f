pub mod agent;
pub mod config;
pub mod error;
pub mod execution;
pub mod message;

pub use agent::{Agent, AgentDraft, AgentId, AgentPatch, UserId};
pub use error::{Error, Result};
pub use execution::{Execution, ExecutionId, ExecutionStatus, NewExecution};
pub use message::{Message, Role};
