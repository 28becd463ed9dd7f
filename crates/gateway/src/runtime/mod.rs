//! Core runtime: the execution-chain engine.
//!
//! Entry point: [`ExecutionOrchestrator::run`] takes an agent, a user input
//! and an optional parent execution, and drives one persisted turn through
//! history reconstruction, generation and the terminal commit.

pub mod chain;
pub mod chain_lock;
pub mod orchestrator;

pub use chain::{ChainResolver, ChainWalk};
pub use chain_lock::ChainLockMap;
pub use orchestrator::{ExecutionOrchestrator, RunOutcome, RunRequest};
