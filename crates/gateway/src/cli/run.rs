//! `agentchain run`: one-shot turn.
//!
//! Boots the store and providers without an HTTP listener, runs a single
//! turn and prints the output. The execution id goes to stderr so a script
//! can continue the conversation with `--parent`.

use std::sync::Arc;

use ac_domain::config::Config;

use crate::bootstrap;
use crate::runtime::RunRequest;

pub async fn run(
    config: Arc<Config>,
    user_id: i64,
    agent_id: i64,
    parent_execution_id: Option<i64>,
    input: String,
    json_output: bool,
) -> anyhow::Result<()> {
    let state = bootstrap::build_app_state(config)?;

    let outcome = state
        .orchestrator
        .run(
            user_id,
            RunRequest {
                agent_id,
                input,
                parent_execution_id,
            },
        )
        .await?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("{}", outcome.output);
        eprintln!("execution_id={}", outcome.execution.id);
    }
    Ok(())
}
