//! `agentchain chain`: print a conversation from its root to an execution.

use std::sync::Arc;

use ac_domain::config::Config;
use ac_domain::execution::Execution;

use crate::bootstrap;

pub async fn chain(
    config: Arc<Config>,
    user_id: i64,
    execution_id: i64,
    json_output: bool,
) -> anyhow::Result<()> {
    let state = bootstrap::build_app_state(config)?;
    let chain = state.orchestrator.get_chain(execution_id, user_id).await?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&chain)?);
    } else {
        for exec in &chain {
            print!("{}", render(exec));
        }
    }
    Ok(())
}

fn render(exec: &Execution) -> String {
    let mut out = format!("#{} [{}]\n> {}\n", exec.id, exec.status, exec.input);
    match (&exec.output, &exec.error_message) {
        (Some(output), _) => out.push_str(&format!("{output}\n")),
        (None, Some(err)) => out.push_str(&format!("(failed: {err})\n")),
        (None, None) => out.push_str("(no output)\n"),
    }
    out.push('\n');
    out
}
