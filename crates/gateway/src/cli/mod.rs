pub mod chain;
pub mod config;
pub mod run;

use clap::{Parser, Subcommand};

/// agentchain: persisted multi-turn conversations with user-defined agents.
#[derive(Debug, Parser)]
#[command(name = "agentchain", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the HTTP server (default when no subcommand is given).
    Serve,
    /// Run one turn against an agent and print the response.
    Run {
        /// The user input for this turn.
        input: String,
        /// Caller's user id.
        #[arg(long)]
        user: i64,
        /// Agent to run.
        #[arg(long)]
        agent: i64,
        /// Continue the conversation ending at this execution.
        #[arg(long)]
        parent: Option<i64>,
        /// Print the full execution record as JSON instead of plain text.
        #[arg(long)]
        json: bool,
    },
    /// Print the conversation chain ending at an execution.
    Chain {
        execution_id: i64,
        /// Caller's user id.
        #[arg(long)]
        user: i64,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path specified by `AC_CONFIG` (or
/// `config.toml` by default). Returns the parsed [`Config`] and the
/// path that was used. A missing file yields the defaults.
///
/// [`Config`]: ac_domain::config::Config
pub fn load_config() -> anyhow::Result<(ac_domain::config::Config, String)> {
    let config_path = std::env::var("AC_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        ac_domain::config::Config::default()
    };

    Ok((config, config_path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_parses_parent() {
        let cli = Cli::parse_from([
            "agentchain", "run", "--user", "1", "--agent", "2", "--parent", "9", "hello",
        ]);
        match cli.command {
            Some(Command::Run {
                input,
                user,
                agent,
                parent,
                json,
            }) => {
                assert_eq!(input, "hello");
                assert_eq!((user, agent, parent, json), (1, 2, Some(9), false));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn no_subcommand_means_serve() {
        let cli = Cli::parse_from(["agentchain"]);
        assert!(cli.command.is_none());
    }
}
