use ac_domain::config::{Config, ConfigSeverity};

/// Parse and validate the config, printing any issues. Returns `false`
/// when at least one error was found.
pub fn validate(config: &Config, config_path: &str) -> bool {
    let issues = config.validate();

    if issues.is_empty() {
        println!("Config OK ({config_path})");
        return true;
    }

    let error_count = issues
        .iter()
        .filter(|e| e.severity == ConfigSeverity::Error)
        .count();
    let warning_count = issues.len() - error_count;

    for issue in &issues {
        println!("{issue}");
    }
    println!("\n{error_count} error(s), {warning_count} warning(s) in {config_path}");

    error_count == 0
}

/// Dump the resolved config (with all defaults filled in) as TOML.
pub fn show(config: &Config) -> anyhow::Result<()> {
    let output = toml::to_string_pretty(config)
        .map_err(|e| anyhow::anyhow!("serializing config: {e}"))?;
    print!("{output}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates_without_errors() {
        // Warnings (no providers configured) do not fail validation.
        assert!(validate(&Config::default(), "config.toml"));
    }

    #[test]
    fn resolved_config_reparses() {
        let raw = toml::to_string_pretty(&Config::default()).unwrap();
        let back: Config = toml::from_str(&raw).unwrap();
        assert_eq!(back.engine.history_turns, 3);
    }
}
