//! `check-config` command.

use std::path::Path;

use anyhow::bail;
use hostcore_config::{ConfigValidator, HostConfig};
use tracing::info;

/// Validate `config` and print the findings.
pub(crate) fn handle_check_config(config: &HostConfig, path: Option<&Path>) -> anyhow::Result<()> {
    let source = path.map_or_else(|| "<defaults>".to_string(), |p| p.display().to_string());
    let result = ConfigValidator::validate(config);

    for warning in &result.warnings {
        println!("warning: {}: {}", warning.path, warning.message);
    }
    for error in &result.errors {
        println!("error: {}: {}", error.path, error.message);
    }

    if !result.is_valid() {
        bail!("{} has {} invalid value(s)", source, result.errors.len());
    }
    info!(source = %source, warnings = result.warnings.len(), "Configuration is valid");
    println!("{}: ok", source);
    Ok(())
}
