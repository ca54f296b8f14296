//! Configuration loader.

use std::fs;
use std::path::Path;

use crate::error::ConfigError;
use crate::schema::HostConfig;

/// Configuration loader with environment variable substitution.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<HostConfig, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = fs::read_to_string(path)?;
        Self::load_str(&content)
    }

    /// Load configuration from a string.
    pub fn load_str(content: &str) -> Result<HostConfig, ConfigError> {
        let expanded = Self::expand_env_vars(content)?;
        let mut config: HostConfig = toml::from_str(&expanded)?;
        if let Some(dir) = config.logging.log_dir.take() {
            config.logging.log_dir = Some(Self::expand_path(&dir));
        }
        Ok(config)
    }

    /// Expand environment variables in the format `${VAR}`.
    fn expand_env_vars(content: &str) -> Result<String, ConfigError> {
        let mut result = content.to_string();
        let re = regex::Regex::new(r"\$\{([^}]+)\}").map_err(|e| ConfigError::InvalidValue {
            field: "pattern".to_string(),
            message: e.to_string(),
        })?;

        for cap in re.captures_iter(content) {
            let var_name = &cap[1];
            let var_value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotSet(var_name.to_string()))?;
            result = result.replace(&cap[0], &var_value);
        }

        Ok(result)
    }

    /// Expand shell-style paths (e.g., `~/.hostcore`).
    pub fn expand_path(path: &str) -> String {
        shellexpand::tilde(path).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::AllocatorKind;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_empty_config() {
        let config = ConfigLoader::load_str("").unwrap();
        assert_eq!(config.workers.max_workers, 4);
    }

    #[test]
    fn test_expand_path() {
        let expanded = ConfigLoader::expand_path("~/.hostcore");
        assert!(!expanded.starts_with('~'));
    }

    #[test]
    fn test_load_full_config() {
        let content = r#"
            [async_context]
            check = false
            initial_stack_capacity = 4

            [fatal]
            abort_on_uncaught_exception = true

            [workers]
            max_workers = 2

            [allocator]
            kind = "tracking"
            limit_bytes = 4096
        "#;
        let config = ConfigLoader::load_str(content).unwrap();
        assert!(!config.async_context.check);
        assert_eq!(config.async_context.initial_stack_capacity, 4);
        assert!(config.fatal.abort_on_uncaught_exception);
        assert_eq!(config.workers.max_workers, 2);
        assert_eq!(config.allocator.kind, AllocatorKind::Tracking);
        assert_eq!(config.allocator.limit_bytes, Some(4096));
    }

    #[test]
    fn test_env_var_expansion() {
        // SAFETY: test-local variable name, no other test reads it.
        unsafe { std::env::set_var("HOSTCORE_TEST_WORKERS", "7") };
        let config = ConfigLoader::load_str("[workers]\nmax_workers = ${HOSTCORE_TEST_WORKERS}\n").unwrap();
        assert_eq!(config.workers.max_workers, 7);
    }

    #[test]
    fn test_missing_env_var() {
        let result = ConfigLoader::load_str("[logging]\nlevel = \"${HOSTCORE_TEST_UNSET_VAR}\"\n");
        assert!(matches!(result, Err(ConfigError::EnvVarNotSet(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[teardown]\nmax_drain_iterations = 12").unwrap();
        let config = ConfigLoader::load(file.path()).unwrap();
        assert_eq!(config.teardown.max_drain_iterations, 12);
    }

    #[test]
    fn test_load_missing_file() {
        let result = ConfigLoader::load(Path::new("/nonexistent/hostcore.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_invalid_toml() {
        let result = ConfigLoader::load_str("[workers\nmax_workers = 1");
        assert!(matches!(result, Err(ConfigError::TomlParse(_))));
    }
}
