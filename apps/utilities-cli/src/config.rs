use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};
use std::path::Path;
use utilities_http::TransportDefaults;

/// Prefix of environment overrides, e.g. `UTILITIES__LOGGING__LEVEL=debug`.
pub const ENV_PREFIX: &str = "UTILITIES__";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `warn` or `utilities_http=debug`
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_owned(),
            format: LogFormat::Text,
        }
    }
}

/// Effective configuration of the CLI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub transport: TransportDefaults,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Layered load: defaults, then the YAML file (if any), then
    /// `UTILITIES__*` environment variables.
    ///
    /// # Errors
    /// Fails when the file is missing or any layer does not match the schema.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(path) = path {
            if !path.is_file() {
                anyhow::bail!("config file does not exist: {}", path.display());
            }
            figment = figment.merge(Yaml::file_exact(path));
        }

        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("invalid configuration")
    }

    /// `-v` raises the log level to info, `-vv` to debug, `-vvv` to trace.
    pub fn apply_verbosity(&mut self, verbose: u8) {
        let level = match verbose {
            0 => return,
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        level.clone_into(&mut self.logging.level);
    }

    /// # Errors
    /// Fails only if a value cannot be represented as JSON.
    pub fn to_pretty_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to render configuration")
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_defaults_without_file() {
        temp_env::with_vars_unset(["UTILITIES__LOGGING__LEVEL"], || {
            let config = AppConfig::load(None).unwrap();
            assert_eq!(config, AppConfig::default());
        });
    }

    #[test]
    fn test_yaml_then_env_precedence() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "transport:\n  user_agent: from-yaml\n  pool_idle_timeout: 5s\nlogging:\n  level: info\n  format: json"
        )
        .unwrap();

        temp_env::with_var("UTILITIES__LOGGING__LEVEL", Some("debug"), || {
            let config = AppConfig::load(Some(file.path())).unwrap();
            assert_eq!(config.transport.user_agent, "from-yaml");
            assert_eq!(
                config.transport.pool_idle_timeout,
                Some(Duration::from_secs(5))
            );
            assert_eq!(config.logging.format, LogFormat::Json);
            assert_eq!(config.logging.level, "debug");
        });
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = AppConfig::load(Some(Path::new("/nonexistent/utilities.yaml"))).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "transport:\n  no_such_key: 1").unwrap();
        assert!(AppConfig::load(Some(file.path())).is_err());
    }

    #[test]
    fn test_verbosity() {
        let mut config = AppConfig::default();
        config.apply_verbosity(0);
        assert_eq!(config.logging.level, "warn");
        config.apply_verbosity(2);
        assert_eq!(config.logging.level, "debug");
        config.apply_verbosity(9);
        assert_eq!(config.logging.level, "trace");
    }
}
