//! Application configuration loaded from environment variables.

use std::path::PathBuf;

use workflow::WorkflowConfig;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: PostgreSQL history store; in-memory when unset
/// - `BACKUP_DIR`: directory for request backups; in-memory when unset
/// - `BONUS_SEED_FILE`: JSON list of bonus records loaded at startup
/// - `MAX_CONCURRENT_EXECUTIONS`, `MAX_CONCURRENT_NOTIFICATIONS`: fan-out caps
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub backup_dir: Option<PathBuf>,
    pub bonus_seed_file: Option<PathBuf>,
    pub workflow: WorkflowConfig,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut workflow = defaults.workflow;
        if let Some(n) = non_empty("MAX_CONCURRENT_EXECUTIONS").and_then(|v| v.parse().ok()) {
            workflow.max_concurrent_executions = n;
        }
        if let Some(n) = non_empty("MAX_CONCURRENT_NOTIFICATIONS").and_then(|v| v.parse().ok()) {
            workflow.max_concurrent_notifications = n;
        }

        Self {
            host: non_empty("HOST").unwrap_or(defaults.host),
            port: non_empty("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: non_empty("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: non_empty("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or_default(),
            database_url: non_empty("DATABASE_URL"),
            backup_dir: non_empty("BACKUP_DIR").map(PathBuf::from),
            bonus_seed_file: non_empty("BONUS_SEED_FILE").map(PathBuf::from),
            workflow,
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            backup_dir: None,
            bonus_seed_file: None,
            workflow: WorkflowConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.database_url.is_none());
        assert!(config.backup_dir.is_none());
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_reads_overrides() {
        let config = from_pairs(&[
            ("PORT", "8081"),
            ("LOG_FORMAT", "JSON"),
            ("DATABASE_URL", "postgres://localhost/redemptions"),
            ("BACKUP_DIR", "/var/lib/redemptions"),
            ("MAX_CONCURRENT_EXECUTIONS", "8"),
            ("MAX_CONCURRENT_NOTIFICATIONS", "2"),
        ]);

        assert_eq!(config.port, 8081);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/redemptions")
        );
        assert_eq!(
            config.backup_dir,
            Some(PathBuf::from("/var/lib/redemptions"))
        );
        assert_eq!(config.workflow.max_concurrent_executions, 8);
        assert_eq!(config.workflow.max_concurrent_notifications, 2);
    }

    #[test]
    fn test_invalid_numbers_fall_back_to_defaults() {
        let config = from_pairs(&[
            ("PORT", "not-a-port"),
            ("MAX_CONCURRENT_EXECUTIONS", "-1"),
            ("DATABASE_URL", "  "),
        ]);

        assert_eq!(config.port, 3000);
        assert_eq!(config.workflow.max_concurrent_executions, 64);
        assert!(config.database_url.is_none());
    }
}
