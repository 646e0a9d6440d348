//! Runtime configuration, read from the environment once at startup.
//!
//! The service is configured the way its adapters deploy it: plain
//! environment variables, no config file. Every knob has a workable default
//! so `watchdeck serve` runs out of the box against the bundled Standing
//! Orders document.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_owned())
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

fn env_f64(name: &str, default: f64) -> f64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_u16(name: &str, default: u16) -> u16 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sections
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// HTTP bind address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8787,
        }
    }
}

/// Advisory planner client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisoryConfig {
    /// `"stub"` echoes the fallback proposal; `"planner"` calls `url`.
    pub mode: String,
    pub url: String,
    pub model: String,
    pub timeout_sec: f64,
    /// Contract schema path (`intent_proposal.json`).
    pub contract_path: PathBuf,
}

impl Default for AdvisoryConfig {
    fn default() -> Self {
        Self {
            mode: "stub".into(),
            url: "http://127.0.0.1:11434/api/generate".into(),
            model: "phi3:mini".into(),
            timeout_sec: 8.0,
            contract_path: PathBuf::from("contracts/intent_proposal.json"),
        }
    }
}

/// Actuator gates and endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActuatorConfig {
    pub enable_actuators: bool,
    pub enable_keypress: bool,
    /// Process names that must be running before a keypress is injected.
    pub keypress_allowed_processes: Vec<String>,
    pub lights_webhook_url: Option<String>,
    /// URL template with a `{scene}` placeholder; wins over the plain URL.
    pub lights_webhook_url_template: Option<String>,
    pub lights_webhook_timeout_sec: f64,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            enable_actuators: true,
            enable_keypress: false,
            keypress_allowed_processes: vec![
                "elitedangerous64.exe".into(),
                "elitedangerous.exe".into(),
            ],
            lights_webhook_url: None,
            lights_webhook_url_template: None,
            lights_webhook_timeout_sec: 5.0,
        }
    }
}

/// Watch-condition supervisor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    pub interval_sec: u64,
    /// Hard override from `WATCH_CONDITION`; skips derivation entirely.
    pub force_watch_condition: Option<String>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            interval_sec: 5,
            force_watch_condition: None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub advisory: AdvisoryConfig,
    #[serde(default)]
    pub actuators: ActuatorConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default = "d_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "d_standing_orders_path")]
    pub standing_orders_path: PathBuf,
    #[serde(default = "d_default_watch_condition")]
    pub default_watch_condition: String,
    /// Override for the foreground-process probe on hosts without a native
    /// window probe (the adapters own the real probe).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreground_process: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            advisory: AdvisoryConfig::default(),
            actuators: ActuatorConfig::default(),
            supervisor: SupervisorConfig::default(),
            db_path: d_db_path(),
            standing_orders_path: d_standing_orders_path(),
            default_watch_condition: d_default_watch_condition(),
            foreground_process: None,
        }
    }
}

fn d_db_path() -> PathBuf {
    PathBuf::from("data/watchdeck.db")
}

fn d_standing_orders_path() -> PathBuf {
    PathBuf::from("config/standing_orders.json")
}

fn d_default_watch_condition() -> String {
    "STANDBY".into()
}

impl Config {
    /// Build the full configuration from the environment.
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig {
                host: env_string("HOST", "127.0.0.1"),
                port: env_u16("PORT", 8787),
            },
            advisory: AdvisoryConfig {
                mode: env_string("ADVISORY_MODE", "stub").to_lowercase(),
                url: env_string("ADVISORY_URL", "http://127.0.0.1:11434/api/generate"),
                model: env_string("ADVISORY_MODEL", "phi3:mini"),
                timeout_sec: env_f64("ADVISORY_TIMEOUT_SEC", 8.0),
                contract_path: PathBuf::from(env_string(
                    "CONTRACT_PATH",
                    "contracts/intent_proposal.json",
                )),
            },
            actuators: ActuatorConfig {
                enable_actuators: env_bool("ENABLE_ACTUATORS", true),
                enable_keypress: env_bool("ENABLE_KEYPRESS", false),
                keypress_allowed_processes: env_string(
                    "KEYPRESS_ALLOWED_PROCESSES",
                    "EliteDangerous64.exe,EliteDangerous.exe",
                )
                .split(',')
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
                lights_webhook_url: env_opt("LIGHTS_WEBHOOK_URL"),
                lights_webhook_url_template: env_opt("LIGHTS_WEBHOOK_URL_TEMPLATE"),
                lights_webhook_timeout_sec: env_f64("LIGHTS_WEBHOOK_TIMEOUT_SEC", 5.0),
            },
            supervisor: SupervisorConfig {
                interval_sec: env_u64("SUPERVISOR_INTERVAL_SEC", 5),
                force_watch_condition: env_opt("WATCH_CONDITION").map(|v| v.to_uppercase()),
            },
            db_path: PathBuf::from(env_string("DB_PATH", "data/watchdeck.db")),
            standing_orders_path: PathBuf::from(env_string(
                "STANDING_ORDERS_PATH",
                "config/standing_orders.json",
            )),
            default_watch_condition: env_string("DEFAULT_WATCH_CONDITION", "STANDBY")
                .to_uppercase(),
            foreground_process: env_opt("FOREGROUND_PROCESS"),
        }
    }

    /// Validate the configuration and return a list of issues.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must be greater than 0".into(),
            });
        }
        if self.server.host.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.host".into(),
                message: "host must not be empty".into(),
            });
        }
        if !matches!(self.advisory.mode.as_str(), "stub" | "disabled" | "planner") {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "advisory.mode".into(),
                message: format!(
                    "mode must be stub, disabled, or planner (got \"{}\")",
                    self.advisory.mode
                ),
            });
        }
        if self.advisory.mode == "planner"
            && !self.advisory.url.starts_with("http://")
            && !self.advisory.url.starts_with("https://")
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "advisory.url".into(),
                message: format!(
                    "url must start with http:// or https:// (got \"{}\")",
                    self.advisory.url
                ),
            });
        }
        if self.advisory.timeout_sec <= 0.0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "advisory.timeout_sec".into(),
                message: "timeout must be positive".into(),
            });
        }
        if self.actuators.lights_webhook_timeout_sec <= 0.0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "actuators.lights_webhook_timeout_sec".into(),
                message: "timeout must be positive".into(),
            });
        }
        if !crate::requests::WATCH_CONDITIONS.contains(&self.default_watch_condition.as_str()) {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "default_watch_condition".into(),
                message: format!(
                    "must be one of: {}",
                    crate::requests::WATCH_CONDITIONS.join(", ")
                ),
            });
        }
        if self.actuators.enable_keypress && self.actuators.keypress_allowed_processes.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "actuators.keypress_allowed_processes".into(),
                message: "keypress enabled with an empty allowed-process list".into(),
            });
        }
        if self.supervisor.interval_sec == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "supervisor.interval_sec".into(),
                message: "interval must be greater than 0".into(),
            });
        }

        errors
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find_issue<'a>(issues: &'a [ConfigError], field_prefix: &str) -> Option<&'a ConfigError> {
        issues.iter().find(|e| e.field.starts_with(field_prefix))
    }

    #[test]
    fn default_config_passes() {
        let issues = Config::default().validate();
        let errors: Vec<_> = issues
            .iter()
            .filter(|e| e.severity == ConfigSeverity::Error)
            .collect();
        assert!(errors.is_empty(), "expected no errors, got: {errors:?}");
    }

    #[test]
    fn port_zero_is_error() {
        let mut cfg = Config::default();
        cfg.server.port = 0;
        let issues = cfg.validate();
        assert!(find_issue(&issues, "server.port").is_some());
    }

    #[test]
    fn bad_advisory_mode_is_error() {
        let mut cfg = Config::default();
        cfg.advisory.mode = "oracle".into();
        let issues = cfg.validate();
        assert!(find_issue(&issues, "advisory.mode").is_some());
    }

    #[test]
    fn planner_mode_requires_http_url() {
        let mut cfg = Config::default();
        cfg.advisory.mode = "planner".into();
        cfg.advisory.url = "tcp://somewhere".into();
        let issues = cfg.validate();
        assert!(find_issue(&issues, "advisory.url").is_some());
    }

    #[test]
    fn bad_default_watch_condition_is_error() {
        let mut cfg = Config::default();
        cfg.default_watch_condition = "COMBAT".into();
        let issues = cfg.validate();
        assert!(find_issue(&issues, "default_watch_condition").is_some());
    }

    #[test]
    fn keypress_without_allowed_processes_warns() {
        let mut cfg = Config::default();
        cfg.actuators.enable_keypress = true;
        cfg.actuators.keypress_allowed_processes.clear();
        let issues = cfg.validate();
        let issue = find_issue(&issues, "actuators.keypress_allowed_processes").unwrap();
        assert_eq!(issue.severity, ConfigSeverity::Warning);
    }

    #[test]
    fn config_error_display_format() {
        let err = ConfigError {
            severity: ConfigSeverity::Error,
            field: "server.port".into(),
            message: "port must be greater than 0".into(),
        };
        assert_eq!(format!("{err}"), "[ERROR] server.port: port must be greater than 0");
    }
}
