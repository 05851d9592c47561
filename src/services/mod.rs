//! Process services shared by jobs: logging and alerts

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn default_filter() -> String {
    "modelops=info".to_string()
}

/// Initializes the global tracing subscriber
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggerService {
    /// Filter used when `RUST_LOG` is unset
    #[serde(default = "default_filter")]
    pub filter: String,
    /// Include the event target in each line
    #[serde(default)]
    pub with_target: bool,
}

impl Default for LoggerService {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            with_target: false,
        }
    }
}

impl LoggerService {
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Install the subscriber; returns false when one is already installed
    pub fn start(&self) -> bool {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.filter.as_str()));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(self.with_target)
            .try_init()
            .is_ok()
    }
}

fn default_enable() -> bool {
    true
}

fn default_app_name() -> String {
    "modelops".to_string()
}

/// Job notifications, written to the log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlertsService {
    #[serde(default = "default_enable")]
    pub enable: bool,
    #[serde(default = "default_app_name")]
    pub app_name: String,
}

impl Default for AlertsService {
    fn default() -> Self {
        Self {
            enable: default_enable(),
            app_name: default_app_name(),
        }
    }
}

impl AlertsService {
    pub fn disabled() -> Self {
        Self {
            enable: false,
            ..Self::default()
        }
    }

    pub fn notify(&self, title: &str, message: &str) {
        if self.enable {
            info!(app = %self.app_name, title, message, "Alert");
        }
    }

    pub fn warn(&self, title: &str, message: &str) {
        if self.enable {
            warn!(app = %self.app_name, title, message, "Alert");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logger_start_is_idempotent() {
        let logger = LoggerService::default().with_filter("modelops=debug");
        logger.start();
        assert!(!logger.start());
    }

    #[test]
    fn test_alerts_defaults() {
        let alerts: AlertsService = serde_json::from_str("{}").unwrap();
        assert!(alerts.enable);
        assert!(!AlertsService::disabled().enable);
        AlertsService::disabled().notify("title", "message");
    }
}
