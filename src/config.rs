use std::fs;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub enable_tracing: bool,
    /// PostgreSQL connection URL; absent means the in-memory store
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default)]
    pub outbox: OutboxSettings,
    #[serde(default)]
    pub sweeper: SweeperSettings,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OutboxSettings {
    pub poll_interval_secs: u64,
    pub batch_size: usize,
}

impl Default for OutboxSettings {
    fn default() -> Self {
        Self { poll_interval_secs: 5, batch_size: 100 }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SweeperSettings {
    pub scan_interval_secs: u64,
    /// Time budget before a withdrawal counts as stuck
    pub withdrawal_stuck_after_secs: u64,
    /// Time budget before a deposit counts as stuck
    pub deposit_stuck_after_secs: u64,
    /// Report stuck candidates without mutating
    pub log_only: bool,
}

impl Default for SweeperSettings {
    fn default() -> Self {
        Self {
            scan_interval_secs: 60,
            withdrawal_stuck_after_secs: 24 * 3600,
            deposit_stuck_after_secs: 48 * 3600,
            log_only: false,
        }
    }
}

impl SweeperSettings {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    pub fn withdrawal_stuck_after(&self) -> Duration {
        Duration::from_secs(self.withdrawal_stuck_after_secs)
    }

    pub fn deposit_stuck_after(&self) -> Duration {
        Duration::from_secs(self.deposit_stuck_after_secs)
    }
}

impl AppConfig {
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("reading config file {}", config_path))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("parsing config file {}", config_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_sections() {
        let yaml = r#"
log_level: info
log_dir: ./logs
log_file: chainflow.log
use_json: false
rotation: daily
enable_tracing: true
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.outbox.batch_size, 100);
        assert_eq!(config.sweeper.scan_interval(), Duration::from_secs(60));
        assert!(config.postgres_url.is_none());
        assert!(!config.sweeper.log_only);
    }
}
