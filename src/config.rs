use crate::error::Result;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Tunables for the engine, layered defaults -> TOML file -> `CAFEOS_*` env.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Prefix of generated QR codes and payment references.
    pub qr_prefix: String,
    /// Refuse to open a second concurrent session against one purchase.
    pub single_active_check_in: bool,
    /// Refresh period of the live session timer.
    pub tick_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            qr_prefix: "CAFEOS".to_string(),
            single_active_check_in: false,
            tick_interval_ms: 1000,
        }
    }
}

impl EngineConfig {
    /// Loads the configuration, reading `file` when given.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));
        if let Some(path) = file {
            figment = figment.merge(Toml::file(path));
        }
        let config = figment.merge(Env::prefixed("CAFEOS_")).extract()?;
        Ok(config)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        figment::Jail::expect_with(|_jail| {
            let config = EngineConfig::load(None).unwrap();
            assert_eq!(config, EngineConfig::default());
            assert_eq!(config.tick_interval(), Duration::from_secs(1));
            Ok(())
        });
    }

    #[test]
    fn test_file_then_env_override() {
        figment::Jail::expect_with(|jail| {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            writeln!(file, "qr_prefix = \"CYBER\"").unwrap();
            writeln!(file, "tick_interval_ms = 250").unwrap();
            jail.set_env("CAFEOS_SINGLE_ACTIVE_CHECK_IN", "true");
            jail.set_env("CAFEOS_TICK_INTERVAL_MS", "500");

            let config = EngineConfig::load(Some(file.path())).unwrap();
            assert_eq!(config.qr_prefix, "CYBER");
            assert!(config.single_active_check_in);
            assert_eq!(config.tick_interval_ms, 500);
            Ok(())
        });
    }
}
