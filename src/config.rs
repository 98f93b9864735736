use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Serialized};
use serde::{Deserialize, Serialize};

use crate::error::DbError;

/// Environment variable prefix, e.g. `MEDTRACK_DATABASE_URL`.
pub const ENV_PREFIX: &str = "MEDTRACK_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// `sqlite:...` or `postgres://...`; the scheme selects the backend.
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    /// Extra connect attempts at startup before giving up.
    pub connect_retries: usize,
    pub loglevel: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite:medtrack.db?mode=rwc".to_string(),
            max_connections: 5,
            acquire_timeout_secs: 30,
            connect_retries: 3,
            loglevel: "info".to_string(),
        }
    }
}

impl Config {
    /// Defaults overridden by `MEDTRACK_*` environment variables.
    pub fn from_env() -> Result<Self, DbError> {
        Ok(Self::figment().extract()?)
    }

    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default())).merge(Env::prefixed(ENV_PREFIX))
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_without_env() {
        Jail::expect_with(|_jail| {
            let cfg = Config::from_env().expect("config");
            assert_eq!(cfg, Config::default());
            assert_eq!(cfg.acquire_timeout(), Duration::from_secs(30));
            Ok(())
        });
    }

    #[test]
    fn env_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.set_env("MEDTRACK_DATABASE_URL", "postgres://localhost/medtrack");
            jail.set_env("MEDTRACK_MAX_CONNECTIONS", "12");
            jail.set_env("MEDTRACK_LOGLEVEL", "debug");
            let cfg = Config::from_env().expect("config");
            assert_eq!(cfg.database_url, "postgres://localhost/medtrack");
            assert_eq!(cfg.max_connections, 12);
            assert_eq!(cfg.loglevel, "debug");
            assert_eq!(cfg.connect_retries, 3);
            Ok(())
        });
    }

    #[test]
    fn bad_value_is_config_error() {
        Jail::expect_with(|jail| {
            jail.set_env("MEDTRACK_MAX_CONNECTIONS", "many");
            assert!(matches!(Config::from_env(), Err(DbError::Config(_))));
            Ok(())
        });
    }
}
