//! Runtime configuration, read from `LEDGER_*` environment variables.

use std::env;
use std::str::FromStr;
use thiserror::Error;

use crate::model::UserId;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}: invalid value '{value}'")]
    Invalid { var: &'static str, value: String },
}

/// Which ledger store the process runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Memory,
    Postgres,
}

impl FromStr for Backend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Backend::Memory),
            "postgres" | "postgresql" => Ok(Backend::Postgres),
            _ => Err(()),
        }
    }
}

/// PostgreSQL connection settings.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "db".to_string(),
            port: 5432,
            user: "ledger_user".to_string(),
            password: "ledger_pass".to_string(),
            name: "ledger_db".to_string(),
            max_connections: 20,
            min_connections: 5,
            acquire_timeout_secs: 5,
        }
    }
}

/// Ledger configuration.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub backend: Backend,
    pub database: DatabaseConfig,
    /// Accounts provisioned at startup.
    pub bootstrap_users: Vec<UserId>,
    /// Upper bound on transactions processed concurrently.
    pub max_in_flight: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Memory,
            database: DatabaseConfig::default(),
            bootstrap_users: vec![1, 2, 3],
            max_in_flight: 64,
        }
    }
}

impl LedgerConfig {
    /// Build the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Build the configuration from an arbitrary variable source; unset
    /// variables keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let db = &mut config.database;

        if let Some(value) = lookup("LEDGER_BACKEND") {
            config.backend = value.parse().map_err(|_| ConfigError::Invalid {
                var: "LEDGER_BACKEND",
                value,
            })?;
        }
        if let Some(value) = lookup("LEDGER_DB_HOST") {
            db.host = value;
        }
        if let Some(value) = lookup("LEDGER_DB_PORT") {
            db.port = parse_var("LEDGER_DB_PORT", value)?;
        }
        if let Some(value) = lookup("LEDGER_DB_USER") {
            db.user = value;
        }
        if let Some(value) = lookup("LEDGER_DB_PASSWORD") {
            db.password = value;
        }
        if let Some(value) = lookup("LEDGER_DB_NAME") {
            db.name = value;
        }
        if let Some(value) = lookup("LEDGER_DB_MAX_CONNECTIONS") {
            db.max_connections = parse_var("LEDGER_DB_MAX_CONNECTIONS", value)?;
        }
        if let Some(value) = lookup("LEDGER_DB_MIN_CONNECTIONS") {
            db.min_connections = parse_var("LEDGER_DB_MIN_CONNECTIONS", value)?;
        }
        if let Some(value) = lookup("LEDGER_BOOTSTRAP_USERS") {
            config.bootstrap_users = parse_users(value)?;
        }
        if let Some(value) = lookup("LEDGER_MAX_IN_FLIGHT") {
            config.max_in_flight = parse_var("LEDGER_MAX_IN_FLIGHT", value)?;
            if config.max_in_flight == 0 {
                return Err(ConfigError::Invalid {
                    var: "LEDGER_MAX_IN_FLIGHT",
                    value: "0".to_string(),
                });
            }
        }

        Ok(config)
    }
}

fn parse_var<T: FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { var, value })
}

/// Comma separated list of user ids, e.g. `1,2,3`.
fn parse_users(value: String) -> Result<Vec<UserId>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<UserId>())
        .collect::<Result<_, _>>()
        .map_err(|_| ConfigError::Invalid {
            var: "LEDGER_BOOTSTRAP_USERS",
            value,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = LedgerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.backend, Backend::Memory);
        assert_eq!(config.bootstrap_users, vec![1, 2, 3]);
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.database.max_connections, 20);
        assert_eq!(config.database.min_connections, 5);
    }

    #[test]
    fn overrides_from_vars() {
        let config = LedgerConfig::from_lookup(lookup(&[
            ("LEDGER_BACKEND", "Postgres"),
            ("LEDGER_DB_HOST", "localhost"),
            ("LEDGER_DB_PORT", "6543"),
            ("LEDGER_BOOTSTRAP_USERS", "10, 11,12"),
            ("LEDGER_MAX_IN_FLIGHT", "8"),
        ]))
        .unwrap();

        assert_eq!(config.backend, Backend::Postgres);
        assert_eq!(config.database.host, "localhost");
        assert_eq!(config.database.port, 6543);
        assert_eq!(config.bootstrap_users, vec![10, 11, 12]);
        assert_eq!(config.max_in_flight, 8);
    }

    #[test]
    fn invalid_values_are_reported() {
        let err = LedgerConfig::from_lookup(lookup(&[("LEDGER_DB_PORT", "port")])).unwrap_err();
        assert!(err.to_string().contains("LEDGER_DB_PORT"));

        assert!(LedgerConfig::from_lookup(lookup(&[("LEDGER_BACKEND", "redis")])).is_err());
        assert!(LedgerConfig::from_lookup(lookup(&[("LEDGER_BOOTSTRAP_USERS", "1,x")])).is_err());
        assert!(LedgerConfig::from_lookup(lookup(&[("LEDGER_MAX_IN_FLIGHT", "0")])).is_err());
    }
}
