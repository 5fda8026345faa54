//! Server configuration read from the environment.
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ValidationError;
use crate::service::DEFAULT_MAX_ISSUANCE_UNITS;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub bind_addr: SocketAddr,
    pub max_sessions: usize,
    pub session_timeout: Duration,
    /// Largest number of whole units a generation record or an issuance may carry.
    pub max_issuance_units: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./rego-db"),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            max_sessions: 16,
            session_timeout: Duration::from_millis(5_000),
            max_issuance_units: DEFAULT_MAX_ISSUANCE_UNITS,
        }
    }
}

impl AppConfig {
    /// Load `.env` if present, then read the `REGO_*` variables.
    pub fn from_env() -> Result<Self, ValidationError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(path) = lookup("REGO_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Some(addr) = parsed(&lookup, "REGO_BIND_ADDR")? {
            config.bind_addr = addr;
        }
        if let Some(max) = parsed::<usize, _>(&lookup, "REGO_MAX_SESSIONS")? {
            if max == 0 {
                return Err(invalid("REGO_MAX_SESSIONS", "0"));
            }
            config.max_sessions = max;
        }
        if let Some(ms) = parsed::<u64, _>(&lookup, "REGO_SESSION_TIMEOUT_MS")? {
            config.session_timeout = Duration::from_millis(ms);
        }
        if let Some(max) = parsed::<u64, _>(&lookup, "REGO_MAX_ISSUANCE_UNITS")? {
            if max == 0 {
                return Err(invalid("REGO_MAX_ISSUANCE_UNITS", "0"));
            }
            config.max_issuance_units = max;
        }
        Ok(config)
    }
}

fn invalid(key: &str, value: &str) -> ValidationError {
    ValidationError::InvalidConfig {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parsed<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ValidationError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| invalid(key, &raw)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.max_sessions, 16);
        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.max_issuance_units, DEFAULT_MAX_ISSUANCE_UNITS);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = AppConfig::from_lookup(lookup(&[
            ("REGO_DB_PATH", "/tmp/rego"),
            ("REGO_BIND_ADDR", "127.0.0.1:8080"),
            ("REGO_MAX_SESSIONS", "4"),
            ("REGO_SESSION_TIMEOUT_MS", "250"),
            ("REGO_MAX_ISSUANCE_UNITS", "5000"),
        ]))
        .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/rego"));
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.max_sessions, 4);
        assert_eq!(config.session_timeout, Duration::from_millis(250));
        assert_eq!(config.max_issuance_units, 5_000);
    }

    #[test]
    fn garbage_is_rejected() {
        let err = AppConfig::from_lookup(lookup(&[("REGO_MAX_SESSIONS", "many")])).unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidConfig {
                key: "REGO_MAX_SESSIONS".into(),
                value: "many".into()
            }
        );
        assert!(AppConfig::from_lookup(lookup(&[("REGO_MAX_SESSIONS", "0")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("REGO_MAX_ISSUANCE_UNITS", "0")])).is_err());
    }
}
