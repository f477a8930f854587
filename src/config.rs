//! Configuration, read from the environment at startup.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

const DEFAULT_BIND: &str = "127.0.0.1:9876";
const DEFAULT_DB_PATH: &str = "./data/prowl.db";
const DEFAULT_POLL_MINUTES: u64 = 10;

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// GitHub personal access token (`GITHUB_PAT`). Optional here so
    /// demo mode can run without one; the poller requires it.
    pub token: Option<SecretString>,
    /// Acting GitHub login (`GITHUB_USER`); resolved from the token
    /// when unset.
    pub username: Option<String>,
    /// Dashboard API bind address (`PROWL_BIND`).
    pub bind: String,
    /// Base polling interval (`PROWL_POLL_MINUTES`).
    pub poll_interval: Duration,
    /// Database file path (`PROWL_DB_PATH`).
    pub db_path: PathBuf,
    /// In-memory fixtures instead of GitHub polling (`PROWL_DEMO`).
    pub demo: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let token = std::env::var("GITHUB_PAT").ok().map(SecretString::from);
        let username = std::env::var("GITHUB_USER").ok().filter(|u| !u.is_empty());

        let bind = std::env::var("PROWL_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());

        let poll_interval = match std::env::var("PROWL_POLL_MINUTES") {
            Ok(raw) => parse_poll_minutes(&raw)?,
            Err(_) => Duration::from_secs(DEFAULT_POLL_MINUTES * 60),
        };

        let db_path = std::env::var("PROWL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DB_PATH));

        let demo = std::env::var("PROWL_DEMO")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Self { token, username, bind, poll_interval, db_path, demo })
    }
}

fn parse_poll_minutes(raw: &str) -> Result<Duration, ConfigError> {
    match raw.parse::<u64>() {
        Ok(minutes) if minutes > 0 => Ok(Duration::from_secs(minutes * 60)),
        _ => Err(ConfigError::InvalidValue {
            key: "PROWL_POLL_MINUTES".to_string(),
            message: format!("expected a positive number of minutes, got {raw:?}"),
        }),
    }
}

/// GitHub logins are alphanumeric with dashes; anything else points at
/// a mis-set environment variable.
pub fn valid_github_username(name: &str) -> bool {
    !name.is_empty()
        && regex::Regex::new("^[a-zA-Z0-9-]+$")
            .expect("username pattern is static")
            .is_match(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_minutes_parse() {
        assert_eq!(parse_poll_minutes("10").unwrap(), Duration::from_secs(600));
        assert!(parse_poll_minutes("0").is_err());
        assert!(parse_poll_minutes("-3").is_err());
        assert!(parse_poll_minutes("soon").is_err());
    }

    #[test]
    fn github_username_validation() {
        assert!(valid_github_username("octocat"));
        assert!(valid_github_username("oct-o-cat42"));
        assert!(!valid_github_username(""));
        assert!(!valid_github_username("not a login"));
        assert!(!valid_github_username("sneaky$(rm)"));
    }
}
