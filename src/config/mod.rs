//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::game::GameRules;
use crate::util::time::DEFAULT_TICK_RATE;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS, comma separated ("*" for any)
    pub client_origin: String,
    /// Simulation ticks per second
    pub tick_rate: u32,
    /// Gameplay tuning shared by every match
    pub rules: GameRules,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string())
        };

        let defaults = GameRules::default();
        let tick_rate = parse_var("TICK_RATE", DEFAULT_TICK_RATE)?;
        if tick_rate == 0 {
            return Err(ConfigError::Invalid("TICK_RATE"));
        }

        let rounds_per_match = parse_var("ROUNDS_PER_MATCH", defaults.rounds_per_match)?;
        if rounds_per_match == 0 {
            return Err(ConfigError::Invalid("ROUNDS_PER_MATCH"));
        }

        let max_lives = parse_var("MAX_LIVES", defaults.max_lives)?;
        if max_lives == 0 {
            return Err(ConfigError::Invalid("MAX_LIVES"));
        }

        let invincibility_ms = parse_var(
            "INVINCIBILITY_MS",
            defaults.invincibility.as_millis() as u64,
        )?;

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            client_origin: env::var("CORS_ORIGIN").unwrap_or_else(|_| "*".to_string()),

            tick_rate,
            rules: GameRules {
                rounds_per_match,
                max_lives,
                invincibility: Duration::from_millis(invincibility_ms),
            },
        })
    }
}

/// Read an optional numeric variable, falling back to `default` when unset
fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_var_uses_default_when_unset() {
        let value: u32 = parse_var("INKDUEL_TEST_UNSET_VARIABLE", 7).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn parse_var_rejects_garbage() {
        env::set_var("INKDUEL_TEST_GARBAGE_VARIABLE", "five");
        let result: Result<u32, _> = parse_var("INKDUEL_TEST_GARBAGE_VARIABLE", 5);
        assert!(matches!(
            result,
            Err(ConfigError::Invalid("INKDUEL_TEST_GARBAGE_VARIABLE"))
        ));
    }
}
