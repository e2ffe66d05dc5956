use std::{str::FromStr, time::Duration};

use anyhow::{anyhow, Context};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub cors_origin: String,
    /// Shared secret the auth and booking collaborators present in `x-collaborator-key`.
    pub collaborator_key: String,
    pub session_idle_minutes: i64,
    pub db_max_connections: u32,
    pub outbound_queue: usize,
    pub otp_max_attempts: u32,
    pub otp_lockout: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Config> {
        dotenv::dotenv().ok();

        Ok(Config {
            database_url: var_or("DATABASE_URL", "sqlite://hopealong.db?mode=rwc"),
            bind_addr: var_or("BIND_ADDR", "0.0.0.0:5000"),
            cors_origin: var_or("CORS_ORIGIN", "http://localhost:5173"),
            collaborator_key: dotenv::var("COLLABORATOR_KEY")
                .map_err(|_| anyhow!("COLLABORATOR_KEY must be set"))?,
            session_idle_minutes: parse_or("SESSION_IDLE_MINUTES", 60)?,
            db_max_connections: parse_or("DB_MAX_CONNECTIONS", 16)?,
            outbound_queue: parse_or("OUTBOUND_QUEUE", 64)?,
            otp_max_attempts: parse_or("OTP_MAX_ATTEMPTS", 5)?,
            otp_lockout: Duration::from_secs(parse_or("OTP_LOCKOUT_SECS", 300)?),
        })
    }

    /// Settings for tests and local tooling; never reads the environment.
    pub fn for_tests() -> Config {
        Config {
            database_url: "sqlite::memory:".to_owned(),
            bind_addr: "127.0.0.1:0".to_owned(),
            cors_origin: "http://localhost:5173".to_owned(),
            collaborator_key: "test-key".to_owned(),
            session_idle_minutes: 60,
            db_max_connections: 1,
            outbound_queue: 16,
            otp_max_attempts: 3,
            otp_lockout: Duration::from_secs(300),
        }
    }
}

fn var_or(key: &str, default: &str) -> String {
    dotenv::var(key).unwrap_or_else(|_| default.to_owned())
}

fn parse_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match dotenv::var(key) {
        Ok(raw) => raw.trim().parse().with_context(|| format!("{key}={raw} is not valid")),
        Err(_) => Ok(default),
    }
}
