use chrono::{Duration, Utc};
use dotenv::dotenv;
use crate::errors::{ErrorKind, Result};
use std::env;

const DEFAULT_DATABASE_URL: &str = "conduit.db";
const DEFAULT_POOL_SIZE: u32 = 8;
const DEFAULT_TOKEN_TTL_HOURS: i64 = 24;

pub const IN_MEMORY_DATABASE: &str = ":memory:";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub pool_size: u32,
    pub jwt_secret: String,
    pub token_ttl: Duration,
}

impl Config {
    /// Reads `.env` (if present) and then the process environment.
    pub fn from_env() -> Result<Config> {
        dotenv().ok();

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());

        let pool_size = match env::var("DATABASE_POOL_SIZE") {
            Ok(size) => size.parse::<u32>()?,
            Err(_) => DEFAULT_POOL_SIZE,
        };

        let jwt_secret = match env::var("JWT_SECRET") {
            Ok(ref secret) if secret.trim().is_empty() => {
                return Err(ErrorKind::MissingSetting("JWT_SECRET").into())
            }
            Ok(secret) => secret,
            Err(_) => return Err(ErrorKind::MissingSetting("JWT_SECRET").into()),
        };

        let token_ttl = match env::var("TOKEN_TTL_HOURS") {
            Ok(hours) => token_ttl(&hours)?,
            Err(_) => Duration::hours(DEFAULT_TOKEN_TTL_HOURS),
        };

        Ok(Config {
            database_url,
            pool_size,
            jwt_secret,
            token_ttl,
        })
    }

    /// A single-connection in-memory configuration, used by tests.
    pub fn in_memory(jwt_secret: &str) -> Config {
        Config {
            database_url: IN_MEMORY_DATABASE.to_string(),
            pool_size: 1,
            jwt_secret: jwt_secret.to_string(),
            token_ttl: Duration::hours(DEFAULT_TOKEN_TTL_HOURS),
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_url == IN_MEMORY_DATABASE
    }
}

/// Parses `TOKEN_TTL_HOURS`. The lifetime must be positive and leave an expiry
/// that a timestamp can still represent.
fn token_ttl(hours: &str) -> Result<Duration> {
    let invalid = || ErrorKind::InvalidSetting("TOKEN_TTL_HOURS", hours.to_string());
    let ttl = Duration::try_hours(hours.trim().parse::<i64>()?).ok_or_else(invalid)?;
    if ttl <= Duration::zero() || Utc::now().checked_add_signed(ttl).is_none() {
        return Err(invalid().into());
    }
    Ok(ttl)
}
