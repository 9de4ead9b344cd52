use std::env;

use thiserror::Error;

const DEV_JWT_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be a positive integer, got {value:?}")]
    NotAPositiveInt { name: &'static str, value: String },

    #[error("{name} must be a non-negative integer, got {value:?}")]
    NotANonNegativeInt { name: &'static str, value: String },

    #[error("DEV_TOKEN_USER must be a user id, got {0:?}")]
    BadDevTokenUser(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub listen_addr: String,
    pub jwt_secret: String,
    pub cors_origin: String,
    pub articles_per_page: i64,
    pub comments_per_page: i64,
    pub paginate_orphans: i64,
    /// When set, a bearer token for this user id is logged at startup.
    pub dev_token_user: Option<i64>,
}

impl Config {
    /// Reads the process environment (after `.env`, if present, has been loaded).
    pub fn from_env() -> Result<Config, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set, using the development secret");
            DEV_JWT_SECRET.to_string()
        });

        Ok(Config {
            database_url: lookup("DATABASE_URL").unwrap_or_else(|| "board.db".to_string()),
            listen_addr: lookup("LISTEN_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            jwt_secret,
            cors_origin: lookup("CORS_ORIGIN")
                .unwrap_or_else(|| "http://localhost:1313".to_string()),
            articles_per_page: positive(&lookup, "ARTICLES_PER_PAGE", 2)?,
            comments_per_page: positive(&lookup, "COMMENTS_PER_PAGE", 2)?,
            paginate_orphans: non_negative(&lookup, "PAGINATE_ORPHANS", 0)?,
            dev_token_user: match lookup("DEV_TOKEN_USER") {
                None => None,
                Some(v) => Some(v.trim().parse().map_err(|_| ConfigError::BadDevTokenUser(v))?),
            },
        })
    }
}

fn positive<F>(lookup: &F, name: &'static str, default: i64) -> Result<i64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => match value.trim().parse::<i64>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(ConfigError::NotAPositiveInt { name, value }),
        },
    }
}

fn non_negative<F>(lookup: &F, name: &'static str, default: i64) -> Result<i64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => match value.trim().parse::<i64>() {
            Ok(n) if n >= 0 => Ok(n),
            _ => Err(ConfigError::NotANonNegativeInt { name, value }),
        },
    }
}
