use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};

/// Longest accepted token lifetime, in days.
pub const MAX_TOKEN_TTL_DAYS: i64 = 3650;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub addr: SocketAddr,
    pub token_ttl_days: i64,
    pub bootstrap_admin: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = var("HUDDLE_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("HUDDLE_JWT_SECRET is unset or still a placeholder; set it in your .env file");
        }

        let db_path = var("HUDDLE_DB_PATH").unwrap_or_else(|| "huddle.db".into()).into();
        let host = var("HUDDLE_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = var("HUDDLE_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("HUDDLE_PORT must be a port number")?;
        let addr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        let token_ttl_days = match var("HUDDLE_TOKEN_TTL_DAYS") {
            Some(v) => v.parse().context("HUDDLE_TOKEN_TTL_DAYS must be a number")?,
            None => 30,
        };
        if !(1..=MAX_TOKEN_TTL_DAYS).contains(&token_ttl_days) {
            bail!("HUDDLE_TOKEN_TTL_DAYS must be between 1 and {}", MAX_TOKEN_TTL_DAYS);
        }

        let bootstrap_admin = var("HUDDLE_BOOTSTRAP_ADMIN")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        Ok(Self {
            jwt_secret,
            db_path,
            addr,
            token_ttl_days,
            bootstrap_admin,
        })
    }
}
