use anyhow::Result;
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub port: u16,
    pub media_dir: String,
    pub initial_free_credits: i32,
    pub admin_token: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let initial_free_credits: i32 = env::var("INITIAL_FREE_CREDITS")
            .unwrap_or_else(|_| "3".to_string())
            .parse()?;
        if initial_free_credits < 0 {
            anyhow::bail!("INITIAL_FREE_CREDITS must not be negative");
        }

        Ok(Config {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/dream_quota".to_string()),
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            media_dir: env::var("MEDIA_DIR")
                .unwrap_or_else(|_| "./media".to_string()),
            initial_free_credits,
            admin_token: env::var("ADMIN_TOKEN").ok().filter(|t| !t.is_empty()),
        })
    }

    /// `DATABASE_URL=memory` runs against the in-process ledger.
    pub fn uses_memory_ledger(&self) -> bool {
        self.database_url == "memory"
    }
}
