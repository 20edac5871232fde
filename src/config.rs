use anyhow::Result;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;

pub mod engine;

pub use engine::{EngineConfig, FeeTable};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub stripe_api_url: String,
    pub stripe_secret_key: String,
    pub webhook_secret: String,
    pub notify_endpoint: Option<String>,
    pub close_schedule: String,
    pub due_payout_schedule: String,
    pub capture_schedule: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok(); // Load .env file if present

        Ok(Config {
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            database_url: env::var("DATABASE_URL")?,
            stripe_api_url: env::var("STRIPE_API_URL")
                .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
            stripe_secret_key: env::var("STRIPE_SECRET_KEY")?,
            webhook_secret: env::var("WEBHOOK_SECRET")?,
            notify_endpoint: env::var("NOTIFY_ENDPOINT").ok(),
            // Six-field cron expressions (with seconds), platform time.
            close_schedule: env::var("CLOSE_SCHEDULE")
                .unwrap_or_else(|_| "0 0 0 1 * *".to_string()),
            due_payout_schedule: env::var("DUE_PAYOUT_SCHEDULE")
                .unwrap_or_else(|_| "0 0 1 * * *".to_string()),
            capture_schedule: env::var("CAPTURE_SCHEDULE")
                .unwrap_or_else(|_| "0 15 * * * *".to_string()),
        })
    }
}
