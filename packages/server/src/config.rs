use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub campaign_api_key: String,
    pub campaign_api_base: String,
    pub openrouter_api_key: String,
    pub openrouter_model: String,
    pub google_access_token: String,
    pub spreadsheet_id: String,
    pub agent_name: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            campaign_api_key: env::var("CAMPAIGN_API_KEY")
                .context("CAMPAIGN_API_KEY must be set")?,
            campaign_api_base: env::var("CAMPAIGN_API_BASE")
                .unwrap_or_else(|_| "https://api.instantly.ai".to_string()),
            openrouter_api_key: env::var("OPENROUTER_API_KEY")
                .context("OPENROUTER_API_KEY must be set")?,
            openrouter_model: env::var("OPENROUTER_MODEL")
                .unwrap_or_else(|_| "openai/gpt-4o-mini".to_string()),
            google_access_token: env::var("GOOGLE_ACCESS_TOKEN")
                .context("GOOGLE_ACCESS_TOKEN must be set")?,
            spreadsheet_id: env::var("SPREADSHEET_ID").context("SPREADSHEET_ID must be set")?,
            agent_name: env::var("AGENT_NAME").unwrap_or_else(|_| "sheet agent".to_string()),
        })
    }
}
