//! Configuration management
//!
//! Loads settings from environment variables (.env file)

use crate::audio::AudioFormat;
use std::env;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Discord bot token
    pub discord_token: String,
    /// Optional guild ID for development (faster command sync)
    pub guild_id: Option<u64>,
    /// Audio sample rate (Discord uses 48kHz)
    pub sample_rate: u32,
    /// Audio channels (Discord uses stereo)
    pub channels: u16,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let discord_token = env::var("DISCORD_TOKEN")
            .map_err(|_| ConfigError::MissingEnvVar("DISCORD_TOKEN".to_string()))?;

        let guild_id = env::var("GUILD_ID")
            .ok()
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<u64>()
                    .map_err(|_| ConfigError::InvalidValue("GUILD_ID".to_string(), s))
            })
            .transpose()?;

        Ok(Self {
            discord_token,
            guild_id,
            sample_rate: 48_000,
            channels: 2,
        })
    }

    /// The format voice frames arrive in.
    pub fn audio_format(&self) -> AudioFormat {
        AudioFormat {
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }
}
