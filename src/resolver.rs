//! Identity resolution via the Discord user directory
//!
//! Maps a speaker's user ID to a display name with a REST lookup. Injected
//! as a trait so delivery can be tested without the network; a miss always
//! degrades to the raw ID, never fails the delivery.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serenity::model::id::UserId;
use std::time::Duration;
use tracing::{debug, warn};

const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// `resolve(id) -> name` capability consumed by delivery.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Returns the display name, or None when the directory has no usable
    /// entry. Callers fall back to [`fallback_name`].
    async fn resolve(&self, user_id: UserId) -> Option<String>;
}

/// The raw identity string, used whenever resolution misses.
pub fn fallback_name(user_id: UserId) -> String {
    user_id.to_string()
}

/// Subset of the Discord user object we care about.
#[derive(Debug, Deserialize)]
struct UserProfile {
    username: String,
    discriminator: String,
}

/// Resolver backed by `GET /users/{id}` with bot-token auth.
pub struct DiscordResolver {
    client: Client,
    token: String,
}

impl DiscordResolver {
    pub fn new(token: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, token }
    }

    fn display_name(profile: &UserProfile) -> String {
        // Migrated accounts carry discriminator "0" and go by username alone
        if profile.discriminator == "0" || profile.discriminator.is_empty() {
            profile.username.clone()
        } else {
            format!("{}#{}", profile.username, profile.discriminator)
        }
    }
}

#[async_trait]
impl IdentityResolver for DiscordResolver {
    async fn resolve(&self, user_id: UserId) -> Option<String> {
        let url = format!("{}/users/{}", DISCORD_API_BASE, user_id);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bot {}", self.token))
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => match resp.json::<UserProfile>().await {
                Ok(profile) => {
                    let name = Self::display_name(&profile);
                    debug!("Resolved {} to {}", user_id, name);
                    Some(name)
                }
                Err(e) => {
                    warn!("Malformed user object for {}: {}", user_id, e);
                    None
                }
            },
            Ok(resp) => {
                warn!("User lookup for {} returned {}", user_id, resp.status());
                None
            }
            Err(e) => {
                warn!("User lookup for {} failed: {}", user_id, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_is_the_raw_identity() {
        assert_eq!(fallback_name(UserId::new(123456789)), "123456789");
    }

    #[test]
    fn legacy_discriminators_are_appended() {
        let profile = UserProfile {
            username: "coolguy123".into(),
            discriminator: "1234".into(),
        };
        assert_eq!(DiscordResolver::display_name(&profile), "coolguy123#1234");
    }

    #[test]
    fn migrated_accounts_use_the_bare_username() {
        let profile = UserProfile {
            username: "coolguy123".into(),
            discriminator: "0".into(),
        };
        assert_eq!(DiscordResolver::display_name(&profile), "coolguy123");
    }
}
