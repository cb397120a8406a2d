//! Discord bot event handler and voice receive handlers

use crate::commands;
use crate::config::Config;
use crate::delivery::{self, ChannelDelivery, Delivery};
use crate::resolver::{DiscordResolver, IdentityResolver};
use crate::session::{RecordingSession, SessionError, SessionRegistry};
use dashmap::DashMap;
use serenity::all::{
    Client, Context, EventHandler, GatewayIntents, GuildId, Http, Interaction, Ready, UserId,
};
use serenity::async_trait;
use songbird::events::{Event, EventContext, EventHandler as VoiceEventHandler};
use songbird::SerenityInit;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Bot state shared across handlers
pub struct BotState {
    pub config: Arc<Config>,
    pub registry: Arc<SessionRegistry>,
    pub resolver: Arc<dyn IdentityResolver>,
}

/// Main event handler for the bot
pub struct Handler {
    pub state: Arc<BotState>,
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("Logged in as {}", ready.user.name);

        let commands = commands::record::register();

        // If guild ID is set, register to specific guild (faster for dev)
        if let Some(guild_id) = self.state.config.guild_id {
            let guild = GuildId::new(guild_id);
            match guild.set_commands(&ctx.http, commands).await {
                Ok(cmds) => info!("Registered {} guild commands", cmds.len()),
                Err(e) => error!("Failed to register guild commands: {}", e),
            }
        } else {
            match serenity::all::Command::set_global_commands(&ctx.http, commands).await {
                Ok(cmds) => info!("Registered {} global commands", cmds.len()),
                Err(e) => error!("Failed to register global commands: {}", e),
            }
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            let result = match command.data.name.as_str() {
                "join" => commands::record::handle_join(&ctx, &command).await,
                "start" => {
                    commands::record::handle_start(&ctx, &command, self.state.clone()).await
                }
                "stop" => commands::record::handle_stop(&ctx, &command, self.state.clone()).await,
                "leave" => {
                    commands::record::handle_leave(&ctx, &command, self.state.clone()).await
                }
                _ => Ok(()),
            };

            if let Err(e) = result {
                error!("Command error: {}", e);
            }
        }
    }
}

/// Voice receive handler feeding one session.
///
/// Tracks the SSRC to user mapping from speaking-state updates and routes
/// each tick's decoded PCM to the session keyed by the speaking user.
#[derive(Clone)]
pub struct VoiceReceiver {
    session: Arc<RecordingSession>,
    ssrc_to_user: Arc<DashMap<u32, UserId>>,
}

impl VoiceReceiver {
    pub fn new(session: Arc<RecordingSession>) -> Self {
        Self {
            session,
            ssrc_to_user: Arc::new(DashMap::new()),
        }
    }

    fn user_for_ssrc(&self, ssrc: u32) -> UserId {
        // Fall back to the SSRC when no speaking-state update was seen yet
        self.ssrc_to_user
            .get(&ssrc)
            .map(|r| *r.value())
            .unwrap_or_else(|| UserId::new(ssrc as u64))
    }
}

#[async_trait]
impl VoiceEventHandler for VoiceReceiver {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        // Detach once the session is done so stale handlers don't pile up
        if self.session.is_finalized() {
            return Some(Event::Cancel);
        }

        match ctx {
            EventContext::SpeakingStateUpdate(speaking) => {
                if let Some(user_id) = speaking.user_id {
                    self.ssrc_to_user
                        .insert(speaking.ssrc, UserId::new(user_id.0));
                }
            }
            EventContext::VoiceTick(tick) => {
                for (ssrc, data) in &tick.speaking {
                    let Some(pcm) = &data.decoded_voice else {
                        continue;
                    };
                    if pcm.is_empty() {
                        continue;
                    }
                    let user_id = self.user_for_ssrc(*ssrc);
                    let bytes: Vec<u8> = pcm.iter().flat_map(|s| s.to_le_bytes()).collect();

                    match self.session.on_frame(user_id, &bytes) {
                        Ok(()) => {}
                        Err(SessionError::InvalidState(state)) => {
                            debug!("Frame from {} ignored in state {:?}", user_id, state);
                        }
                        Err(e) => error!("Frame routing failed for {}: {}", user_id, e),
                    }
                }
            }
            _ => {}
        }

        None
    }
}

/// Forces the session through the stop path when the voice connection
/// drops, so already-buffered audio still gets delivered.
pub struct DisconnectWatcher {
    pub guild_id: GuildId,
    pub state: Arc<BotState>,
    pub http: Arc<Http>,
}

#[async_trait]
impl VoiceEventHandler for DisconnectWatcher {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::DriverDisconnect(_) = ctx {
            let Some(session) = self.state.registry.get(self.guild_id) else {
                return Some(Event::Cancel);
            };
            let text_channel_id = session.text_channel_id;

            if let Some(result) = self.state.registry.cancel(self.guild_id) {
                match delivery::build_artifacts(&result, self.state.resolver.as_ref()).await {
                    Ok(artifacts) => {
                        let delivery = ChannelDelivery::new(self.http.clone(), text_channel_id);
                        if let Err(e) = delivery.deliver(artifacts).await {
                            error!("[{}] Delivery after disconnect failed: {}", self.guild_id, e);
                        }
                    }
                    Err(e) => {
                        error!("[{}] Encoding after disconnect failed: {}", self.guild_id, e)
                    }
                }
            }
            return Some(Event::Cancel);
        }

        None
    }
}

/// Create and run the Discord bot
pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = Arc::new(config);

    let registry = Arc::new(SessionRegistry::new(config.audio_format()));
    let resolver: Arc<dyn IdentityResolver> =
        Arc::new(DiscordResolver::new(config.discord_token.clone()));

    let state = Arc::new(BotState {
        config: config.clone(),
        registry,
        resolver,
    });

    let handler = Handler {
        state: state.clone(),
    };

    // Create client with voice support
    let intents = GatewayIntents::non_privileged() | GatewayIntents::GUILD_VOICE_STATES;

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird()
        .await?;

    info!("Starting bot...");
    client.start().await?;

    Ok(())
}
