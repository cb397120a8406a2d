//! Recording commands: /join, /start, /stop, /leave

use serenity::all::{
    CommandInteraction, Context, CreateCommand, CreateInteractionResponse,
    CreateInteractionResponseMessage, EditInteractionResponse,
};
use std::sync::Arc;
use tracing::{error, info};

use crate::bot::{BotState, DisconnectWatcher, VoiceReceiver};
use crate::delivery::{self, ChannelDelivery, Delivery};
use crate::session::SessionError;

/// Register recording commands
pub fn register() -> Vec<CreateCommand> {
    vec![
        CreateCommand::new("join").description("Join your voice channel"),
        CreateCommand::new("start").description("Start recording the voice channel"),
        CreateCommand::new("stop").description("Stop recording and post the tracks"),
        CreateCommand::new("leave").description("Leave the voice channel"),
    ]
}

/// Handle /join
pub async fn handle_join(
    ctx: &Context,
    command: &CommandInteraction,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let guild_id = command.guild_id.ok_or("Must be used in a guild")?;

    // Get the caller's voice channel from the guild cache
    let voice_channel_id = {
        let guild = ctx.cache.guild(guild_id).ok_or("Guild not in cache")?;
        guild
            .voice_states
            .get(&command.user.id)
            .and_then(|vs| vs.channel_id)
    };

    let Some(voice_channel_id) = voice_channel_id else {
        respond(ctx, command, "You're not in a voice channel right now.").await?;
        return Ok(());
    };

    command.defer(&ctx.http).await?;

    let manager = songbird::get(ctx).await.ok_or("Songbird not registered")?;
    manager.join(guild_id, voice_channel_id).await?;

    let response = EditInteractionResponse::new().content("Joined!");
    command.edit_response(&ctx.http, response).await?;

    info!("Joined voice channel {} in guild {}", voice_channel_id, guild_id);
    Ok(())
}

/// Handle /start
pub async fn handle_start(
    ctx: &Context,
    command: &CommandInteraction,
    state: Arc<BotState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let guild_id = command.guild_id.ok_or("Must be used in a guild")?;

    let in_voice = {
        let guild = ctx.cache.guild(guild_id).ok_or("Guild not in cache")?;
        guild
            .voice_states
            .get(&command.user.id)
            .and_then(|vs| vs.channel_id)
            .is_some()
    };
    if !in_voice {
        respond(ctx, command, "You're not in a voice channel right now.").await?;
        return Ok(());
    }

    let manager = songbird::get(ctx).await.ok_or("Songbird not registered")?;
    let Some(call) = manager.get(guild_id) else {
        respond(
            ctx,
            command,
            "I'm not in a voice channel right now. Use /join to make me join!",
        )
        .await?;
        return Ok(());
    };

    // One live session per guild
    let (session, done_rx) = match state.registry.begin(guild_id, command.channel_id) {
        Ok(pair) => pair,
        Err(SessionError::AlreadyRecording) => {
            respond(ctx, command, "A recording is already in progress.").await?;
            return Ok(());
        }
        Err(e) => return Err(Box::new(e)),
    };

    // Wire the voice intake to the session
    {
        let receiver = VoiceReceiver::new(session.clone());
        let mut handler = call.lock().await;
        handler.add_global_event(songbird::CoreEvent::SpeakingStateUpdate.into(), receiver.clone());
        handler.add_global_event(songbird::CoreEvent::VoiceTick.into(), receiver);
        handler.add_global_event(
            songbird::CoreEvent::DriverDisconnect.into(),
            DisconnectWatcher {
                guild_id,
                state: state.clone(),
                http: ctx.http.clone(),
            },
        );
    }

    // Log when the session lands in Finalized
    tokio::spawn(async move {
        if done_rx.await.is_ok() {
            info!("[{}] Session finalized", guild_id);
        }
    });

    respond(ctx, command, "The recording has started!").await?;
    info!("Started recording in guild {}", guild_id);
    Ok(())
}

/// Handle /stop
pub async fn handle_stop(
    ctx: &Context,
    command: &CommandInteraction,
    state: Arc<BotState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let guild_id = command.guild_id.ok_or("Must be used in a guild")?;

    let Some(session) = state.registry.get(guild_id) else {
        respond(ctx, command, "I am not currently recording.").await?;
        return Ok(());
    };
    let text_channel_id = session.text_channel_id;

    // Mixdown can take a moment on long sessions; keep it off the
    // gateway worker
    command.defer(&ctx.http).await?;

    let stop_outcome = {
        let registry = state.registry.clone();
        tokio::task::spawn_blocking(move || registry.stop(guild_id)).await?
    };
    let result = match stop_outcome {
        Ok(result) => result,
        Err(SessionError::NotRecording) => {
            let response =
                EditInteractionResponse::new().content("I am not currently recording.");
            command.edit_response(&ctx.http, response).await?;
            return Ok(());
        }
        Err(SessionError::EmptySession) => {
            let response = EditInteractionResponse::new()
                .content("The recording has stopped, but nobody said anything!");
            command.edit_response(&ctx.http, response).await?;
            return Ok(());
        }
        Err(e) => {
            error!("[{}] Finalize failed: {}", guild_id, e);
            let response = EditInteractionResponse::new()
                .content(format!("Recording failed to finalize: {}", e));
            command.edit_response(&ctx.http, response).await?;
            return Ok(());
        }
    };

    let artifacts = delivery::build_artifacts(&result, state.resolver.as_ref()).await?;
    ChannelDelivery::new(ctx.http.clone(), text_channel_id)
        .deliver(artifacts)
        .await?;

    let response = EditInteractionResponse::new().content("The recording has stopped!");
    command.edit_response(&ctx.http, response).await?;

    info!("Stopped recording in guild {}", guild_id);
    Ok(())
}

/// Handle /leave
pub async fn handle_leave(
    ctx: &Context,
    command: &CommandInteraction,
    state: Arc<BotState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let guild_id = command.guild_id.ok_or("Must be used in a guild")?;

    let manager = songbird::get(ctx).await.ok_or("Songbird not registered")?;
    if manager.get(guild_id).is_none() {
        respond(ctx, command, "I'm not in a voice channel right now.").await?;
        return Ok(());
    }

    command.defer(&ctx.http).await?;

    // A still-running recording is treated as cancelled, not lost
    if let Some(session) = state.registry.get(guild_id) {
        let text_channel_id = session.text_channel_id;
        if let Some(result) = state.registry.cancel(guild_id) {
            let artifacts = delivery::build_artifacts(&result, state.resolver.as_ref()).await?;
            ChannelDelivery::new(ctx.http.clone(), text_channel_id)
                .deliver(artifacts)
                .await?;
        }
    }

    manager.leave(guild_id).await?;

    let response = EditInteractionResponse::new().content("Exited the voice channel!");
    command.edit_response(&ctx.http, response).await?;

    info!("Left voice channel in guild {}", guild_id);
    Ok(())
}

/// Helper to send a response
async fn respond(
    ctx: &Context,
    command: &CommandInteraction,
    content: &str,
) -> Result<(), serenity::Error> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().content(content),
            ),
        )
        .await
}
