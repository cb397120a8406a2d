//! Delivery of finished recordings to a text channel
//!
//! Turns a mixdown result into named WAV attachments plus a mention line
//! and posts them. Name resolution happens here, after finalize, so a slow
//! directory lookup never blocks the audio pipeline.

use crate::audio::encoder::{self, EncodeError, TRACK_EXTENSION};
use crate::audio::MixdownResult;
use crate::resolver::{fallback_name, IdentityResolver};
use async_trait::async_trait;
use serenity::all::{ChannelId, CreateAttachment, CreateMessage, Http};
use serenity::model::id::UserId;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

pub const MIXED_FILENAME: &str = "all_recording";

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("Discord send failed: {0}")]
    Discord(#[from] serenity::Error),
}

/// Everything the channel post needs, fully encoded and named.
pub struct RecordingArtifacts {
    /// Speakers to mention, in first-seen order
    pub mentions: Vec<UserId>,
    /// `user-<displayName>-<id>.wav` per speaker, first-seen order
    pub per_speaker_files: Vec<(String, Vec<u8>)>,
    /// The combined track, `all_recording.wav`
    pub mixed_file: (String, Vec<u8>),
}

/// Encode every track and resolve speaker names, falling back to the raw
/// ID when the directory misses.
pub async fn build_artifacts(
    result: &MixdownResult,
    resolver: &dyn IdentityResolver,
) -> Result<RecordingArtifacts, DeliveryError> {
    let mut mentions = Vec::with_capacity(result.tracks.len());
    let mut per_speaker_files = Vec::with_capacity(result.tracks.len());

    for (user_id, segment) in &result.tracks {
        let name = resolver
            .resolve(*user_id)
            .await
            .unwrap_or_else(|| fallback_name(*user_id));
        let filename = format!("user-{}-{}.{}", name, user_id, TRACK_EXTENSION);
        per_speaker_files.push((filename, encoder::encode_wav(segment)?));
        mentions.push(*user_id);
    }

    let mixed_file = (
        format!("{}.{}", MIXED_FILENAME, TRACK_EXTENSION),
        encoder::encode_wav(&result.combined)?,
    );

    Ok(RecordingArtifacts {
        mentions,
        per_speaker_files,
        mixed_file,
    })
}

/// The outward boundary the session pipeline hands its artifacts to.
#[async_trait]
pub trait Delivery: Send + Sync {
    async fn deliver(&self, artifacts: RecordingArtifacts) -> Result<(), DeliveryError>;
}

/// Posts the recording to a guild text channel.
pub struct ChannelDelivery {
    http: Arc<Http>,
    channel_id: ChannelId,
}

impl ChannelDelivery {
    pub fn new(http: Arc<Http>, channel_id: ChannelId) -> Self {
        Self { http, channel_id }
    }
}

#[async_trait]
impl Delivery for ChannelDelivery {
    async fn deliver(&self, artifacts: RecordingArtifacts) -> Result<(), DeliveryError> {
        let mention_line = artifacts
            .mentions
            .iter()
            .map(|id| format!("<@{}>", id))
            .collect::<Vec<_>>()
            .join(", ");

        let mut attachments: Vec<CreateAttachment> = artifacts
            .per_speaker_files
            .into_iter()
            .map(|(filename, bytes)| CreateAttachment::bytes(bytes, filename))
            .collect();
        attachments.push(CreateAttachment::bytes(
            artifacts.mixed_file.1,
            artifacts.mixed_file.0,
        ));

        let message = CreateMessage::new()
            .content(format!("Finished! Recorded audio for {}.", mention_line))
            .files(attachments);

        self.channel_id.send_message(&self.http, message).await?;
        info!(
            "Posted recording with {} speaker tracks to {}",
            artifacts.mentions.len(),
            self.channel_id
        );
        Ok(())
    }
}
