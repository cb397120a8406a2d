//! Session management for guild recording sessions
//!
//! One recording session per guild voice connection. Frames from the voice
//! driver are demultiplexed into per-speaker buffers while recording; stop
//! finalizes every buffer and runs the mixdown.

use crate::audio::buffer::BufferError;
use crate::audio::{mixer, AudioFormat, DecodeError, MixError, MixdownResult, SpeakerBuffer};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serenity::all::{ChannelId, GuildId, UserId};
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SessionError {
    #[error("a recording is already in progress")]
    AlreadyRecording,
    #[error("no recording is in progress")]
    NotRecording,
    #[error("session is not accepting frames in state {0:?}")]
    InvalidState(SessionState),
    #[error("nothing was recorded")]
    EmptySession,
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("mixdown failed: {0}")]
    Mix(MixError),
}

impl From<BufferError> for SessionError {
    fn from(e: BufferError) -> Self {
        match e {
            BufferError::Decode(d) => SessionError::Decode(d),
            BufferError::Finalized => SessionError::InvalidState(SessionState::Finalized),
        }
    }
}

impl From<MixError> for SessionError {
    fn from(e: MixError) -> Self {
        match e {
            MixError::EmptySession => SessionError::EmptySession,
            other => SessionError::Mix(other),
        }
    }
}

/// Strict lifecycle: Idle -> Recording -> Stopping -> Finalized.
/// No skipping and no re-entry; a finalized session is replaced, not reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Recording,
    Stopping,
    Finalized,
}

/// A recording session for a single guild voice connection.
#[derive(Debug)]
pub struct RecordingSession {
    /// Guild this session records
    pub guild_id: GuildId,
    /// Text channel the finished tracks are posted to
    pub text_channel_id: ChannelId,
    /// Audio format frames arrive in
    format: AudioFormat,
    /// Lifecycle state
    state: RwLock<SessionState>,
    /// When start() was accepted
    started_at: Mutex<Option<SystemTime>>,
    /// Per-speaker buffers, keyed by user
    buffers: DashMap<UserId, SpeakerBuffer>,
    /// First-frame-seen order of speakers
    order: Mutex<Vec<UserId>>,
    /// Fired exactly once when the session reaches Finalized
    done_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl RecordingSession {
    /// Create an idle session plus the receiver that resolves on finalize.
    pub fn new(
        guild_id: GuildId,
        text_channel_id: ChannelId,
        format: AudioFormat,
    ) -> (Arc<Self>, oneshot::Receiver<()>) {
        let (done_tx, done_rx) = oneshot::channel();
        let session = Arc::new(Self {
            guild_id,
            text_channel_id,
            format,
            state: RwLock::new(SessionState::Idle),
            started_at: Mutex::new(None),
            buffers: DashMap::new(),
            order: Mutex::new(Vec::new()),
            done_tx: Mutex::new(Some(done_tx)),
        });
        (session, done_rx)
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    pub fn is_finalized(&self) -> bool {
        self.state() == SessionState::Finalized
    }

    /// Open the session for frames.
    pub fn start(&self) -> Result<(), SessionError> {
        let mut state = self.state.write();
        if *state != SessionState::Idle {
            return Err(SessionError::AlreadyRecording);
        }
        *state = SessionState::Recording;
        *self.started_at.lock() = Some(SystemTime::now());
        info!("[{}] Recording started", self.guild_id);
        Ok(())
    }

    /// Route one speaker's frame to their buffer, creating the buffer on
    /// first sight. Frames for different speakers may arrive interleaved;
    /// frames for one speaker arrive in order.
    ///
    /// In-flight frames that land after stop() are dropped, not queued.
    pub fn on_frame(&self, user_id: UserId, frame: &[u8]) -> Result<(), SessionError> {
        match self.state() {
            SessionState::Recording => {}
            SessionState::Stopping => {
                debug!("[{}] Dropping late frame from {}", self.guild_id, user_id);
                return Ok(());
            }
            other => return Err(SessionError::InvalidState(other)),
        }

        match self.buffers.entry(user_id) {
            Entry::Occupied(mut entry) => entry.get_mut().append(frame)?,
            Entry::Vacant(entry) => {
                self.order.lock().push(user_id);
                debug!("[{}] First frame from {}", self.guild_id, user_id);
                entry.insert(SpeakerBuffer::new()).append(frame)?;
            }
        }
        Ok(())
    }

    /// Close intake, finalize every buffer and run the mixdown.
    ///
    /// The session always lands in Finalized, even when the mix fails or
    /// nothing was recorded; the error is returned rather than a partial
    /// result.
    pub fn stop(&self) -> Result<MixdownResult, SessionError> {
        {
            let mut state = self.state.write();
            if *state != SessionState::Recording {
                return Err(SessionError::NotRecording);
            }
            *state = SessionState::Stopping;
        }
        let elapsed = self
            .started_at
            .lock()
            .and_then(|t| t.elapsed().ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);
        info!(
            "[{}] Recording stopping after {}s, finalizing buffers",
            self.guild_id, elapsed
        );

        let outcome = self.finalize_all();
        self.seal();
        outcome
    }

    /// Connection loss: force the stop path with whatever was buffered.
    /// Cancellation, not error; an empty session yields None.
    pub fn cancel(&self) -> Option<MixdownResult> {
        {
            let mut state = self.state.write();
            match *state {
                SessionState::Recording => *state = SessionState::Stopping,
                // never started, mid-stop or already done: nothing to salvage
                SessionState::Idle | SessionState::Stopping | SessionState::Finalized => {
                    return None
                }
            }
        }
        warn!("[{}] Connection lost, finalizing early", self.guild_id);

        let outcome = self.finalize_all();
        self.seal();
        match outcome {
            Ok(result) => Some(result),
            Err(SessionError::EmptySession) => None,
            Err(e) => {
                warn!("[{}] Finalize after disconnect failed: {}", self.guild_id, e);
                None
            }
        }
    }

    fn finalize_all(&self) -> Result<MixdownResult, SessionError> {
        let order = self.order.lock().clone();
        let mut tracks = Vec::with_capacity(order.len());

        for user_id in order {
            if let Some((_, mut buffer)) = self.buffers.remove(&user_id) {
                debug!(
                    "[{}] Finalizing {} buffered bytes for {}",
                    self.guild_id,
                    buffer.byte_len(),
                    user_id
                );
                let segment = buffer.finalize(self.format)?.clone();
                tracks.push((user_id, segment));
            }
        }

        let result = mixer::combine(tracks)?;
        info!(
            "[{}] Mixdown complete: {} speakers, {}ms combined",
            self.guild_id,
            result.tracks.len(),
            result.combined.duration_ms()
        );
        Ok(result)
    }

    /// Land in Finalized and resolve the completion signal exactly once.
    fn seal(&self) {
        *self.state.write() = SessionState::Finalized;
        if let Some(tx) = self.done_tx.lock().take() {
            let _ = tx.send(());
        }
    }
}

/// Registry of live sessions, one per guild.
///
/// Replaces any global recording state; handlers reach sessions only
/// through this registry.
pub struct SessionRegistry {
    sessions: DashMap<GuildId, Arc<RecordingSession>>,
    format: AudioFormat,
}

impl SessionRegistry {
    pub fn new(format: AudioFormat) -> Self {
        Self {
            sessions: DashMap::new(),
            format,
        }
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<RecordingSession>> {
        self.sessions.get(&guild_id).map(|r| r.value().clone())
    }

    /// Create and start a session for the guild.
    ///
    /// Rejected while a previous session exists and has not finished
    /// finalizing, so a new start never overlaps an in-progress mixdown.
    pub fn begin(
        &self,
        guild_id: GuildId,
        text_channel_id: ChannelId,
    ) -> Result<(Arc<RecordingSession>, oneshot::Receiver<()>), SessionError> {
        if let Some(existing) = self.sessions.get(&guild_id) {
            if !existing.is_finalized() {
                return Err(SessionError::AlreadyRecording);
            }
        }

        let (session, done_rx) = RecordingSession::new(guild_id, text_channel_id, self.format);
        session.start()?;
        self.sessions.insert(guild_id, session.clone());
        Ok((session, done_rx))
    }

    /// Stop the guild's session and return the finished mixdown.
    /// The registry entry is released only after finalize completes.
    pub fn stop(&self, guild_id: GuildId) -> Result<MixdownResult, SessionError> {
        let session = self.get(guild_id).ok_or(SessionError::NotRecording)?;
        let outcome = session.stop();
        // Evict only the session we stopped; a restart that slipped in
        // after finalize must keep its fresh entry.
        self.sessions
            .remove_if(&guild_id, |_, live| Arc::ptr_eq(live, &session));
        outcome
    }

    /// Cancel the guild's session after a connection loss.
    pub fn cancel(&self, guild_id: GuildId) -> Option<MixdownResult> {
        let session = self.sessions.remove(&guild_id).map(|(_, s)| s)?;
        session.cancel()
    }
}
