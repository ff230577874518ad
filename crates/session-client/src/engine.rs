//! Seams to the external collaborators.
//!
//! The session layer ([`SessionTransport`]) and the media engine
//! ([`MediaEngine`]) execute commands and report results. Everything they
//! observe asynchronously (connection changes, roster batches, inbound chat,
//! media activity) comes back as [`EngineEvent`]s on the channel created by
//! [`engine_channel`].

use crate::errors::{DeviceError, JoinFailure, SdkError};
use crate::events::{
    ActiveShareChange, CurrentAudioChange, HostAskUnmuteAudio, MediaSdkChange,
    PassiveStopShareReason, PeerVideoStateChange, VideoDimensionChange,
};
use crate::types::{
    AudioLevel, ChatMessage, ChatPrivilege, ConnectionState, DependentAssets, Participant,
    SharePrivilege, UserId,
};
use async_trait::async_trait;
use secrecy::SecretString;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors reported by an external collaborator.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// Join refused with a classified reason.
    #[error("join refused: {0}")]
    JoinRefused(JoinFailure),

    /// Capture device failure.
    #[error("device failure: {0}")]
    Device(DeviceError),

    /// The remote side rejected the command.
    #[error("rejected: {0}")]
    Rejected(String),

    /// Transport failed before the command was acknowledged.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Unclassified collaborator failure.
    #[error("engine failure: {0}")]
    Internal(String),
}

impl From<EngineError> for SdkError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::JoinRefused(reason) => SdkError::JoinRejected(reason),
            EngineError::Device(device) => SdkError::Device(device),
            EngineError::Rejected(reason) => SdkError::Rejected(reason),
            EngineError::Transport(detail) | EngineError::Internal(detail) => {
                SdkError::Internal(detail)
            }
        }
    }
}

/// Join parameters handed to the session layer.
#[derive(Debug)]
pub struct JoinRequest {
    pub topic: String,
    /// Opaque bearer credential, validated server-side.
    pub token: SecretString,
    pub user_name: String,
    pub password: Option<SecretString>,
}

/// What the session layer reports on a successful join.
#[derive(Debug, Clone)]
pub struct JoinAccepted {
    pub session_id: String,
    /// Identity assigned to the local participant.
    pub user_id: UserId,
    /// Full roster at join time, including the local participant.
    pub participants: Vec<Participant>,
    pub chat_privilege: ChatPrivilege,
    pub share_privilege: SharePrivilege,
}

/// Network/session layer commands.
#[async_trait]
pub trait SessionTransport: Send + Sync + 'static {
    /// Configure runtime dependencies.
    async fn initialize(&self, locale: &str, assets: &DependentAssets)
        -> Result<(), EngineError>;

    /// Join a session. May stay pending indefinitely.
    async fn join(&self, request: JoinRequest) -> Result<JoinAccepted, EngineError>;

    /// Leave the session; `end_session` ends it for everyone.
    async fn leave(&self, end_session: bool) -> Result<(), EngineError>;

    async fn rename(&self, user_id: UserId, display_name: &str) -> Result<(), EngineError>;

    async fn remove_user(&self, user_id: UserId) -> Result<(), EngineError>;

    async fn make_host(&self, user_id: UserId) -> Result<(), EngineError>;

    async fn make_manager(&self, user_id: UserId) -> Result<(), EngineError>;

    async fn revoke_manager(&self, user_id: UserId) -> Result<(), EngineError>;

    /// Deliver a chat message to its recipients.
    async fn send_chat(&self, message: &ChatMessage) -> Result<(), EngineError>;

    /// Propagate a chat privilege change. The acknowledgement arrives later
    /// as [`EngineEvent::ChatPrivilegeChanged`].
    async fn set_chat_privilege(&self, privilege: ChatPrivilege) -> Result<(), EngineError>;
}

/// Media engine commands. Results may arrive long after the call when a
/// browser-style permission prompt is involved.
#[async_trait]
pub trait MediaEngine: Send + Sync + 'static {
    async fn start_audio(&self) -> Result<(), EngineError>;

    async fn stop_audio(&self) -> Result<(), EngineError>;

    async fn mute_audio(&self, user_id: UserId) -> Result<(), EngineError>;

    async fn unmute_audio(&self, user_id: UserId) -> Result<(), EngineError>;

    async fn start_video(&self) -> Result<(), EngineError>;

    async fn stop_video(&self) -> Result<(), EngineError>;

    async fn switch_camera(&self, device_id: &str) -> Result<(), EngineError>;

    async fn start_share(&self) -> Result<(), EngineError>;

    async fn stop_share(&self) -> Result<(), EngineError>;

    async fn pause_share(&self) -> Result<(), EngineError>;

    async fn resume_share(&self) -> Result<(), EngineError>;

    async fn set_share_privilege(&self, privilege: SharePrivilege) -> Result<(), EngineError>;
}

/// Asynchronous notifications from the collaborators.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    ConnectionChanged(ConnectionState),
    UsersAdded(Vec<Participant>),
    UsersRemoved(Vec<UserId>),
    /// Full current attribute values of the changed participants.
    UsersUpdated(Vec<Participant>),
    ChatReceived(ChatMessage),
    ChatPrivilegeChanged(ChatPrivilege),
    AudioActivity(Vec<AudioLevel>),
    ActiveShareChanged(ActiveShareChange),
    SharePrivilegeChanged(SharePrivilege),
    ShareStoppedPassively(PassiveStopShareReason),
    CurrentAudioChanged(CurrentAudioChange),
    PeerVideoStateChanged(PeerVideoStateChange),
    VideoDimensionChanged(VideoDimensionChange),
    HostAskUnmuteAudio(HostAskUnmuteAudio),
    MediaSdkChanged(MediaSdkChange),
}

impl EngineEvent {
    /// Bounded label for logs and metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            EngineEvent::ConnectionChanged(_) => "connection_changed",
            EngineEvent::UsersAdded(_) => "users_added",
            EngineEvent::UsersRemoved(_) => "users_removed",
            EngineEvent::UsersUpdated(_) => "users_updated",
            EngineEvent::ChatReceived(_) => "chat_received",
            EngineEvent::ChatPrivilegeChanged(_) => "chat_privilege_changed",
            EngineEvent::AudioActivity(_) => "audio_activity",
            EngineEvent::ActiveShareChanged(_) => "active_share_changed",
            EngineEvent::SharePrivilegeChanged(_) => "share_privilege_changed",
            EngineEvent::ShareStoppedPassively(_) => "share_stopped_passively",
            EngineEvent::CurrentAudioChanged(_) => "current_audio_changed",
            EngineEvent::PeerVideoStateChanged(_) => "peer_video_state_changed",
            EngineEvent::VideoDimensionChanged(_) => "video_dimension_changed",
            EngineEvent::HostAskUnmuteAudio(_) => "host_ask_unmute_audio",
            EngineEvent::MediaSdkChanged(_) => "media_sdk_changed",
        }
    }
}

/// Create the notification channel shared by the collaborators.
#[must_use]
pub fn engine_channel(buffer: usize) -> (mpsc::Sender<EngineEvent>, mpsc::Receiver<EngineEvent>) {
    mpsc::channel(buffer)
}
