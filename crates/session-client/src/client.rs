//! Application-facing client.
//!
//! [`SessionClient`] wires the event bus and the session actor together and
//! exposes the command surface. [`ChatClient`] and [`MediaStream`] are thin
//! views over the same actor handle.

use crate::actors::{AdminAction, SessionActor, SessionHandle};
use crate::chat::ChatTarget;
use crate::config::Config;
use crate::engine::{EngineEvent, JoinRequest, MediaEngine, SessionTransport};
use crate::errors::SdkError;
use crate::events::{EventBus, ListenerId, SessionEvent};
use crate::media::{MediaCommand, MediaOp, MediaState, ShareStatus};
use crate::types::{
    ChatMessage, ChatParty, ChatPrivilege, ConnectionState, DependentAssets, Participant,
    SessionInfo, SharePrivilege, UserId,
};
use secrecy::SecretString;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// A session client bound to one pair of collaborators.
///
/// Must be created inside a Tokio runtime.
pub struct SessionClient {
    config: Config,
    session: SessionHandle,
    bus: EventBus,
    cancel_token: CancellationToken,
    actor_task: JoinHandle<()>,
    dispatcher_task: JoinHandle<()>,
}

impl std::fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("session", &self.session)
            .field("is_cancelled", &self.cancel_token.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl SessionClient {
    /// Spawn the dispatcher and the session actor.
    ///
    /// `engine_events` is the receiving side of
    /// [`crate::engine::engine_channel`]; both collaborators send on it.
    pub fn new(
        config: Config,
        transport: Arc<dyn SessionTransport>,
        media_engine: Arc<dyn MediaEngine>,
        engine_events: mpsc::Receiver<EngineEvent>,
    ) -> Self {
        let cancel_token = CancellationToken::new();
        let (bus, dispatcher_task) = EventBus::spawn(cancel_token.child_token());
        let (session, actor_task) = SessionActor::spawn(
            &config,
            transport,
            media_engine,
            engine_events,
            bus.clone(),
            cancel_token.child_token(),
        );

        Self {
            config,
            session,
            bus,
            cancel_token,
            actor_task,
            dispatcher_task,
        }
    }

    /// Register a handler for event `E`.
    pub fn on<E, F>(&self, handler: F) -> ListenerId
    where
        E: SessionEvent,
        F: Fn(&E::Payload) + Send + Sync + 'static,
    {
        self.bus.on::<E, F>(handler)
    }

    /// Remove one handler for event `E`.
    pub fn off<E: SessionEvent>(&self, id: ListenerId) -> bool {
        self.bus.off::<E>(id)
    }

    /// The underlying event bus.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    /// Configure runtime dependencies. Required before any other command.
    pub async fn init(
        &self,
        locale: impl Into<String>,
        dependent_assets: DependentAssets,
    ) -> Result<(), SdkError> {
        self.session.init(locale.into(), dependent_assets).await
    }

    /// [`Self::init`] with the locale and assets from [`Config`].
    pub async fn init_from_config(&self) -> Result<(), SdkError> {
        self.session
            .init(
                self.config.locale.clone(),
                self.config.dependent_assets.clone(),
            )
            .await
    }

    #[instrument(skip_all, name = "sdk.client.join", fields(topic = %topic))]
    pub async fn join(
        &self,
        topic: &str,
        token: SecretString,
        user_name: &str,
        password: Option<SecretString>,
    ) -> Result<SessionInfo, SdkError> {
        self.session
            .join(JoinRequest {
                topic: topic.to_string(),
                token,
                user_name: user_name.to_string(),
                password,
            })
            .await
    }

    /// Leave the session. `end_session` ends it for everyone (host only).
    pub async fn leave(&self, end_session: bool) -> Result<(), SdkError> {
        self.session.leave(end_session).await
    }

    /// Rename a participant; `None` renames the local participant.
    pub async fn change_name(&self, name: &str, user_id: Option<UserId>) -> Result<(), SdkError> {
        self.session.change_name(name.to_string(), user_id).await
    }

    pub async fn remove_user(&self, user_id: UserId) -> Result<(), SdkError> {
        self.session.admin(AdminAction::RemoveUser, user_id).await
    }

    pub async fn make_host(&self, user_id: UserId) -> Result<(), SdkError> {
        self.session.admin(AdminAction::MakeHost, user_id).await
    }

    pub async fn make_manager(&self, user_id: UserId) -> Result<(), SdkError> {
        self.session.admin(AdminAction::MakeManager, user_id).await
    }

    pub async fn revoke_manager(&self, user_id: UserId) -> Result<(), SdkError> {
        self.session.admin(AdminAction::RevokeManager, user_id).await
    }

    pub async fn get_session_info(&self) -> Result<Option<SessionInfo>, SdkError> {
        self.session.session_info().await
    }

    pub async fn get_current_user_info(&self) -> Result<Option<Participant>, SdkError> {
        self.session.current_user().await
    }

    pub async fn get_all_user(&self) -> Result<Vec<Participant>, SdkError> {
        self.session.all_users().await
    }

    /// Look up one participant. `None` for ids not in the roster.
    pub async fn get_user(&self, user_id: UserId) -> Result<Option<Participant>, SdkError> {
        self.session.user(user_id).await
    }

    pub async fn get_session_host(&self) -> Result<Option<Participant>, SdkError> {
        self.session.host().await
    }

    pub async fn is_host(&self) -> Result<bool, SdkError> {
        Ok(self.session.current_user().await?.is_some_and(|me| me.is_host))
    }

    pub async fn is_manager(&self) -> Result<bool, SdkError> {
        Ok(self
            .session
            .current_user()
            .await?
            .is_some_and(|me| me.is_manager))
    }

    /// Last published connection state; `None` before the first join.
    pub async fn connection_state(&self) -> Result<Option<ConnectionState>, SdkError> {
        Ok(self.session.status().await?.connection)
    }

    #[must_use]
    pub fn chat(&self) -> ChatClient {
        ChatClient {
            session: self.session.clone(),
        }
    }

    #[must_use]
    pub fn media(&self) -> MediaStream {
        MediaStream {
            session: self.session.clone(),
        }
    }

    /// The raw actor handle.
    #[must_use]
    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Stop the actor and the dispatcher and wait for both to exit.
    pub async fn shutdown(self) {
        info!(target: "sdk.client", "Shutting down session client");
        self.cancel_token.cancel();
        let _ = self.actor_task.await;
        let _ = self.dispatcher_task.await;
    }
}

/// Chat commands.
#[derive(Debug, Clone)]
pub struct ChatClient {
    session: SessionHandle,
}

impl ChatClient {
    pub async fn send_to_user(&self, text: &str, user_id: UserId) -> Result<ChatMessage, SdkError> {
        self.session
            .send_chat(text.to_string(), ChatTarget::User(user_id))
            .await
    }

    /// Send to everyone. The receiver is [`UserId::EVERYONE`].
    pub async fn send_to_all(&self, text: &str) -> Result<ChatMessage, SdkError> {
        self.session
            .send_chat(text.to_string(), ChatTarget::Everyone)
            .await
    }

    /// Change who may chat. Resolves once the change is acknowledged.
    pub async fn change_privilege(&self, privilege: ChatPrivilege) -> Result<(), SdkError> {
        self.session.change_chat_privilege(privilege).await
    }

    pub async fn get_privilege(&self) -> Result<ChatPrivilege, SdkError> {
        self.session.chat_privilege().await
    }

    pub async fn get_history(&self) -> Result<Vec<ChatMessage>, SdkError> {
        self.session.chat_history().await
    }

    /// Who the local participant may address, everyone first.
    pub async fn get_receivers(&self) -> Result<Vec<ChatParty>, SdkError> {
        self.session.chat_receivers().await
    }
}

/// Audio, video and screen share commands.
#[derive(Debug, Clone)]
pub struct MediaStream {
    session: SessionHandle,
}

impl MediaStream {
    /// Resolve the local participant for commands that default to self.
    async fn local_user(&self, op: MediaOp) -> Result<UserId, SdkError> {
        if let Some(me) = self.session.current_user().await? {
            return Ok(me.user_id);
        }
        let status = self.session.status().await?;
        if !status.initialized {
            return Err(SdkError::NotInitialized);
        }
        Err(SdkError::invalid_state(op.as_str(), status.phase))
    }

    pub async fn start_audio(&self) -> Result<(), SdkError> {
        self.session.media(MediaCommand::StartAudio).await
    }

    pub async fn stop_audio(&self) -> Result<(), SdkError> {
        self.session.media(MediaCommand::StopAudio).await
    }

    /// Mute a participant; `None` mutes the local participant.
    pub async fn mute_audio(&self, user_id: Option<UserId>) -> Result<(), SdkError> {
        let target = match user_id {
            Some(id) => id,
            None => self.local_user(MediaOp::MuteAudio).await?,
        };
        self.session.media(MediaCommand::MuteAudio(target)).await
    }

    /// Unmute self, or ask another participant to unmute.
    pub async fn unmute_audio(&self, user_id: Option<UserId>) -> Result<(), SdkError> {
        let target = match user_id {
            Some(id) => id,
            None => self.local_user(MediaOp::UnmuteAudio).await?,
        };
        self.session.media(MediaCommand::UnmuteAudio(target)).await
    }

    pub async fn start_video(&self) -> Result<(), SdkError> {
        self.session.media(MediaCommand::StartVideo).await
    }

    pub async fn stop_video(&self) -> Result<(), SdkError> {
        self.session.media(MediaCommand::StopVideo).await
    }

    pub async fn switch_camera(&self, device_id: &str) -> Result<(), SdkError> {
        self.session
            .media(MediaCommand::SwitchCamera(device_id.to_string()))
            .await
    }

    pub async fn start_share_screen(&self) -> Result<(), SdkError> {
        self.session.media(MediaCommand::StartShare).await
    }

    pub async fn stop_share_screen(&self) -> Result<(), SdkError> {
        self.session.media(MediaCommand::StopShare).await
    }

    pub async fn pause_share_screen(&self) -> Result<(), SdkError> {
        self.session.media(MediaCommand::PauseShare).await
    }

    pub async fn resume_share_screen(&self) -> Result<(), SdkError> {
        self.session.media(MediaCommand::ResumeShare).await
    }

    pub async fn lock_share(&self, privilege: SharePrivilege) -> Result<(), SdkError> {
        self.session.media(MediaCommand::LockShare(privilege)).await
    }

    pub async fn get_share_status(&self) -> Result<ShareStatus, SdkError> {
        Ok(self.session.media_state().await?.share)
    }

    pub async fn get_share_privilege(&self) -> Result<SharePrivilege, SdkError> {
        Ok(self.session.media_state().await?.share_privilege)
    }

    pub async fn get_media_state(&self) -> Result<MediaState, SdkError> {
        self.session.media_state().await
    }
}
