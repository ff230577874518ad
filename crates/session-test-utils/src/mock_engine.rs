//! Mock collaborators for one client.
//!
//! [`MockEngine`] implements both [`SessionTransport`] and [`MediaEngine`]
//! on top of a shared [`MockHub`]. Every call is recorded so tests can
//! assert what reached the collaborator.

use crate::mock_hub::{MockHub, MOCK_SESSION_ID};
use async_trait::async_trait;
use parking_lot::Mutex;
use session_client::engine::{JoinAccepted, JoinRequest};
use session_client::events::{ActiveShareChange, AudioAction, CurrentAudioChange, MuteSource, ShareState};
use session_client::{
    ChatMessage, ChatPrivilege, DependentAssets, EngineError, EngineEvent, MediaEngine,
    SessionTransport, SharePrivilege, UserId,
};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Mock session layer and media engine for one client.
pub struct MockEngine {
    hub: Arc<MockHub>,
    events: mpsc::Sender<EngineEvent>,
    user_id: Mutex<Option<UserId>>,
    calls: Mutex<Vec<&'static str>>,
}

impl std::fmt::Debug for MockEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockEngine")
            .field("user_id", &*self.user_id.lock())
            .finish_non_exhaustive()
    }
}

impl MockEngine {
    /// `events` must be the sending side of the client's engine channel.
    #[must_use]
    pub fn new(hub: Arc<MockHub>, events: mpsc::Sender<EngineEvent>) -> Arc<Self> {
        Arc::new(Self {
            hub,
            events,
            user_id: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Identity assigned by the hub on join.
    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        *self.user_id.lock()
    }

    /// Names of the collaborator calls made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    /// Number of times `name` was called.
    #[must_use]
    pub fn call_count(&self, name: &str) -> usize {
        self.calls.lock().iter().filter(|c| **c == name).count()
    }

    /// Push a notification straight to this client.
    pub async fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event).await;
    }

    fn record(&self, name: &'static str) {
        self.calls.lock().push(name);
    }

    fn me(&self) -> Result<UserId, EngineError> {
        self.user_id()
            .ok_or_else(|| EngineError::Transport("not joined".to_string()))
    }

    fn check_device(&self) -> Result<(), EngineError> {
        match self.hub.device_failure() {
            Some(failure) => Err(EngineError::Device(failure)),
            None => Ok(()),
        }
    }

    fn audio_change(&self, action: AudioAction, source: Option<MuteSource>) {
        let _ = self
            .events
            .try_send(EngineEvent::CurrentAudioChanged(CurrentAudioChange {
                action,
                source,
            }));
    }
}

fn unknown(user_id: UserId) -> EngineError {
    EngineError::Rejected(format!("unknown participant {user_id}"))
}

#[async_trait]
impl SessionTransport for MockEngine {
    async fn initialize(&self, locale: &str, _assets: &DependentAssets) -> Result<(), EngineError> {
        self.record("initialize");
        if locale.is_empty() {
            return Err(EngineError::Internal("locale required".to_string()));
        }
        Ok(())
    }

    async fn join(&self, request: JoinRequest) -> Result<JoinAccepted, EngineError> {
        self.record("join");
        let (me, participants, chat_privilege, share_privilege) = self
            .hub
            .join(&request.user_name, self.events.clone())
            .map_err(EngineError::JoinRefused)?;

        *self.user_id.lock() = Some(me.user_id);
        Ok(JoinAccepted {
            session_id: MOCK_SESSION_ID.to_string(),
            user_id: me.user_id,
            participants,
            chat_privilege,
            share_privilege,
        })
    }

    async fn leave(&self, end_session: bool) -> Result<(), EngineError> {
        self.record("leave");
        let me = self.me()?;
        self.hub.leave(me, end_session);
        Ok(())
    }

    async fn rename(&self, user_id: UserId, display_name: &str) -> Result<(), EngineError> {
        self.record("rename");
        if self.hub.rename(user_id, display_name) {
            Ok(())
        } else {
            Err(unknown(user_id))
        }
    }

    async fn remove_user(&self, user_id: UserId) -> Result<(), EngineError> {
        self.record("remove_user");
        if self.hub.remove_user(user_id) {
            Ok(())
        } else {
            Err(unknown(user_id))
        }
    }

    async fn make_host(&self, user_id: UserId) -> Result<(), EngineError> {
        self.record("make_host");
        let me = self.me()?;
        if self.hub.make_host(me, user_id) {
            Ok(())
        } else {
            Err(unknown(user_id))
        }
    }

    async fn make_manager(&self, user_id: UserId) -> Result<(), EngineError> {
        self.record("make_manager");
        if self.hub.set_manager(user_id, true) {
            Ok(())
        } else {
            Err(unknown(user_id))
        }
    }

    async fn revoke_manager(&self, user_id: UserId) -> Result<(), EngineError> {
        self.record("revoke_manager");
        if self.hub.set_manager(user_id, false) {
            Ok(())
        } else {
            Err(unknown(user_id))
        }
    }

    async fn send_chat(&self, message: &ChatMessage) -> Result<(), EngineError> {
        self.record("send_chat");
        self.hub.route_chat(message);
        Ok(())
    }

    async fn set_chat_privilege(&self, privilege: ChatPrivilege) -> Result<(), EngineError> {
        self.record("set_chat_privilege");
        self.hub.set_chat_privilege(privilege);
        Ok(())
    }
}

#[async_trait]
impl MediaEngine for MockEngine {
    async fn start_audio(&self) -> Result<(), EngineError> {
        self.record("start_audio");
        self.check_device()?;
        self.audio_change(AudioAction::Join, None);
        Ok(())
    }

    async fn stop_audio(&self) -> Result<(), EngineError> {
        self.record("stop_audio");
        self.audio_change(AudioAction::Leave, None);
        Ok(())
    }

    async fn mute_audio(&self, user_id: UserId) -> Result<(), EngineError> {
        self.record("mute_audio");
        let me = self.me()?;
        if !self.hub.set_muted(user_id, true) {
            return Err(unknown(user_id));
        }
        if user_id == me {
            self.audio_change(AudioAction::Muted, Some(MuteSource::Active));
        }
        Ok(())
    }

    async fn unmute_audio(&self, user_id: UserId) -> Result<(), EngineError> {
        self.record("unmute_audio");
        let me = self.me()?;
        if user_id == me {
            self.hub.set_muted(me, false);
            self.audio_change(AudioAction::Unmuted, Some(MuteSource::Active));
            return Ok(());
        }
        if self.hub.participant(user_id).is_none() {
            return Err(unknown(user_id));
        }
        // Unmuting someone else only asks them.
        self.hub.notify(
            user_id,
            EngineEvent::HostAskUnmuteAudio(session_client::events::HostAskUnmuteAudio {
                user_id: me,
            }),
        );
        Ok(())
    }

    async fn start_video(&self) -> Result<(), EngineError> {
        self.record("start_video");
        self.check_device()
    }

    async fn stop_video(&self) -> Result<(), EngineError> {
        self.record("stop_video");
        Ok(())
    }

    async fn switch_camera(&self, _device_id: &str) -> Result<(), EngineError> {
        self.record("switch_camera");
        self.check_device()
    }

    async fn start_share(&self) -> Result<(), EngineError> {
        self.record("start_share");
        let me = self.me()?;
        self.hub.set_sharing(me, true, false);
        self.hub
            .broadcast(EngineEvent::ActiveShareChanged(ActiveShareChange {
                state: ShareState::Active,
                user_id: me,
            }));
        Ok(())
    }

    async fn stop_share(&self) -> Result<(), EngineError> {
        self.record("stop_share");
        let me = self.me()?;
        self.hub.set_sharing(me, false, false);
        self.hub
            .broadcast(EngineEvent::ActiveShareChanged(ActiveShareChange {
                state: ShareState::Inactive,
                user_id: me,
            }));
        Ok(())
    }

    async fn pause_share(&self) -> Result<(), EngineError> {
        self.record("pause_share");
        let me = self.me()?;
        self.hub.set_sharing(me, true, true);
        Ok(())
    }

    async fn resume_share(&self) -> Result<(), EngineError> {
        self.record("resume_share");
        let me = self.me()?;
        self.hub.set_sharing(me, true, false);
        Ok(())
    }

    async fn set_share_privilege(&self, privilege: SharePrivilege) -> Result<(), EngineError> {
        self.record("set_share_privilege");
        self.hub.set_share_privilege(privilege);
        Ok(())
    }
}
