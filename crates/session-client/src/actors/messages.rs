//! Message types for the session actor.
//!
//! Commands arrive as [`SessionMessage`]s with a `oneshot` reply channel.
//! Work handed to a collaborator runs on a spawned task that reports back
//! with a [`Completion`], so the actor never awaits an engine call inline.

use crate::chat::ChatTarget;
use crate::engine::{EngineError, JoinAccepted, JoinRequest};
use crate::errors::SdkError;
use crate::media::{MediaCommand, MediaState};
use crate::types::{
    ChatMessage, ChatParty, ChatPrivilege, ConnectionState, DependentAssets, Participant,
    SessionInfo, SessionPhase, UserId,
};
use tokio::sync::oneshot;

/// Reply channel for a fallible command.
pub type Reply<T> = oneshot::Sender<Result<T, SdkError>>;

/// Administrative commands that act on one participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminAction {
    RemoveUser,
    MakeHost,
    MakeManager,
    RevokeManager,
}

impl AdminAction {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            AdminAction::RemoveUser => "remove_user",
            AdminAction::MakeHost => "make_host",
            AdminAction::MakeManager => "make_manager",
            AdminAction::RevokeManager => "revoke_manager",
        }
    }
}

/// Messages sent to `SessionActor`.
#[derive(Debug)]
pub enum SessionMessage {
    Init {
        locale: String,
        assets: DependentAssets,
        respond_to: Reply<()>,
    },

    Join {
        request: JoinRequest,
        respond_to: Reply<SessionInfo>,
    },

    Leave {
        /// End the session for everyone (host only).
        end_session: bool,
        respond_to: Reply<()>,
    },

    ChangeName {
        display_name: String,
        /// `None` renames the local participant.
        user_id: Option<UserId>,
        respond_to: Reply<()>,
    },

    Admin {
        action: AdminAction,
        user_id: UserId,
        respond_to: Reply<()>,
    },

    SendChat {
        text: String,
        target: ChatTarget,
        respond_to: Reply<ChatMessage>,
    },

    ChangeChatPrivilege {
        privilege: ChatPrivilege,
        respond_to: Reply<()>,
    },

    Media {
        command: MediaCommand,
        respond_to: Reply<()>,
    },

    Query(SessionQuery),
}

/// Read-only snapshots of actor state.
#[derive(Debug)]
pub enum SessionQuery {
    Status {
        respond_to: oneshot::Sender<SessionStatus>,
    },
    SessionInfo {
        respond_to: oneshot::Sender<Option<SessionInfo>>,
    },
    CurrentUser {
        respond_to: oneshot::Sender<Option<Participant>>,
    },
    AllUsers {
        respond_to: oneshot::Sender<Vec<Participant>>,
    },
    User {
        user_id: UserId,
        respond_to: oneshot::Sender<Option<Participant>>,
    },
    Host {
        respond_to: oneshot::Sender<Option<Participant>>,
    },
    ChatPrivilege {
        respond_to: oneshot::Sender<ChatPrivilege>,
    },
    ChatHistory {
        respond_to: oneshot::Sender<Vec<ChatMessage>>,
    },
    ChatReceivers {
        respond_to: oneshot::Sender<Vec<ChatParty>>,
    },
    MediaState {
        respond_to: oneshot::Sender<MediaState>,
    },
}

/// Lifecycle summary of the session actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub initialized: bool,
    pub phase: SessionPhase,
    /// Last published connection state; `None` before the first join.
    pub connection: Option<ConnectionState>,
    pub participants: usize,
}

/// Results of collaborator calls, reported back to the actor.
#[derive(Debug)]
pub(crate) enum Completion {
    Init {
        result: Result<(), EngineError>,
        respond_to: Reply<()>,
    },

    Join {
        attempt: u64,
        result: Result<JoinAccepted, EngineError>,
        password_protected: bool,
        topic: String,
    },

    ChatSent {
        message: ChatMessage,
        result: Result<(), EngineError>,
        respond_to: Reply<ChatMessage>,
    },

    PrivilegePropagated {
        seq: u64,
        result: Result<(), EngineError>,
    },

    PrivilegeAckTimeout {
        seq: u64,
    },

    Media {
        command: MediaCommand,
        result: Result<(), EngineError>,
        respond_to: Reply<()>,
    },
}
