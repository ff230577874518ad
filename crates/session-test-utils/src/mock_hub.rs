//! In-memory meeting server for session client tests.
//!
//! Several [`crate::MockEngine`]s join the same hub. The hub keeps the
//! authoritative roster and fans notifications out to every member, so two
//! clients in one test observe each other the way they would against a real
//! session layer:
//! - The first member to join becomes host
//! - Roster changes are broadcast as `UsersAdded` / `UsersRemoved` / `UsersUpdated`
//! - Chat is routed to the receiver (or everyone but the sender)
//! - Chat privilege changes are acknowledged to every member
//!
//! Failures can be injected for the next join, for privilege acknowledgements
//! and for capture devices.
//!
//! # Example
//!
//! ```rust,ignore
//! use session_test_utils::MockHub;
//!
//! let hub = MockHub::new();
//! hub.fail_next_join(JoinFailure::WrongPassword);
//! let bob = hub.add_remote("Bob");
//! ```

use parking_lot::Mutex;
use session_client::{
    ChatMessage, ChatPrivilege, CloseReason, ConnectionState, DeviceError, EngineEvent,
    JoinFailure, Participant, SharePrivilege, UserId,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// First user id the hub hands out.
pub const FIRST_USER_ID: u32 = 16_778_240;

/// Session id reported on every join.
pub const MOCK_SESSION_ID: &str = "mock-session-1";

struct Member {
    participant: Participant,
    /// `None` for remote participants added directly by a test.
    events: Option<mpsc::Sender<EngineEvent>>,
}

struct HubState {
    next_user_id: u32,
    members: Vec<Member>,
    chat_privilege: ChatPrivilege,
    share_privilege: SharePrivilege,
    fail_next_join: Option<JoinFailure>,
    drop_privilege_acks: bool,
    device_failure: Option<DeviceError>,
    chat_log: Vec<ChatMessage>,
}

impl HubState {
    fn member_mut(&mut self, user_id: UserId) -> Option<&mut Member> {
        self.members
            .iter_mut()
            .find(|m| m.participant.user_id == user_id)
    }

    fn participant(&self, user_id: UserId) -> Option<Participant> {
        self.members
            .iter()
            .find(|m| m.participant.user_id == user_id)
            .map(|m| m.participant.clone())
    }

    fn allocate(&mut self, name: &str) -> Participant {
        let user_id = UserId(self.next_user_id);
        self.next_user_id += 1024;
        let mut participant = Participant::new(user_id, name);
        participant.is_host = !self.members.iter().any(|m| m.participant.is_host);
        participant
    }

    /// Send to every connected member except `except`.
    fn broadcast(&self, event: &EngineEvent, except: Option<UserId>) {
        for member in &self.members {
            if Some(member.participant.user_id) == except {
                continue;
            }
            if let Some(events) = &member.events {
                let _ = events.try_send(event.clone());
            }
        }
    }

    fn send_to(&self, user_id: UserId, event: EngineEvent) {
        if let Some(events) = self
            .members
            .iter()
            .find(|m| m.participant.user_id == user_id)
            .and_then(|m| m.events.as_ref())
        {
            let _ = events.try_send(event);
        }
    }
}

/// Shared in-memory meeting server.
pub struct MockHub {
    state: Mutex<HubState>,
}

impl std::fmt::Debug for MockHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MockHub")
            .field("members", &state.members.len())
            .field("chat_privilege", &state.chat_privilege)
            .finish_non_exhaustive()
    }
}

impl MockHub {
    /// Create an empty hub with chat open to everyone and share unlocked.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(HubState {
                next_user_id: FIRST_USER_ID,
                members: Vec::new(),
                chat_privilege: ChatPrivilege::All,
                share_privilege: SharePrivilege::Unlocked,
                fail_next_join: None,
                drop_privilege_acks: false,
                device_failure: None,
                chat_log: Vec::new(),
            }),
        })
    }

    // ------------------------------------------------------------------
    // Failure injection
    // ------------------------------------------------------------------

    /// Refuse the next join with `reason`.
    pub fn fail_next_join(&self, reason: JoinFailure) {
        self.state.lock().fail_next_join = Some(reason);
    }

    /// Apply chat privilege changes without acknowledging them.
    pub fn drop_privilege_acks(&self, drop: bool) {
        self.state.lock().drop_privilege_acks = drop;
    }

    /// Fail audio and video capture with `failure`.
    pub fn fail_devices(&self, failure: Option<DeviceError>) {
        self.state.lock().device_failure = failure;
    }

    // ------------------------------------------------------------------
    // Test-driven roster and network changes
    // ------------------------------------------------------------------

    /// Add a participant with no client behind it and announce it.
    pub fn add_remote(&self, name: &str) -> Participant {
        let mut state = self.state.lock();
        let participant = state.allocate(name);
        state.members.push(Member {
            participant: participant.clone(),
            events: None,
        });
        state.broadcast(
            &EngineEvent::UsersAdded(vec![participant.clone()]),
            Some(participant.user_id),
        );
        participant
    }

    /// Remove participants and announce the batch.
    pub fn remove_remote(&self, ids: &[UserId]) {
        let mut state = self.state.lock();
        state
            .members
            .retain(|m| !ids.contains(&m.participant.user_id));
        state.broadcast(&EngineEvent::UsersRemoved(ids.to_vec()), None);
    }

    /// Push a connection change to one member.
    pub fn network(&self, user_id: UserId, connection: ConnectionState) {
        self.state
            .lock()
            .send_to(user_id, EngineEvent::ConnectionChanged(connection));
    }

    /// Push an arbitrary notification to one member.
    pub fn notify(&self, user_id: UserId, event: EngineEvent) {
        self.state.lock().send_to(user_id, event);
    }

    /// Push an arbitrary notification to every member.
    pub fn broadcast(&self, event: EngineEvent) {
        self.state.lock().broadcast(&event, None);
    }

    /// Overwrite a member's roles and announce the update.
    pub fn set_roles(&self, user_id: UserId, is_host: bool, is_manager: bool) {
        let mut state = self.state.lock();
        let Some(member) = state.member_mut(user_id) else {
            return;
        };
        member.participant.is_host = is_host;
        member.participant.is_manager = is_manager;
        let updated = member.participant.clone();
        state.broadcast(&EngineEvent::UsersUpdated(vec![updated]), None);
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    #[must_use]
    pub fn participant(&self, user_id: UserId) -> Option<Participant> {
        self.state.lock().participant(user_id)
    }

    #[must_use]
    pub fn participants(&self) -> Vec<Participant> {
        self.state
            .lock()
            .members
            .iter()
            .map(|m| m.participant.clone())
            .collect()
    }

    #[must_use]
    pub fn chat_privilege(&self) -> ChatPrivilege {
        self.state.lock().chat_privilege
    }

    #[must_use]
    pub fn share_privilege(&self) -> SharePrivilege {
        self.state.lock().share_privilege
    }

    /// Every chat message routed through the hub.
    #[must_use]
    pub fn chat_log(&self) -> Vec<ChatMessage> {
        self.state.lock().chat_log.clone()
    }

    // ------------------------------------------------------------------
    // Operations used by MockEngine
    // ------------------------------------------------------------------

    pub(crate) fn join(
        &self,
        name: &str,
        events: mpsc::Sender<EngineEvent>,
    ) -> Result<(Participant, Vec<Participant>, ChatPrivilege, SharePrivilege), JoinFailure> {
        let mut state = self.state.lock();
        if let Some(reason) = state.fail_next_join.take() {
            debug!(target: "sdk.test.hub", reason = %reason, "Join refused");
            return Err(reason);
        }

        let participant = state.allocate(name);
        state.broadcast(&EngineEvent::UsersAdded(vec![participant.clone()]), None);
        state.members.push(Member {
            participant: participant.clone(),
            events: Some(events),
        });

        let roster = state
            .members
            .iter()
            .map(|m| m.participant.clone())
            .collect();
        Ok((
            participant,
            roster,
            state.chat_privilege,
            state.share_privilege,
        ))
    }

    pub(crate) fn leave(&self, user_id: UserId, end_session: bool) {
        let mut state = self.state.lock();
        state.members.retain(|m| m.participant.user_id != user_id);

        if end_session {
            state.broadcast(
                &EngineEvent::ConnectionChanged(ConnectionState::Closed(Some(
                    CloseReason::EndedByHost,
                ))),
                None,
            );
            state.members.clear();
        } else {
            state.broadcast(&EngineEvent::UsersRemoved(vec![user_id]), None);
        }
    }

    pub(crate) fn rename(&self, user_id: UserId, name: &str) -> bool {
        let mut state = self.state.lock();
        let Some(member) = state.member_mut(user_id) else {
            return false;
        };
        member.participant.display_name = name.to_string();
        let updated = member.participant.clone();
        state.broadcast(&EngineEvent::UsersUpdated(vec![updated]), None);
        true
    }

    pub(crate) fn remove_user(&self, user_id: UserId) -> bool {
        let mut state = self.state.lock();
        if state.participant(user_id).is_none() {
            return false;
        }
        state.send_to(
            user_id,
            EngineEvent::ConnectionChanged(ConnectionState::Closed(Some(
                CloseReason::KickedByHost,
            ))),
        );
        state.members.retain(|m| m.participant.user_id != user_id);
        state.broadcast(&EngineEvent::UsersRemoved(vec![user_id]), None);
        true
    }

    pub(crate) fn make_host(&self, from: UserId, to: UserId) -> bool {
        let mut state = self.state.lock();
        if state.participant(to).is_none() {
            return false;
        }
        let mut updated = Vec::new();
        for member in &mut state.members {
            if member.participant.user_id == from {
                member.participant.is_host = false;
                updated.push(member.participant.clone());
            } else if member.participant.user_id == to {
                member.participant.is_host = true;
                member.participant.is_manager = false;
                updated.push(member.participant.clone());
            }
        }
        state.broadcast(&EngineEvent::UsersUpdated(updated), None);
        true
    }

    pub(crate) fn set_manager(&self, user_id: UserId, is_manager: bool) -> bool {
        let mut state = self.state.lock();
        let Some(member) = state.member_mut(user_id) else {
            return false;
        };
        member.participant.is_manager = is_manager;
        let updated = member.participant.clone();
        state.broadcast(&EngineEvent::UsersUpdated(vec![updated]), None);
        true
    }

    pub(crate) fn route_chat(&self, message: &ChatMessage) {
        let mut state = self.state.lock();
        state.chat_log.push(message.clone());
        let event = EngineEvent::ChatReceived(message.clone());
        if message.is_broadcast() {
            state.broadcast(&event, Some(message.sender.user_id));
        } else {
            state.send_to(message.receiver.user_id, event);
        }
    }

    pub(crate) fn set_chat_privilege(&self, privilege: ChatPrivilege) {
        let mut state = self.state.lock();
        state.chat_privilege = privilege;
        if !state.drop_privilege_acks {
            state.broadcast(&EngineEvent::ChatPrivilegeChanged(privilege), None);
        }
    }

    pub(crate) fn set_share_privilege(&self, privilege: SharePrivilege) {
        let mut state = self.state.lock();
        state.share_privilege = privilege;
        state.broadcast(&EngineEvent::SharePrivilegeChanged(privilege), None);
    }

    pub(crate) fn device_failure(&self) -> Option<DeviceError> {
        self.state.lock().device_failure
    }

    pub(crate) fn set_muted(&self, user_id: UserId, muted: bool) -> bool {
        let mut state = self.state.lock();
        let Some(member) = state.member_mut(user_id) else {
            return false;
        };
        member.participant.muted = muted;
        let updated = member.participant.clone();
        state.broadcast(&EngineEvent::UsersUpdated(vec![updated]), None);
        true
    }

    pub(crate) fn set_sharing(&self, user_id: UserId, sharing: bool, paused: bool) {
        let mut state = self.state.lock();
        let Some(member) = state.member_mut(user_id) else {
            return;
        };
        member.participant.sharer_on = sharing;
        member.participant.sharer_pause = paused;
        let updated = member.participant.clone();
        state.broadcast(&EngineEvent::UsersUpdated(vec![updated]), None);
    }
}
