//! Chat policy, message construction and history.
//!
//! The send check runs on every send against the current privilege and the
//! sender's current roles; nothing about permission is cached.

use crate::errors::SdkError;
use crate::registry::ParticipantRegistry;
use crate::types::{ChatMessage, ChatParty, ChatPrivilege, Participant, UserId};
use std::collections::VecDeque;
use tracing::debug;

/// Maximum chat message length in characters.
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// Addressee of an outgoing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatTarget {
    Everyone,
    User(UserId),
}

/// Check whether `sender` may address `target` under `privilege`.
///
/// Host and managers are exempt from the policy.
pub fn check_send_permission(
    sender: &Participant,
    target: ChatTarget,
    privilege: ChatPrivilege,
) -> Result<(), SdkError> {
    if sender.is_privileged() {
        return Ok(());
    }

    match (privilege, target) {
        (ChatPrivilege::All, _) | (ChatPrivilege::EveryonePublicly, ChatTarget::Everyone) => {
            Ok(())
        }
        (ChatPrivilege::EveryonePublicly, ChatTarget::User(_)) => Err(
            SdkError::InsufficientPrivilege("private chat is disabled".to_string()),
        ),
        (ChatPrivilege::NoOne, _) => Err(SdkError::InsufficientPrivilege(
            "chat is disabled for participants".to_string(),
        )),
    }
}

/// Validate message text.
pub fn validate_text(text: &str) -> Result<(), SdkError> {
    if text.trim().is_empty() {
        return Err(SdkError::InvalidParameters(
            "message must not be empty".to_string(),
        ));
    }
    if text.chars().count() > MAX_MESSAGE_CHARS {
        return Err(SdkError::InvalidParameters(format!(
            "message exceeds {MAX_MESSAGE_CHARS} characters"
        )));
    }
    Ok(())
}

/// Chat state owned by the session actor.
#[derive(Debug)]
pub struct ChatState {
    privilege: ChatPrivilege,
    history: VecDeque<ChatMessage>,
    history_limit: usize,
}

impl ChatState {
    #[must_use]
    pub fn new(history_limit: usize) -> Self {
        Self {
            privilege: ChatPrivilege::All,
            history: VecDeque::new(),
            history_limit,
        }
    }

    #[must_use]
    pub fn privilege(&self) -> ChatPrivilege {
        self.privilege
    }

    /// Returns whether the value changed.
    pub fn set_privilege(&mut self, privilege: ChatPrivilege) -> bool {
        let changed = self.privilege != privilege;
        self.privilege = privilege;
        changed
    }

    /// Validate and construct an outgoing message.
    ///
    /// The privilege policy is checked before the text and the receiver, so
    /// a sender who may not chat is refused whatever they address.
    pub fn compose(
        &self,
        registry: &ParticipantRegistry,
        sender_id: UserId,
        target: ChatTarget,
        text: &str,
    ) -> Result<ChatMessage, SdkError> {
        let sender = registry
            .get(sender_id)
            .ok_or(SdkError::UserNotFound(sender_id))?;

        let target = match target {
            ChatTarget::User(id) if id.is_everyone() => ChatTarget::Everyone,
            other => other,
        };
        check_send_permission(sender, target, self.privilege)?;
        validate_text(text)?;

        let receiver = match target {
            ChatTarget::Everyone => ChatParty::everyone(),
            ChatTarget::User(id) if id == sender_id => {
                return Err(SdkError::InvalidParameters(
                    "cannot send a private message to yourself".to_string(),
                ));
            }
            ChatTarget::User(id) => {
                let receiver = registry.get(id).ok_or_else(|| {
                    SdkError::InvalidParameters(format!("unknown chat receiver {id}"))
                })?;
                ChatParty {
                    user_id: receiver.user_id,
                    name: receiver.display_name.clone(),
                }
            }
        };

        Ok(ChatMessage {
            id: uuid::Uuid::new_v4().to_string(),
            message: text.to_string(),
            sender: ChatParty {
                user_id: sender.user_id,
                name: sender.display_name.clone(),
            },
            receiver,
            timestamp: chrono::Utc::now().timestamp_millis(),
        })
    }

    /// Append to history, evicting the oldest beyond the limit.
    pub fn record(&mut self, message: ChatMessage) {
        self.history.push_back(message);
        while self.history.len() > self.history_limit {
            self.history.pop_front();
            debug!(target: "sdk.chat", "Chat history limit reached, oldest entry evicted");
        }
    }

    #[must_use]
    pub fn history(&self) -> Vec<ChatMessage> {
        self.history.iter().cloned().collect()
    }

    /// Receivers the local user may address right now, everyone first.
    #[must_use]
    pub fn receivers(&self, registry: &ParticipantRegistry, self_id: UserId) -> Vec<ChatParty> {
        let Some(me) = registry.get(self_id) else {
            return Vec::new();
        };

        let mut receivers = Vec::new();
        if check_send_permission(me, ChatTarget::Everyone, self.privilege).is_ok() {
            receivers.push(ChatParty::everyone());
        }
        for participant in registry.snapshot() {
            if participant.user_id == self_id {
                continue;
            }
            let target = ChatTarget::User(participant.user_id);
            if check_send_permission(me, target, self.privilege).is_ok() {
                receivers.push(ChatParty {
                    user_id: participant.user_id,
                    name: participant.display_name,
                });
            }
        }
        receivers
    }

    /// Reset for a new session.
    pub fn reset(&mut self, privilege: ChatPrivilege) {
        self.privilege = privilege;
        self.history.clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn registry_with(host_id: u32, others: &[u32]) -> ParticipantRegistry {
        let mut registry = ParticipantRegistry::new();
        let mut host = Participant::new(UserId(host_id), "Host");
        host.is_host = true;
        let mut batch = vec![host];
        for id in others {
            batch.push(Participant::new(UserId(*id), format!("User {id}")));
        }
        registry.add_batch(batch);
        registry
    }

    #[test]
    fn test_no_one_rejects_every_target() {
        let registry = registry_with(1, &[2, 3]);
        let mut chat = ChatState::new(10);
        chat.set_privilege(ChatPrivilege::NoOne);

        let targets = [
            ChatTarget::Everyone,
            ChatTarget::User(UserId(3)),
            ChatTarget::User(UserId(1)),
            ChatTarget::User(UserId(2)),
            ChatTarget::User(UserId(999)),
        ];
        for target in targets {
            for text in ["hello", ""] {
                let result = chat.compose(&registry, UserId(2), target, text);
                assert!(
                    matches!(result, Err(SdkError::InsufficientPrivilege(_))),
                    "target {target:?} with text {text:?} should be rejected"
                );
            }
        }
    }

    #[test]
    fn test_everyone_publicly_allows_only_broadcast() {
        let registry = registry_with(1, &[2, 3]);
        let mut chat = ChatState::new(10);
        chat.set_privilege(ChatPrivilege::EveryonePublicly);

        assert!(chat
            .compose(&registry, UserId(2), ChatTarget::Everyone, "hi")
            .is_ok());
        assert!(matches!(
            chat.compose(&registry, UserId(2), ChatTarget::User(UserId(3)), "hi"),
            Err(SdkError::InsufficientPrivilege(_))
        ));
    }

    #[test]
    fn test_host_is_exempt_from_policy() {
        let registry = registry_with(1, &[2]);
        let mut chat = ChatState::new(10);
        chat.set_privilege(ChatPrivilege::NoOne);

        let message = chat
            .compose(&registry, UserId(1), ChatTarget::User(UserId(2)), "ping")
            .unwrap();
        assert_eq!(message.receiver.user_id, UserId(2));
    }

    #[test]
    fn test_broadcast_uses_everyone_sentinel() {
        let registry = registry_with(1, &[2]);
        let chat = ChatState::new(10);

        let message = chat
            .compose(&registry, UserId(2), ChatTarget::Everyone, "hi")
            .unwrap();
        assert_eq!(message.message, "hi");
        assert_eq!(message.receiver, ChatParty::everyone());
        assert_eq!(message.sender.user_id, UserId(2));
        assert!(message.is_broadcast());
        assert!(!message.id.is_empty());
    }

    #[test]
    fn test_invalid_messages() {
        let registry = registry_with(1, &[2]);
        let chat = ChatState::new(10);

        assert!(matches!(
            chat.compose(&registry, UserId(2), ChatTarget::Everyone, "   "),
            Err(SdkError::InvalidParameters(_))
        ));
        assert!(matches!(
            chat.compose(&registry, UserId(2), ChatTarget::User(UserId(77)), "hi"),
            Err(SdkError::InvalidParameters(_))
        ));
        assert!(matches!(
            chat.compose(&registry, UserId(2), ChatTarget::User(UserId(2)), "hi"),
            Err(SdkError::InvalidParameters(_))
        ));
        let long = "x".repeat(MAX_MESSAGE_CHARS + 1);
        assert!(matches!(
            chat.compose(&registry, UserId(2), ChatTarget::Everyone, &long),
            Err(SdkError::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_permission_tracks_current_roles() {
        let mut registry = registry_with(1, &[2, 3]);
        let mut chat = ChatState::new(10);
        chat.set_privilege(ChatPrivilege::NoOne);

        assert!(chat
            .compose(&registry, UserId(2), ChatTarget::Everyone, "hi")
            .is_err());

        let mut promoted = registry.get(UserId(2)).unwrap().clone();
        promoted.is_manager = true;
        registry.update_batch(vec![promoted]);

        assert!(chat
            .compose(&registry, UserId(2), ChatTarget::Everyone, "hi")
            .is_ok());
    }

    #[test]
    fn test_history_is_bounded() {
        let registry = registry_with(1, &[2]);
        let mut chat = ChatState::new(2);
        for text in ["one", "two", "three"] {
            let message = chat
                .compose(&registry, UserId(2), ChatTarget::Everyone, text)
                .unwrap();
            chat.record(message);
        }

        let history: Vec<String> = chat.history().into_iter().map(|m| m.message).collect();
        assert_eq!(history, vec!["two".to_string(), "three".to_string()]);
    }

    #[test]
    fn test_receivers_follow_privilege() {
        let registry = registry_with(1, &[2, 3]);
        let mut chat = ChatState::new(10);

        let receivers = chat.receivers(&registry, UserId(2));
        let ids: Vec<u32> = receivers.iter().map(|r| r.user_id.0).collect();
        assert_eq!(ids, vec![0, 1, 3]);

        chat.set_privilege(ChatPrivilege::EveryonePublicly);
        let receivers = chat.receivers(&registry, UserId(2));
        assert_eq!(receivers, vec![ChatParty::everyone()]);

        chat.set_privilege(ChatPrivilege::NoOne);
        assert!(chat.receivers(&registry, UserId(2)).is_empty());
        // Host still sees everyone.
        assert_eq!(chat.receivers(&registry, UserId(1)).len(), 3);
    }
}
