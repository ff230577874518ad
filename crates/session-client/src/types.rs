//! Core data model shared by the session actor, the registry, chat and the
//! event catalog.
//!
//! Field names on serialized types follow the published event payload
//! contract (`userId`, `displayName`, `bVideoOn`, ...), so payloads can be
//! handed to application code or logged as JSON without translation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Participant identity assigned by the session layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u32);

impl UserId {
    /// Synthetic receiver identity representing the whole session audience.
    pub const EVERYONE: UserId = UserId(0);

    /// Whether this is the broadcast sentinel.
    #[must_use]
    pub const fn is_everyone(&self) -> bool {
        self.0 == Self::EVERYONE.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for UserId {
    fn from(value: u32) -> Self {
        UserId(value)
    }
}

/// Display name used for the everyone sentinel on broadcast chat messages.
pub const EVERYONE_DISPLAY_NAME: &str = "Everyone";

/// A participant as known to the local roster.
///
/// Roster updates always carry full attribute values; consumers replace
/// their copy on every `user-updated` rather than merging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub user_id: UserId,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default)]
    pub is_host: bool,
    #[serde(default)]
    pub is_manager: bool,
    /// Audio muted.
    #[serde(default)]
    pub muted: bool,
    #[serde(default, rename = "bVideoOn")]
    pub video_on: bool,
    #[serde(default)]
    pub sharer_on: bool,
    #[serde(default)]
    pub sharer_pause: bool,
}

impl Participant {
    /// A participant with default media flags and no roles.
    #[must_use]
    pub fn new(user_id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
            avatar: None,
            is_host: false,
            is_manager: false,
            muted: false,
            video_on: false,
            sharer_on: false,
            sharer_pause: false,
        }
    }

    /// Host or manager: the roles allowed to run administrative commands.
    #[must_use]
    pub fn is_privileged(&self) -> bool {
        self.is_host || self.is_manager
    }
}

/// Snapshot of the joined session.
///
/// Credentials are deliberately absent; the session actor keeps them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub topic: String,
    pub session_id: String,
    pub user_id: UserId,
    pub user_name: String,
    pub password_protected: bool,
    pub is_in_meeting: bool,
}

/// Internal lifecycle phase of the session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    Idle,
    Connecting,
    InMeeting,
    Reconnecting,
    Closed,
}

impl SessionPhase {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Connecting => "connecting",
            SessionPhase::InMeeting => "in_meeting",
            SessionPhase::Reconnecting => "reconnecting",
            SessionPhase::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transient reasons for a reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconnectReason {
    #[serde(rename = "on hold")]
    OnHold,
    #[serde(rename = "failover")]
    Failover,
    #[serde(rename = "promote")]
    Promote,
    #[serde(rename = "depromote")]
    Depromote,
}

/// Terminal reasons for a close driven by the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    #[serde(rename = "kicked by host")]
    KickedByHost,
    #[serde(rename = "ended by host")]
    EndedByHost,
    #[serde(rename = "expelled by host")]
    ExpelledByHost,
}

/// Connection state as published on `connection-change`.
///
/// A reason can only be attached to `Reconnecting` and `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason")]
pub enum ConnectionState {
    Connected,
    Reconnecting(Option<ReconnectReason>),
    Closed(Option<CloseReason>),
}

impl ConnectionState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting(_) => "reconnecting",
            ConnectionState::Closed(_) => "closed",
        }
    }
}

/// One side of a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatParty {
    pub user_id: UserId,
    pub name: String,
}

impl ChatParty {
    /// The broadcast audience.
    #[must_use]
    pub fn everyone() -> Self {
        Self {
            user_id: UserId::EVERYONE,
            name: EVERYONE_DISPLAY_NAME.to_string(),
        }
    }
}

/// A delivered chat message. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub message: String,
    pub sender: ChatParty,
    pub receiver: ChatParty,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl ChatMessage {
    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        self.receiver.user_id.is_everyone()
    }
}

/// Who may address whom in chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ChatPrivilege {
    /// Everyone may chat publicly and privately.
    All,
    /// Participants may not chat at all.
    NoOne,
    /// Participants may only send to everyone.
    EveryonePublicly,
}

impl ChatPrivilege {
    /// Numeric value used on the wire and in payloads.
    #[must_use]
    pub const fn code(&self) -> u8 {
        match self {
            ChatPrivilege::All => 1,
            ChatPrivilege::NoOne => 4,
            ChatPrivilege::EveryonePublicly => 5,
        }
    }
}

impl From<ChatPrivilege> for u8 {
    fn from(value: ChatPrivilege) -> Self {
        value.code()
    }
}

impl TryFrom<u8> for ChatPrivilege {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ChatPrivilege::All),
            4 => Ok(ChatPrivilege::NoOne),
            5 => Ok(ChatPrivilege::EveryonePublicly),
            other => Err(format!("unknown chat privilege {other}")),
        }
    }
}

/// Whether screen share is restricted to host and managers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum SharePrivilege {
    Unlocked,
    Locked,
}

impl From<SharePrivilege> for u8 {
    fn from(value: SharePrivilege) -> Self {
        match value {
            SharePrivilege::Unlocked => 0,
            SharePrivilege::Locked => 1,
        }
    }
}

impl TryFrom<u8> for SharePrivilege {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SharePrivilege::Unlocked),
            1 => Ok(SharePrivilege::Locked),
            other => Err(format!("unknown share privilege {other}")),
        }
    }
}

/// Entry in the ranked active speaker list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSpeaker {
    pub user_id: UserId,
    pub display_name: String,
}

/// Instantaneous audio level reported by the media engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioLevel {
    pub user_id: UserId,
    pub level: u8,
}

/// Where the media engine fetches its runtime assets from.
///
/// Passed through to the engine unresolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DependentAssets {
    Global,
    #[serde(rename = "CDN")]
    Cdn,
    #[serde(rename = "CN")]
    Cn,
    Path(String),
}

impl DependentAssets {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            DependentAssets::Global => "Global",
            DependentAssets::Cdn => "CDN",
            DependentAssets::Cn => "CN",
            DependentAssets::Path(path) => path,
        }
    }
}

impl FromStr for DependentAssets {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err("dependent assets must not be empty".to_string()),
            "Global" => Ok(DependentAssets::Global),
            "CDN" => Ok(DependentAssets::Cdn),
            "CN" => Ok(DependentAssets::Cn),
            path => Ok(DependentAssets::Path(path.to_string())),
        }
    }
}

impl fmt::Display for DependentAssets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_participant_serializes_contract_field_names() {
        let mut participant = Participant::new(UserId(16778240), "Alice");
        participant.video_on = true;
        participant.is_host = true;

        let value = serde_json::to_value(&participant).unwrap();
        assert_eq!(value["userId"], 16778240);
        assert_eq!(value["displayName"], "Alice");
        assert_eq!(value["bVideoOn"], true);
        assert_eq!(value["isHost"], true);
        assert_eq!(value["sharerPause"], false);
        assert!(value.get("avatar").is_none());
    }

    #[test]
    fn test_connection_state_reason_shape() {
        let json = serde_json::to_value(ConnectionState::Reconnecting(Some(
            ReconnectReason::Failover,
        )))
        .unwrap();
        assert_eq!(json["state"], "Reconnecting");
        assert_eq!(json["reason"], "failover");

        let json = serde_json::to_value(ConnectionState::Connected).unwrap();
        assert_eq!(json["state"], "Connected");
        assert!(json.get("reason").is_none());

        let json =
            serde_json::to_value(ConnectionState::Closed(Some(CloseReason::KickedByHost))).unwrap();
        assert_eq!(json["reason"], "kicked by host");
    }

    #[test]
    fn test_chat_privilege_numeric_codes() {
        assert_eq!(ChatPrivilege::All.code(), 1);
        assert_eq!(ChatPrivilege::NoOne.code(), 4);
        assert_eq!(ChatPrivilege::EveryonePublicly.code(), 5);

        assert_eq!(ChatPrivilege::try_from(5).unwrap(), ChatPrivilege::EveryonePublicly);
        assert!(ChatPrivilege::try_from(2).is_err());

        let parsed: ChatPrivilege = serde_json::from_str("4").unwrap();
        assert_eq!(parsed, ChatPrivilege::NoOne);
        assert!(serde_json::from_str::<ChatPrivilege>("3").is_err());
    }

    #[test]
    fn test_dependent_assets_parse() {
        assert_eq!("Global".parse::<DependentAssets>().unwrap(), DependentAssets::Global);
        assert_eq!("CDN".parse::<DependentAssets>().unwrap(), DependentAssets::Cdn);
        assert_eq!("CN".parse::<DependentAssets>().unwrap(), DependentAssets::Cn);
        assert_eq!(
            "https://assets.example.com/lib".parse::<DependentAssets>().unwrap(),
            DependentAssets::Path("https://assets.example.com/lib".to_string())
        );
        assert!("  ".parse::<DependentAssets>().is_err());
    }

    #[test]
    fn test_everyone_sentinel() {
        assert!(UserId::EVERYONE.is_everyone());
        assert!(!UserId(7).is_everyone());
        let party = ChatParty::everyone();
        assert_eq!(party.user_id, UserId::EVERYONE);
        assert_eq!(party.name, EVERYONE_DISPLAY_NAME);
    }
}
