//! The closed catalog of session events.
//!
//! Every event name maps to exactly one marker type in [`kinds`] and one
//! payload type. Registration is keyed by the marker, so a handler for
//! `user-added` can only ever be a `Fn(&Vec<Participant>)`:
//!
//! ```rust,ignore
//! use session_client::events::kinds::UserAdded;
//!
//! bus.on::<UserAdded, _>(|batch| println!("{} joined", batch.len()));
//! ```

use super::{Delivery, Listeners};
use crate::types::{
    ActiveSpeaker, ChatMessage, ChatPrivilege, ConnectionState, Participant, SharePrivilege, UserId,
};
use serde::{Deserialize, Serialize};

mod sealed {
    pub trait Sealed {}
}

/// A named event with a fixed payload type.
///
/// Implemented only by the marker types in [`kinds`].
pub trait SessionEvent: sealed::Sealed + 'static {
    /// The event's catalog entry.
    const KIND: EventKind;

    /// Payload delivered to handlers.
    type Payload: Clone + Send + Sync + std::fmt::Debug + 'static;

    /// Wrap a payload into the tagged [`Event`].
    fn wrap(payload: Self::Payload) -> Event;

    #[doc(hidden)]
    fn listeners(table: &ListenerTable) -> &Listeners<Self::Payload>;

    #[doc(hidden)]
    fn listeners_mut(table: &mut ListenerTable) -> &mut Listeners<Self::Payload>;
}

macro_rules! event_catalog {
    ($(
        $(#[$meta:meta])*
        $marker:ident, $field:ident: $payload:ty = $name:literal;
    )+) => {
        /// Closed set of event names.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum EventKind {
            $( $(#[$meta])* $marker, )+
        }

        impl EventKind {
            /// Every event in the catalog.
            pub const ALL: &'static [EventKind] = &[$(EventKind::$marker),+];

            /// The contract name applications bind to.
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $( EventKind::$marker => $name, )+
                }
            }

            /// Resolve a contract name.
            #[must_use]
            pub fn from_name(name: &str) -> Option<EventKind> {
                match name {
                    $( $name => Some(EventKind::$marker), )+
                    _ => None,
                }
            }
        }

        /// A tagged event with its payload.
        #[derive(Debug, Clone)]
        pub enum Event {
            $( $(#[$meta])* $marker($payload), )+
        }

        impl Event {
            #[must_use]
            pub fn kind(&self) -> EventKind {
                match self {
                    $( Event::$marker(_) => EventKind::$marker, )+
                }
            }
        }

        /// Marker types used as registration keys.
        pub mod kinds {
            $(
                $(#[$meta])*
                #[derive(Debug, Clone, Copy)]
                pub struct $marker;
            )+
        }

        $(
            impl sealed::Sealed for kinds::$marker {}

            impl SessionEvent for kinds::$marker {
                const KIND: EventKind = EventKind::$marker;
                type Payload = $payload;

                fn wrap(payload: $payload) -> Event {
                    Event::$marker(payload)
                }

                fn listeners(table: &ListenerTable) -> &Listeners<$payload> {
                    &table.$field
                }

                fn listeners_mut(table: &mut ListenerTable) -> &mut Listeners<$payload> {
                    &mut table.$field
                }
            }
        )+

        /// Per-event handler lists. One typed field per catalog entry.
        #[doc(hidden)]
        #[derive(Default)]
        pub struct ListenerTable {
            $( $field: Listeners<$payload>, )+
        }

        impl ListenerTable {
            /// Snapshot the handlers for `event` into a ready-to-run delivery.
            pub(crate) fn prepare(&self, event: Event) -> Delivery {
                match event {
                    $(
                        Event::$marker(payload) => {
                            Delivery::new(EventKind::$marker, self.$field.snapshot(), payload)
                        }
                    )+
                }
            }

            pub(crate) fn clear(&mut self) {
                $( self.$field.clear(); )+
            }
        }
    };
}

event_catalog! {
    /// Connection lifecycle transitions.
    ConnectionChange, connection_change: ConnectionState = "connection-change";
    /// Batch of participants that joined.
    UserAdded, user_added: Vec<Participant> = "user-added";
    /// Batch of participants that left, with their last known state.
    UserRemoved, user_removed: Vec<Participant> = "user-removed";
    /// Participants whose attributes changed, with full current values.
    UserUpdated, user_updated: Vec<Participant> = "user-updated";
    /// Inbound chat message.
    ChatOnMessage, chat_on_message: ChatMessage = "chat-on-message";
    /// Chat privilege policy changed.
    ChatPrivilegeChange, chat_privilege_change: ChatPrivilegePayload = "chat-privilege-change";
    /// Ranked active speakers, most active first.
    ActiveSpeakerChange, active_speaker: Vec<ActiveSpeaker> = "active-speaker";
    /// Someone started or stopped sharing.
    ActiveShareChange, active_share_change: ActiveShareChange = "active-share-change";
    /// Share lock changed.
    SharePrivilegeChange, share_privilege_change: SharePrivilegePayload = "share-privilege-change";
    /// The local share was stopped without a local request.
    PassivelyStopShare, passively_stop_share: PassiveStopShareReason = "passively-stop-share";
    /// Local audio connection or mute changed.
    CurrentAudioChange, current_audio_change: CurrentAudioChange = "current-audio-change";
    /// A remote participant started or stopped video.
    PeerVideoStateChange, peer_video_state_change: PeerVideoStateChange = "peer-video-state-change";
    /// Rendered video dimensions changed.
    VideoDimensionChange, video_dimension_change: VideoDimensionChange = "video-dimension-change";
    /// Host asks the local participant to unmute.
    HostAskUnmuteAudio, host_ask_unmute_audio: HostAskUnmuteAudio = "host-ask-unmute-audio";
    /// Asynchronous media engine result.
    MediaSdkChange, media_sdk_change: MediaSdkChange = "media-sdk-change";
}

/// Payload of `chat-privilege-change`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPrivilegePayload {
    pub chat_privilege: ChatPrivilege,
}

/// Payload of `share-privilege-change`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharePrivilegePayload {
    pub privilege: SharePrivilege,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShareState {
    Active,
    Inactive,
}

/// Payload of `active-share-change`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveShareChange {
    pub state: ShareState,
    pub user_id: UserId,
}

/// Why the local share was stopped by someone else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PassiveStopShareReason {
    /// Share was locked while a non-privileged participant was sharing.
    PrivilegeChange,
    /// Capture ended outside the SDK (browser stop button, window closed).
    StopScreenCapture,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioAction {
    Join,
    Leave,
    Muted,
    Unmuted,
}

/// Who caused a mute change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MuteSource {
    /// The local participant.
    Active,
    /// Host or manager.
    Passive,
}

/// Payload of `current-audio-change`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentAudioChange {
    pub action: AudioAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<MuteSource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoAction {
    Start,
    Stop,
}

/// Payload of `peer-video-state-change`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerVideoStateChange {
    pub action: VideoAction,
    pub user_id: UserId,
}

/// Payload of `video-dimension-change`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoDimensionChange {
    pub user_id: UserId,
    pub width: u32,
    pub height: u32,
}

/// Payload of `host-ask-unmute-audio`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostAskUnmuteAudio {
    /// The host or manager asking.
    pub user_id: UserId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
    Share,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaResult {
    Success,
    Fail,
}

/// Payload of `media-sdk-change`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaSdkChange {
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub result: MediaResult,
}
