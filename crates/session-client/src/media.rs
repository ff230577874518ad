//! Local media bookkeeping for the media control facade.
//!
//! Capture and rendering happen in the external engine. This module keeps
//! just enough state to check preconditions and to fold engine reports back
//! into what `getShareStatus` and friends return.

use crate::errors::SdkError;
use crate::events::{ActiveShareChange, AudioAction, CurrentAudioChange, ShareState};
use crate::types::{Participant, SharePrivilege, UserId};

/// Media commands. At most one of each may be outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaOp {
    StartAudio,
    StopAudio,
    MuteAudio,
    UnmuteAudio,
    StartVideo,
    StopVideo,
    SwitchCamera,
    StartShare,
    StopShare,
    PauseShare,
    ResumeShare,
    LockShare,
}

impl MediaOp {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            MediaOp::StartAudio => "start_audio",
            MediaOp::StopAudio => "stop_audio",
            MediaOp::MuteAudio => "mute_audio",
            MediaOp::UnmuteAudio => "unmute_audio",
            MediaOp::StartVideo => "start_video",
            MediaOp::StopVideo => "stop_video",
            MediaOp::SwitchCamera => "switch_camera",
            MediaOp::StartShare => "start_share",
            MediaOp::StopShare => "stop_share",
            MediaOp::PauseShare => "pause_share",
            MediaOp::ResumeShare => "resume_share",
            MediaOp::LockShare => "lock_share",
        }
    }
}

/// Local share status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareStatus {
    Idle,
    Sharing,
    Paused,
}

/// A validated media command, ready for the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaCommand {
    StartAudio,
    StopAudio,
    MuteAudio(UserId),
    UnmuteAudio(UserId),
    StartVideo,
    StopVideo,
    SwitchCamera(String),
    StartShare,
    StopShare,
    PauseShare,
    ResumeShare,
    LockShare(SharePrivilege),
}

impl MediaCommand {
    #[must_use]
    pub fn op(&self) -> MediaOp {
        match self {
            MediaCommand::StartAudio => MediaOp::StartAudio,
            MediaCommand::StopAudio => MediaOp::StopAudio,
            MediaCommand::MuteAudio(_) => MediaOp::MuteAudio,
            MediaCommand::UnmuteAudio(_) => MediaOp::UnmuteAudio,
            MediaCommand::StartVideo => MediaOp::StartVideo,
            MediaCommand::StopVideo => MediaOp::StopVideo,
            MediaCommand::SwitchCamera(_) => MediaOp::SwitchCamera,
            MediaCommand::StartShare => MediaOp::StartShare,
            MediaCommand::StopShare => MediaOp::StopShare,
            MediaCommand::PauseShare => MediaOp::PauseShare,
            MediaCommand::ResumeShare => MediaOp::ResumeShare,
            MediaCommand::LockShare(_) => MediaOp::LockShare,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaState {
    pub audio_started: bool,
    pub audio_muted: bool,
    pub video_on: bool,
    pub share: ShareStatus,
    pub active_sharer: Option<UserId>,
    pub share_privilege: SharePrivilege,
}

impl Default for MediaState {
    fn default() -> Self {
        Self {
            audio_started: false,
            audio_muted: false,
            video_on: false,
            share: ShareStatus::Idle,
            active_sharer: None,
            share_privilege: SharePrivilege::Unlocked,
        }
    }
}

fn privileged_only(caller: &Participant, what: &str) -> Result<(), SdkError> {
    if caller.is_privileged() {
        Ok(())
    } else {
        Err(SdkError::InsufficientPrivilege(format!(
            "only host or manager can {what}"
        )))
    }
}

impl MediaState {
    #[must_use]
    pub fn new(share_privilege: SharePrivilege) -> Self {
        Self {
            share_privilege,
            ..Self::default()
        }
    }

    /// Check a command against local state and the caller's roles.
    ///
    /// `target_exists` reports whether a remote target is in the roster.
    pub fn check(
        &self,
        command: &MediaCommand,
        caller: &Participant,
        target_exists: impl Fn(UserId) -> bool,
    ) -> Result<(), SdkError> {
        let self_id = caller.user_id;
        match command {
            MediaCommand::StartAudio => Ok(()),
            MediaCommand::StopAudio => self.require_audio("stop audio"),
            MediaCommand::MuteAudio(target) | MediaCommand::UnmuteAudio(target) => {
                if *target == self_id {
                    self.require_audio("change mute state")
                } else if !target_exists(*target) {
                    Err(SdkError::UserNotFound(*target))
                } else {
                    privileged_only(caller, "change another participant's audio")
                }
            }
            MediaCommand::StartVideo => Ok(()),
            MediaCommand::StopVideo => {
                if self.video_on {
                    Ok(())
                } else {
                    Err(SdkError::InvalidParameters("video is not started".to_string()))
                }
            }
            MediaCommand::SwitchCamera(device_id) => {
                if device_id.trim().is_empty() {
                    Err(SdkError::InvalidParameters(
                        "camera device id must not be empty".to_string(),
                    ))
                } else {
                    Ok(())
                }
            }
            MediaCommand::StartShare => {
                if self.share != ShareStatus::Idle {
                    return Err(SdkError::InvalidParameters(
                        "screen share already started".to_string(),
                    ));
                }
                if self.share_privilege == SharePrivilege::Locked {
                    privileged_only(caller, "share while share is locked")?;
                }
                match self.active_sharer {
                    Some(sharer) if sharer != self_id => Err(SdkError::Rejected(format!(
                        "participant {sharer} is already sharing"
                    ))),
                    _ => Ok(()),
                }
            }
            MediaCommand::StopShare => self.require_share("stop share"),
            MediaCommand::PauseShare => {
                if self.share == ShareStatus::Sharing {
                    Ok(())
                } else {
                    Err(SdkError::InvalidParameters("share is not running".to_string()))
                }
            }
            MediaCommand::ResumeShare => {
                if self.share == ShareStatus::Paused {
                    Ok(())
                } else {
                    Err(SdkError::InvalidParameters("share is not paused".to_string()))
                }
            }
            MediaCommand::LockShare(_) => privileged_only(caller, "lock screen share"),
        }
    }

    fn require_audio(&self, what: &str) -> Result<(), SdkError> {
        if self.audio_started {
            Ok(())
        } else {
            Err(SdkError::InvalidParameters(format!(
                "audio is not started, cannot {what}"
            )))
        }
    }

    fn require_share(&self, what: &str) -> Result<(), SdkError> {
        if self.share == ShareStatus::Idle {
            Err(SdkError::InvalidParameters(format!(
                "no local share, cannot {what}"
            )))
        } else {
            Ok(())
        }
    }

    /// Fold a successful command into local state.
    pub fn apply_success(&mut self, command: &MediaCommand, self_id: UserId) {
        match command {
            MediaCommand::StartAudio => {
                self.audio_started = true;
                self.audio_muted = false;
            }
            MediaCommand::StopAudio => {
                self.audio_started = false;
                self.audio_muted = false;
            }
            MediaCommand::MuteAudio(target) if *target == self_id => self.audio_muted = true,
            MediaCommand::UnmuteAudio(target) if *target == self_id => self.audio_muted = false,
            MediaCommand::MuteAudio(_) | MediaCommand::UnmuteAudio(_) => {}
            MediaCommand::StartVideo => self.video_on = true,
            MediaCommand::StopVideo => self.video_on = false,
            MediaCommand::SwitchCamera(_) => {}
            MediaCommand::StartShare => {
                self.share = ShareStatus::Sharing;
                self.active_sharer = Some(self_id);
            }
            MediaCommand::StopShare => {
                self.share = ShareStatus::Idle;
                if self.active_sharer == Some(self_id) {
                    self.active_sharer = None;
                }
            }
            MediaCommand::PauseShare => self.share = ShareStatus::Paused,
            MediaCommand::ResumeShare => self.share = ShareStatus::Sharing,
            MediaCommand::LockShare(privilege) => self.share_privilege = *privilege,
        }
    }

    /// Fold an `active-share-change` report.
    pub fn apply_share_change(&mut self, change: &ActiveShareChange, self_id: UserId) {
        match change.state {
            ShareState::Active => self.active_sharer = Some(change.user_id),
            ShareState::Inactive => {
                if self.active_sharer == Some(change.user_id) {
                    self.active_sharer = None;
                }
                if change.user_id == self_id {
                    self.share = ShareStatus::Idle;
                }
            }
        }
    }

    /// Fold a `current-audio-change` report.
    pub fn apply_audio_change(&mut self, change: &CurrentAudioChange) {
        match change.action {
            AudioAction::Join => {
                self.audio_started = true;
                self.audio_muted = false;
            }
            AudioAction::Leave => {
                self.audio_started = false;
                self.audio_muted = false;
            }
            AudioAction::Muted => self.audio_muted = true,
            AudioAction::Unmuted => self.audio_muted = false,
        }
    }

    /// The local share ended without a local request.
    pub fn apply_passive_stop(&mut self, self_id: UserId) {
        self.share = ShareStatus::Idle;
        if self.active_sharer == Some(self_id) {
            self.active_sharer = None;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn member(id: u32) -> Participant {
        Participant::new(UserId(id), format!("User {id}"))
    }

    fn host(id: u32) -> Participant {
        let mut p = member(id);
        p.is_host = true;
        p
    }

    fn everyone_exists(_: UserId) -> bool {
        true
    }

    #[test]
    fn test_audio_commands_require_started_audio() {
        let mut state = MediaState::default();
        let me = member(1);

        assert!(state
            .check(&MediaCommand::MuteAudio(UserId(1)), &me, everyone_exists)
            .is_err());
        assert!(state
            .check(&MediaCommand::StopAudio, &me, everyone_exists)
            .is_err());

        state.apply_success(&MediaCommand::StartAudio, UserId(1));
        assert!(state
            .check(&MediaCommand::MuteAudio(UserId(1)), &me, everyone_exists)
            .is_ok());

        state.apply_success(&MediaCommand::MuteAudio(UserId(1)), UserId(1));
        assert!(state.audio_muted);
    }

    #[test]
    fn test_muting_others_is_privileged() {
        let state = MediaState::default();

        let result = state.check(&MediaCommand::MuteAudio(UserId(2)), &member(1), everyone_exists);
        assert!(matches!(result, Err(SdkError::InsufficientPrivilege(_))));

        let result = state.check(&MediaCommand::MuteAudio(UserId(2)), &host(1), everyone_exists);
        assert!(result.is_ok());

        let result = state.check(&MediaCommand::MuteAudio(UserId(9)), &host(1), |_| false);
        assert!(matches!(result, Err(SdkError::UserNotFound(UserId(9)))));
    }

    #[test]
    fn test_locked_share_requires_privilege() {
        let state = MediaState::new(SharePrivilege::Locked);

        assert!(matches!(
            state.check(&MediaCommand::StartShare, &member(1), everyone_exists),
            Err(SdkError::InsufficientPrivilege(_))
        ));
        assert!(state
            .check(&MediaCommand::StartShare, &host(1), everyone_exists)
            .is_ok());
    }

    #[test]
    fn test_share_blocked_while_another_user_shares() {
        let mut state = MediaState::default();
        state.apply_share_change(
            &ActiveShareChange {
                state: ShareState::Active,
                user_id: UserId(5),
            },
            UserId(1),
        );

        assert!(matches!(
            state.check(&MediaCommand::StartShare, &member(1), everyone_exists),
            Err(SdkError::Rejected(_))
        ));

        state.apply_share_change(
            &ActiveShareChange {
                state: ShareState::Inactive,
                user_id: UserId(5),
            },
            UserId(1),
        );
        assert!(state
            .check(&MediaCommand::StartShare, &member(1), everyone_exists)
            .is_ok());
    }

    #[test]
    fn test_share_pause_resume_cycle() {
        let mut state = MediaState::default();
        let me = member(1);

        assert!(state.check(&MediaCommand::PauseShare, &me, everyone_exists).is_err());

        state.apply_success(&MediaCommand::StartShare, UserId(1));
        assert_eq!(state.share, ShareStatus::Sharing);
        assert!(state.check(&MediaCommand::PauseShare, &me, everyone_exists).is_ok());
        assert!(state.check(&MediaCommand::ResumeShare, &me, everyone_exists).is_err());

        state.apply_success(&MediaCommand::PauseShare, UserId(1));
        assert!(state.check(&MediaCommand::ResumeShare, &me, everyone_exists).is_ok());

        state.apply_passive_stop(UserId(1));
        assert_eq!(state.share, ShareStatus::Idle);
        assert_eq!(state.active_sharer, None);
    }

    #[test]
    fn test_audio_reports_update_state() {
        let mut state = MediaState::default();
        state.apply_audio_change(&CurrentAudioChange {
            action: AudioAction::Join,
            source: None,
        });
        assert!(state.audio_started);

        state.apply_audio_change(&CurrentAudioChange {
            action: AudioAction::Muted,
            source: Some(crate::events::MuteSource::Passive),
        });
        assert!(state.audio_muted);

        state.apply_audio_change(&CurrentAudioChange {
            action: AudioAction::Leave,
            source: None,
        });
        assert!(!state.audio_started);
        assert!(!state.audio_muted);
    }

    #[test]
    fn test_stop_video_requires_video() {
        let mut state = MediaState::default();
        assert!(state
            .check(&MediaCommand::StopVideo, &member(1), everyone_exists)
            .is_err());
        state.apply_success(&MediaCommand::StartVideo, UserId(1));
        assert!(state
            .check(&MediaCommand::StopVideo, &member(1), everyone_exists)
            .is_ok());
    }

    #[test]
    fn test_command_op_mapping() {
        assert_eq!(
            MediaCommand::SwitchCamera("cam-2".to_string()).op(),
            MediaOp::SwitchCamera
        );
        assert_eq!(
            MediaCommand::LockShare(SharePrivilege::Locked).op().as_str(),
            "lock_share"
        );
    }
}
