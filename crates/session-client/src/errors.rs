//! Session client error types.
//!
//! Every fallible command resolves to `Result<T, SdkError>`. Errors never
//! arrive as values inside `Ok`. Callers branch on [`SdkError::kind`] for
//! the taxonomy and on [`SdkError::error_code`] / [`JoinFailure::code`] for
//! stable codes.

use crate::types::{SessionPhase, UserId};
use thiserror::Error;

/// Error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Wrong lifecycle state for the command.
    StatePrecondition,
    /// Caller lacks the required role.
    Privilege,
    /// Malformed or out-of-range parameters.
    Validation,
    /// Device or permission unavailable.
    Resource,
    /// Server-side denial with a business reason.
    RemoteRejection,
    /// Bounded remote operation exceeded its deadline.
    Timeout,
    /// Unexpected failure.
    Internal,
}

/// Session client error type.
#[derive(Debug, Clone, Error)]
pub enum SdkError {
    /// `init` has not completed.
    #[error("Session client is not initialized")]
    NotInitialized,

    /// Command not valid in the current lifecycle phase.
    #[error("{operation} is not allowed while {phase}")]
    InvalidState {
        operation: &'static str,
        phase: SessionPhase,
    },

    /// An equivalent command is already outstanding.
    #[error("Duplicate operation: {0}")]
    DuplicateOperation(&'static str),

    /// Caller lacks the host/manager role the command requires.
    #[error("Insufficient privilege: {0}")]
    InsufficientPrivilege(String),

    /// Malformed parameters.
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// Target user is not in the roster.
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    /// Capture device unavailable.
    #[error("Device error: {0}")]
    Device(DeviceError),

    /// The session layer refused the join.
    #[error("Join rejected: {0}")]
    JoinRejected(JoinFailure),

    /// The session layer refused a non-join command.
    #[error("Rejected by session layer: {0}")]
    Rejected(String),

    /// Remote acknowledgement did not arrive in time.
    #[error("Operation timed out: {0}")]
    Timeout(&'static str),

    /// Internal error (channel failures, engine faults).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Capture device failures reported by the media engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("permission denied")]
    PermissionDenied,
    #[error("device in use by another application")]
    InUse,
    #[error("device not found")]
    NotFound,
}

/// Stable reasons for a rejected join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum JoinFailure {
    #[error("invalid token")]
    InvalidToken,
    #[error("wrong password")]
    WrongPassword,
    #[error("meeting not started")]
    MeetingNotStarted,
    #[error("meeting locked")]
    MeetingLocked,
    #[error("meeting full")]
    MeetingFull,
    #[error("meeting ended")]
    MeetingEnded,
    #[error("rejected by access policy")]
    AccessDenied,
    #[error("same account already in session")]
    IdentityConflict,
    #[error("malformed join parameters")]
    MalformedRequest,
    #[error("denied by host")]
    HostDenied,
    #[error("internal failure")]
    Internal,
}

impl JoinFailure {
    /// Stable numeric reason code.
    #[must_use]
    pub const fn code(&self) -> u16 {
        match self {
            JoinFailure::InvalidToken => 200,
            JoinFailure::WrongPassword => 201,
            JoinFailure::MeetingNotStarted => 202,
            JoinFailure::MeetingLocked => 203,
            JoinFailure::MeetingFull => 204,
            JoinFailure::MeetingEnded => 205,
            JoinFailure::AccessDenied => 206,
            JoinFailure::IdentityConflict => 207,
            JoinFailure::MalformedRequest => 208,
            JoinFailure::HostDenied => 209,
            JoinFailure::Internal => 299,
        }
    }

    /// Stable string form of the reason.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            JoinFailure::InvalidToken => "invalid_token",
            JoinFailure::WrongPassword => "wrong_password",
            JoinFailure::MeetingNotStarted => "meeting_not_started",
            JoinFailure::MeetingLocked => "meeting_locked",
            JoinFailure::MeetingFull => "meeting_full",
            JoinFailure::MeetingEnded => "meeting_ended",
            JoinFailure::AccessDenied => "access_denied",
            JoinFailure::IdentityConflict => "identity_conflict",
            JoinFailure::MalformedRequest => "malformed_request",
            JoinFailure::HostDenied => "host_denied",
            JoinFailure::Internal => "internal",
        }
    }
}

impl SdkError {
    /// Taxonomy bucket for this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            SdkError::NotInitialized
            | SdkError::InvalidState { .. }
            | SdkError::DuplicateOperation(_) => ErrorKind::StatePrecondition,
            SdkError::InsufficientPrivilege(_) => ErrorKind::Privilege,
            SdkError::InvalidParameters(_) | SdkError::UserNotFound(_) => ErrorKind::Validation,
            SdkError::Device(_) => ErrorKind::Resource,
            SdkError::JoinRejected(_) | SdkError::Rejected(_) => ErrorKind::RemoteRejection,
            SdkError::Timeout(_) => ErrorKind::Timeout,
            SdkError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Stable string code for this error.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            SdkError::NotInitialized => "NOT_INITIALIZED",
            SdkError::InvalidState { .. } => "INVALID_STATE",
            SdkError::DuplicateOperation(_) => "DUPLICATE_OPERATION",
            SdkError::InsufficientPrivilege(_) => "INSUFFICIENT_PRIVILEGES",
            SdkError::InvalidParameters(_) => "INVALID_PARAMETERS",
            SdkError::UserNotFound(_) => "USER_NOT_FOUND",
            SdkError::Device(_) => "DEVICE_UNAVAILABLE",
            SdkError::JoinRejected(_) => "JOIN_REJECTED",
            SdkError::Rejected(_) => "REMOTE_REJECTED",
            SdkError::Timeout(_) => "OPERATION_TIMEOUT",
            SdkError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub(crate) fn invalid_state(operation: &'static str, phase: SessionPhase) -> Self {
        SdkError::InvalidState { operation, phase }
    }
}

impl From<DeviceError> for SdkError {
    fn from(err: DeviceError) -> Self {
        SdkError::Device(err)
    }
}

impl From<JoinFailure> for SdkError {
    fn from(err: JoinFailure) -> Self {
        SdkError::JoinRejected(err)
    }
}
