//! Actor implementation for the session client.
//!
//! ```text
//! SessionClient
//! ├── SessionActor (one per client)
//! │   ├── owns lifecycle phase, roster, chat and media state
//! │   └── spawns collaborator calls, results come back as completions
//! └── EventDispatcher (delivers events to application handlers)
//! ```
//!
//! # Key Design Decisions
//!
//! - **Single owner**: only the session actor mutates session state
//! - **CancellationToken propagation**: the client passes child tokens to both tasks
//! - **Mailbox monitoring**: depth thresholds with metrics (Session: 64/256)
//!
//! # Modules
//!
//! - [`session`] - `SessionActor` and its handle
//! - [`messages`] - Commands, queries and completions
//! - [`metrics`] - Mailbox monitoring

pub mod messages;
pub mod metrics;
pub mod session;

pub use messages::{AdminAction, SessionMessage, SessionQuery, SessionStatus};
pub use metrics::{ActorType, MailboxLevel, MailboxMonitor};
pub use session::{SessionActor, SessionHandle, MAX_DISPLAY_NAME_CHARS};
