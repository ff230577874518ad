//! Session Client Library
//!
//! Client-side core of a real-time audio/video/chat SDK:
//!
//! - Session lifecycle state machine (join, reconnect, leave)
//! - Typed event delivery to application handlers
//! - Participant roster with batch updates and active speaker ranking
//! - Privilege-gated chat with history
//! - Media control facade over an external media engine
//!
//! Signaling and media capture are external. The client drives them through
//! the [`engine::SessionTransport`] and [`engine::MediaEngine`] traits and
//! consumes their notifications as [`engine::EngineEvent`]s.
//!
//! # Architecture
//!
//! ```text
//! SessionClient
//! ├── SessionActor (owns phase, roster, chat and media state)
//! │   ├── SessionTransport / MediaEngine calls on spawned tasks
//! │   └── EngineEvent notifications
//! └── EventBus dispatcher (runs application handlers in FIFO order)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use session_client::events::kinds::UserAdded;
//! use session_client::{engine_channel, Config, SessionClient};
//!
//! let (events_tx, events_rx) = engine_channel(512);
//! let client = SessionClient::new(Config::default(), transport, media, events_rx);
//! client.on::<UserAdded, _>(|batch| println!("{} joined", batch.len()));
//! client.init_from_config().await?;
//! let info = client.join("standup", token, "Alice", None).await?;
//! client.chat().send_to_all("hi").await?;
//! ```
//!
//! # Modules
//!
//! - [`actors`] - Session actor, messages and mailbox monitoring
//! - [`client`] - Application-facing API
//! - [`config`] - Configuration from environment
//! - [`events`] - Event catalog and bus
//! - [`errors`] - Error types with stable codes

pub mod actors;
pub mod chat;
pub mod client;
pub mod config;
pub mod engine;
pub mod errors;
pub mod events;
pub mod media;
pub mod observability;
pub mod registry;
pub mod types;

pub use client::{ChatClient, MediaStream, SessionClient};
pub use config::{Config, ConfigError};
pub use engine::{engine_channel, EngineError, EngineEvent, MediaEngine, SessionTransport};
pub use errors::{DeviceError, ErrorKind, JoinFailure, SdkError};
pub use events::{EventBus, EventKind, ListenerId, SessionEvent};
pub use types::*;
