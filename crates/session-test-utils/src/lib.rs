//! # Session Test Utilities
//!
//! Shared test utilities for the session client.
//!
//! This crate provides mock collaborators and fixtures for driving
//! [`session_client::SessionClient`] without a real meeting server or media
//! engine.
//!
//! ## Modules
//!
//! - `mock_hub` - In-memory meeting server shared by several clients
//! - `mock_engine` - Per-client `SessionTransport` + `MediaEngine` backed by the hub
//! - `recorder` - Captures delivered events for assertions
//! - `fixtures` - Participants, tokens and ready-made clients
//!
//! ## Usage
//!
//! ```rust,ignore
//! use session_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let hub = MockHub::new();
//!
//!     // First joiner becomes host
//!     let alice = TestClient::joined(&hub, "Alice").await;
//!     let bob = TestClient::joined(&hub, "Bob").await;
//!
//!     let mut messages = record::<ChatOnMessage>(bob.client.events());
//!     alice.client.chat().send_to_all("hi").await.unwrap();
//!     assert_eq!(messages.next().await.message, "hi");
//! }
//! ```

pub mod fixtures;
pub mod mock_engine;
pub mod mock_hub;
pub mod recorder;

// Re-export commonly used items
pub use fixtures::*;
pub use mock_engine::*;
pub use mock_hub::*;
pub use recorder::*;
