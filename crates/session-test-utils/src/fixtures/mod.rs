//! Pre-configured test data and ready-made clients.

use crate::mock_engine::MockEngine;
use crate::mock_hub::MockHub;
use crate::recorder::record;
use secrecy::SecretString;
use session_client::events::kinds::UserAdded;
use session_client::{engine_channel, Config, Participant, SessionClient, SessionInfo, UserId};
use std::sync::Arc;

/// Token accepted by the mock hub.
pub const TEST_TOKEN: &str = "test-signed-token";

/// Topic used by [`TestClient::joined`].
pub const TEST_TOPIC: &str = "weekly-sync";

#[must_use]
pub fn test_token() -> SecretString {
    SecretString::from(TEST_TOKEN)
}

/// A participant with no roles.
#[must_use]
pub fn participant(id: u32, name: &str) -> Participant {
    Participant::new(UserId(id), name)
}

/// A participant flagged as host.
#[must_use]
pub fn host(id: u32, name: &str) -> Participant {
    let mut participant = Participant::new(UserId(id), name);
    participant.is_host = true;
    participant
}

/// A participant flagged as manager.
#[must_use]
pub fn manager(id: u32, name: &str) -> Participant {
    let mut participant = Participant::new(UserId(id), name);
    participant.is_manager = true;
    participant
}

/// A client wired to a [`MockHub`].
pub struct TestClient {
    pub client: SessionClient,
    pub engine: Arc<MockEngine>,
}

impl std::fmt::Debug for TestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestClient")
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl TestClient {
    /// Spawn an uninitialized client with default configuration.
    #[must_use]
    pub fn spawn(hub: &Arc<MockHub>) -> Self {
        Self::spawn_with(hub, Config::default())
    }

    #[must_use]
    pub fn spawn_with(hub: &Arc<MockHub>, config: Config) -> Self {
        let (events, engine_events) = engine_channel(config.engine_event_buffer);
        let engine = MockEngine::new(Arc::clone(hub), events);
        let client = SessionClient::new(config, engine.clone(), engine.clone(), engine_events);
        Self { client, engine }
    }

    /// Spawn, initialize and join [`TEST_TOPIC`] as `name`.
    ///
    /// # Panics
    ///
    /// Panics if init or join fails.
    pub async fn joined(hub: &Arc<MockHub>, name: &str) -> Self {
        Self::joined_with(hub, name, Config::default()).await
    }

    /// [`Self::joined`] with a custom configuration.
    ///
    /// # Panics
    ///
    /// Panics if init or join fails.
    pub async fn joined_with(hub: &Arc<MockHub>, name: &str, config: Config) -> Self {
        let test_client = Self::spawn_with(hub, config);
        test_client
            .client
            .init_from_config()
            .await
            .expect("init should succeed");
        test_client
            .join_as(name)
            .await
            .expect("join should succeed");
        test_client
    }

    /// Join [`TEST_TOPIC`] as `name`.
    pub async fn join_as(&self, name: &str) -> Result<SessionInfo, session_client::SdkError> {
        self.client
            .join(TEST_TOPIC, test_token(), name, None)
            .await
    }

    /// User id assigned on join.
    ///
    /// # Panics
    ///
    /// Panics before a successful join.
    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.engine.user_id().expect("client has not joined")
    }
}

/// Host and a second participant, each aware of the other.
///
/// # Panics
///
/// Panics if either join fails or the host never sees the second join.
pub async fn joined_pair(
    hub: &Arc<MockHub>,
    host_name: &str,
    guest_name: &str,
) -> (TestClient, TestClient) {
    let host = TestClient::joined(hub, host_name).await;
    let mut added = record::<UserAdded>(host.client.events());
    let guest = TestClient::joined(hub, guest_name).await;
    let guest_id = guest.user_id();
    added
        .next_matching(|batch| batch.iter().any(|p| p.user_id == guest_id))
        .await;
    (host, guest)
}
