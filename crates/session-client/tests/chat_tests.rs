//! Chat integration tests: routing, privilege policy and acknowledgement.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use session_client::events::kinds::{ChatOnMessage, ChatPrivilegeChange};
use session_client::events::ChatPrivilegePayload;
use session_client::{
    ChatPrivilege, Config, ErrorKind, SdkError, UserId, EVERYONE_DISPLAY_NAME,
};
use session_test_utils::*;
use std::time::Duration;

#[tokio::test]
async fn test_send_to_all_uses_everyone_sentinel() {
    let hub = MockHub::new();
    let (alice, bob) = joined_pair(&hub, "Alice", "Bob").await;
    let mut bob_inbox = record::<ChatOnMessage>(bob.client.events());

    let sent = alice.client.chat().send_to_all("hi").await.unwrap();
    assert_eq!(sent.message, "hi");
    assert_eq!(sent.receiver.user_id, UserId::EVERYONE);
    assert_eq!(sent.receiver.name, EVERYONE_DISPLAY_NAME);
    assert_eq!(sent.sender.user_id, alice.user_id());
    assert!(sent.is_broadcast());

    let received = bob_inbox.next().await;
    assert_eq!(received, sent);

    let history = alice.client.chat().get_history().await.unwrap();
    assert_eq!(history, vec![sent.clone()]);
    let history = bob.client.chat().get_history().await.unwrap();
    assert_eq!(history, vec![sent]);
}

#[tokio::test]
async fn test_private_message_reaches_only_receiver() {
    let hub = MockHub::new();
    let (alice, bob) = joined_pair(&hub, "Alice", "Bob").await;
    let carol = TestClient::joined(&hub, "Carol").await;
    let mut bob_inbox = record::<ChatOnMessage>(bob.client.events());
    let mut carol_inbox = record::<ChatOnMessage>(carol.client.events());

    let sent = alice
        .client
        .chat()
        .send_to_user("just you", bob.user_id())
        .await
        .unwrap();
    assert_eq!(sent.receiver.user_id, bob.user_id());
    assert_eq!(sent.receiver.name, "Bob");

    assert_eq!(bob_inbox.next().await.message, "just you");
    settle(carol.client.events()).await;
    assert!(carol_inbox.drain().is_empty());
}

#[tokio::test]
async fn test_invalid_chat_targets() {
    let hub = MockHub::new();
    let alice = TestClient::joined(&hub, "Alice").await;
    let chat = alice.client.chat();

    let result = chat.send_to_all("   ").await;
    assert!(matches!(result, Err(SdkError::InvalidParameters(_))));

    let result = chat.send_to_user("hello", UserId(999)).await;
    assert!(matches!(result, Err(SdkError::InvalidParameters(_))));

    let result = chat.send_to_user("hello me", alice.user_id()).await;
    assert!(matches!(result, Err(SdkError::InvalidParameters(_))));

    assert_eq!(alice.engine.call_count("send_chat"), 0);
}

#[tokio::test]
async fn test_no_one_blocks_participant_chat_regardless_of_target() {
    let hub = MockHub::new();
    let (alice, bob) = joined_pair(&hub, "Alice", "Bob").await;
    let mut bob_privilege = record::<ChatPrivilegeChange>(bob.client.events());

    alice
        .client
        .chat()
        .change_privilege(ChatPrivilege::NoOne)
        .await
        .unwrap();
    bob_privilege.next().await;

    let result = bob.client.chat().send_to_all("hello?").await;
    assert!(matches!(result, Err(SdkError::InsufficientPrivilege(_))));
    let result = bob
        .client
        .chat()
        .send_to_user("hello?", alice.user_id())
        .await;
    let err = result.unwrap_err();
    assert!(matches!(err, SdkError::InsufficientPrivilege(_)));
    assert_eq!(err.kind(), ErrorKind::Privilege);

    let result = bob.client.chat().send_to_user("hello?", UserId(999)).await;
    assert!(matches!(result, Err(SdkError::InsufficientPrivilege(_))));
    let result = bob.client.chat().send_to_all("").await;
    assert!(matches!(result, Err(SdkError::InsufficientPrivilege(_))));

    assert!(bob.client.chat().get_receivers().await.unwrap().is_empty());

    // Host is exempt.
    alice.client.chat().send_to_all("quiet please").await.unwrap();
}

#[tokio::test]
async fn test_everyone_publicly_requires_privilege_and_notifies_all_listeners() {
    let hub = MockHub::new();
    let (alice, bob) = joined_pair(&hub, "Alice", "Bob").await;

    let result = bob
        .client
        .chat()
        .change_privilege(ChatPrivilege::EveryonePublicly)
        .await;
    assert!(matches!(result, Err(SdkError::InsufficientPrivilege(_))));
    assert_eq!(hub.chat_privilege(), ChatPrivilege::All);

    let mut first = record::<ChatPrivilegeChange>(alice.client.events());
    let mut second = record::<ChatPrivilegeChange>(alice.client.events());
    let mut remote = record::<ChatPrivilegeChange>(bob.client.events());

    alice
        .client
        .chat()
        .change_privilege(ChatPrivilege::EveryonePublicly)
        .await
        .unwrap();
    assert_eq!(
        alice.client.chat().get_privilege().await.unwrap(),
        ChatPrivilege::EveryonePublicly
    );

    let expected = ChatPrivilegePayload {
        chat_privilege: ChatPrivilege::EveryonePublicly,
    };
    for recorder in [&mut first, &mut second, &mut remote] {
        let payload = recorder.next().await;
        assert_eq!(payload, expected);
        assert_eq!(
            serde_json::to_value(payload).unwrap(),
            serde_json::json!({ "chatPrivilege": 5 })
        );
    }

    // Participants may now only address everyone.
    let result = bob
        .client
        .chat()
        .send_to_user("psst", alice.user_id())
        .await;
    assert!(matches!(result, Err(SdkError::InsufficientPrivilege(_))));
    bob.client.chat().send_to_all("hello all").await.unwrap();

    let receivers = bob.client.chat().get_receivers().await.unwrap();
    assert_eq!(receivers.len(), 1);
    assert_eq!(receivers[0].user_id, UserId::EVERYONE);
}

#[tokio::test(start_paused = true)]
async fn test_privilege_change_times_out_without_acknowledgement() {
    let hub = MockHub::new();
    let config = Config {
        privilege_ack_timeout: Duration::from_secs(3),
        ..Config::default()
    };
    let alice = TestClient::joined_with(&hub, "Alice", config).await;
    hub.drop_privilege_acks(true);

    let chat = alice.client.chat();
    let (first, second) = tokio::join!(chat.change_privilege(ChatPrivilege::NoOne), async {
        tokio::task::yield_now().await;
        chat.change_privilege(ChatPrivilege::All).await
    });

    assert!(matches!(second, Err(SdkError::DuplicateOperation(_))));
    let err = first.unwrap_err();
    assert!(matches!(err, SdkError::Timeout("change_privilege")));
    assert_eq!(err.kind(), ErrorKind::Timeout);

    // Not acknowledged, so the local view did not move.
    assert_eq!(chat.get_privilege().await.unwrap(), ChatPrivilege::All);

    // The slot is free again once the timeout fired.
    hub.drop_privilege_acks(false);
    chat.change_privilege(ChatPrivilege::NoOne).await.unwrap();
}

#[tokio::test]
async fn test_history_is_bounded() {
    let hub = MockHub::new();
    let config = Config {
        chat_history_limit: 2,
        ..Config::default()
    };
    let alice = TestClient::joined_with(&hub, "Alice", config).await;
    let chat = alice.client.chat();

    for text in ["one", "two", "three"] {
        chat.send_to_all(text).await.unwrap();
    }

    let history: Vec<String> = chat
        .get_history()
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.message)
        .collect();
    assert_eq!(history, vec!["two".to_string(), "three".to_string()]);
}
