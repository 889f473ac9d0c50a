/// Conversation flow tests
/// End-to-end behaviour of the store, history merge and live session

extern crate chatline_core;

use chatline_core::event::{AgentStatus, ConversationTurn};
use chatline_core::history::PromptRole;
use chatline_core::sse::SseDecoder;
use chatline_core::{
    decode, ChatError, ChatSession, Config, ConversationKey, DisplayMessage, HistoryOrder,
    MessageId, MessageKind, MessagePatch, MessageStore, Prompt, Role, StoreOp, StreamEvent,
    StreamOutcome,
};
use chrono::{TimeZone, Utc};
use std::time::Duration;

fn msg(id: &str, role: Role, text: &str) -> DisplayMessage {
    let kind = match role {
        Role::User => MessageKind::UserMessage,
        _ => MessageKind::AgentMessage,
    };
    DisplayMessage::new(MessageId::from(id), role, kind, text)
}

fn ids(store: &MessageStore, key: &ConversationKey) -> Vec<String> {
    store
        .get_messages(key)
        .iter()
        .map(|m| m.id.to_string())
        .collect()
}

fn prompt(id: &str, kind: PromptRole, secs: i64) -> Prompt {
    Prompt {
        id: id.to_string(),
        app_id: "app-1".to_string(),
        kind,
        prompt: format!("prompt {}", id),
        message_kind: None,
        metadata: None,
        created_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
    }
}

#[test]
fn test_store_scenario_with_placeholder() {
    let store = MessageStore::default();
    let key = ConversationKey::new("chat-1");

    store.add_message(&key, msg("m1", Role::User, "hi"));
    assert_eq!(store.len(&key), 1);

    store.add_loading_message(&key, msg("loading-message", Role::Assistant, "..."));
    assert_eq!(store.len(&key), 2);
    assert!(store.get_messages(&key)[1].is_placeholder());

    store.add_message(&key, msg("m2", Role::Assistant, "hello"));
    assert_eq!(ids(&store, &key), vec!["m1", "m2", "loading-message"]);

    assert!(store.update_message(&key, &MessageId::Placeholder, MessagePatch::text("done")));
    let messages = store.get_messages(&key);
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[2].text, "done");
    assert!(messages[2].is_placeholder());

    assert!(store.remove_message(&key, &MessageId::Placeholder));
    assert_eq!(ids(&store, &key), vec!["m1", "m2"]);
}

#[test]
fn test_add_message_with_placeholder_inserts_at_len_minus_one() {
    let store = MessageStore::default();
    let key = ConversationKey::new("chat-1");

    for i in 0..3 {
        store.add_message(&key, msg(&format!("m{}", i), Role::User, "x"));
    }
    store.add_loading_message(&key, DisplayMessage::placeholder("..."));

    let before = store.len(&key);
    store.add_message(&key, msg("new", Role::Assistant, "y"));

    let messages = store.get_messages(&key);
    assert_eq!(messages.len(), before + 1);
    assert_eq!(messages[messages.len() - 2].id, MessageId::from("new"));
    assert!(messages.last().unwrap().is_placeholder());
}

#[test]
fn test_history_then_live_stream_interleave() {
    let store = MessageStore::default();
    let key = ConversationKey::new("app-1");
    let mut session = ChatSession::new(store.clone(), key.clone(), &Config::default());

    let history = vec![
        prompt("p1", PromptRole::User, 1),
        prompt("p2", PromptRole::Assistant, 2),
    ];
    assert_eq!(session.load_history(&history).unwrap(), 2);

    let sent = session.send_user_message("add dark mode");
    let mut decoder = SseDecoder::new();
    let live = decoder.push(
        concat!(
            ": connected\n\n",
            r#"data: {"message":{"kind":"StageResult","messages":[{"role":"assistant","content":"Plan ready"}]},"status":"running","traceId":"t1"}"#,
            "\n\n",
            r#"data: {"message":{"kind":"PlatformMessage","messages":[{"role":"assistant","content":"Live!"}],"metadata":{"type":"deploy_success","deploymentUrl":"https://app.example"}},"status":"idle","traceId":"t1"}"#,
            "\n\n",
        )
        .as_bytes(),
    );
    assert_eq!(live.len(), 2);

    for event in live {
        session.apply(&event.unwrap()).unwrap();
    }

    let messages = store.get_messages(&key);
    assert_eq!(messages.len(), 5);
    assert!(messages[0].is_history && messages[1].is_history);
    assert_eq!(messages[2].id, sent);
    assert!(!messages[2].is_history);
    assert_eq!(messages[3].kind, MessageKind::StageResult);
    assert_eq!(messages[4].title(), "Deployed");
    assert!(messages.iter().all(|m| !m.is_placeholder()));
}

#[test]
fn test_history_order_policies() {
    let prompts = vec![
        prompt("t2", PromptRole::User, 2),
        prompt("t1", PromptRole::Assistant, 1),
        prompt("t3", PromptRole::User, 3),
    ];
    let store = MessageStore::default();
    let key = ConversationKey::new("chat-1");

    let strict = ChatSession::new(store.clone(), key.clone(), &Config::default());
    assert!(matches!(
        strict.load_history(&prompts),
        Err(ChatError::HistoryOrder { index: 1 })
    ));
    assert!(store.is_empty(&key));

    let config = Config {
        history_order: HistoryOrder::Resort,
        ..Default::default()
    };
    let resorting = ChatSession::new(store.clone(), key.clone(), &config);
    resorting.load_history(&prompts).unwrap();
    assert_eq!(ids(&store, &key), vec!["t1", "t2", "t3"]);
}

#[test]
fn test_decode_batch_has_no_drops() {
    let events: Vec<StreamEvent> = [3usize, 0, 2, 1]
        .iter()
        .map(|&n| {
            StreamEvent::new(
                MessageKind::AgentMessage,
                (0..n)
                    .map(|i| ConversationTurn {
                        role: Role::Assistant,
                        content: format!("{}", i),
                    })
                    .collect(),
                AgentStatus::Running,
            )
        })
        .collect();

    assert_eq!(decode(&events, false).unwrap().len(), 6);
}

#[tokio::test]
async fn test_subscriber_observes_writes_from_another_handle() {
    let store = MessageStore::default();
    let key = ConversationKey::new("chat-1");
    let mut sub = store.subscribe(&key);

    let writer = store.clone();
    let k = key.clone();
    tokio::spawn(async move {
        writer.add_message(&ConversationKey::new("other"), msg("x", Role::User, "x"));
        writer.add_loading_message(&k, DisplayMessage::placeholder("..."));
    });

    let change = tokio::time::timeout(Duration::from_secs(2), sub.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(change.key, key);
    assert_eq!(change.op, StoreOp::Loading);
    assert_eq!(store.len(&key), 1);
}

#[tokio::test]
async fn test_stream_error_keeps_prior_messages() {
    let store = MessageStore::default();
    let key = ConversationKey::new("chat-1");
    let mut session = ChatSession::new(store.clone(), key.clone(), &Config::default());
    session.send_user_message("hi");

    let first = StreamEvent::new(
        MessageKind::AgentMessage,
        vec![ConversationTurn {
            role: Role::Assistant,
            content: "partial".to_string(),
        }],
        AgentStatus::Running,
    );
    let items = vec![
        Ok(first),
        Err(ChatError::Stream("connection reset".to_string())),
    ];

    let err = session
        .consume(futures_util::stream::iter(items))
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::Stream(_)));

    let messages = store.get_messages(&key);
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[1].text, "partial");
    assert!(messages[2].is_placeholder());
}

#[tokio::test]
async fn test_completed_stream_reports_applied_count() {
    let store = MessageStore::default();
    let key = ConversationKey::new("chat-1");
    let mut session = ChatSession::new(store.clone(), key, &Config::default());
    session.send_user_message("hi");

    let event = StreamEvent::new(
        MessageKind::ReviewResult,
        vec![
            ConversationTurn {
                role: Role::Assistant,
                content: "Looks good".to_string(),
            },
            ConversationTurn {
                role: Role::Assistant,
                content: "Ship it".to_string(),
            },
        ],
        AgentStatus::Idle,
    );

    let outcome = session
        .consume(futures_util::stream::iter(vec![Ok(event)]))
        .await
        .unwrap();
    assert_eq!(outcome, StreamOutcome::Completed { applied: 2 });
    assert_eq!(session.messages().len(), 3);
}
