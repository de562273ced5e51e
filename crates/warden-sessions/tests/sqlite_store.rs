use chrono::Utc;
use warden_sessions::{AuthState, ConversationState, SqliteStateStore, StateStore, UserState};

#[tokio::test]
async fn state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("warden.db");

    {
        let store = SqliteStateStore::open(&path).unwrap();
        let mut conv = ConversationState::default();
        let session = conv.session_mut("u1");
        session.transition(AuthState::Prompting).unwrap();
        session.await_token(Utc::now(), 300_000).unwrap();
        store.save_conversation("c1", &conv).await.unwrap();
        store
            .save_user(
                "u1",
                &UserState {
                    signin_count: 1,
                    last_command: Some("help".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    let store = SqliteStateStore::open(&path).unwrap();
    let conv = store.load_conversation("c1").await.unwrap();
    let session = conv.session("u1").unwrap();
    assert_eq!(session.state, AuthState::AwaitingToken);
    assert!(session.prompt_deadline.is_some());

    let user = store.load_user("u1").await.unwrap();
    assert_eq!(user.signin_count, 1);
    assert_eq!(user.last_command.as_deref(), Some("help"));
}

#[tokio::test]
async fn save_overwrites_previous_value() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStateStore::open(&dir.path().join("s.db")).unwrap();

    let mut conv = ConversationState::default();
    conv.session_mut("u1").transition(AuthState::Prompting).unwrap();
    store.save_conversation("c1", &conv).await.unwrap();

    conv.clear("u1");
    store.save_conversation("c1", &conv).await.unwrap();

    let loaded = store.load_conversation("c1").await.unwrap();
    assert!(loaded.sessions.is_empty());
}

#[tokio::test]
async fn unknown_keys_load_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStateStore::open(&dir.path().join("s.db")).unwrap();
    assert!(store.load_conversation("nope").await.unwrap().sessions.is_empty());
    assert!(store.load_user("nope").await.unwrap().last_seen_at.is_none());
}
