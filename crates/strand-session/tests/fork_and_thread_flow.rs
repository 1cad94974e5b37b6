//! End-to-end fork and thread flow against the in-memory store.

use std::sync::Arc;

use strand_core::{Message, MessageId, Session, SessionId};
use strand_session::{
    ForkDirection, ForkEngine, ForkInfo, ForkOutcome, GenerationRegistry, MemorySessionStore,
    SessionStore, ThreadArchive,
};

fn msg(id: &str) -> Message {
    Message::user(id).with_id(id)
}

async fn append(store: &MemorySessionStore, id: &SessionId, message: Message) {
    let _ = store
        .update_session(
            id,
            Box::new(move |s| {
                s.timeline.messages.push(message);
                true
            }),
        )
        .await
        .unwrap();
}

async fn live_ids(store: &MemorySessionStore, id: &SessionId) -> Vec<String> {
    store
        .get_session(id)
        .await
        .unwrap()
        .unwrap()
        .messages()
        .iter()
        .map(|m| m.id.to_string())
        .collect()
}

#[tokio::test]
async fn regenerate_switch_archive_and_restore() {
    let session = Session::with_messages(
        "chat",
        vec![Message::system("sys").with_id("sys"), msg("q"), msg("a1")],
    );
    let id = session.id.clone();
    let store = Arc::new(MemorySessionStore::new());
    store.insert(session);
    let forks = ForkEngine::new(store.clone());
    let threads = ThreadArchive::new(store.clone(), Arc::new(GenerationRegistry::new()));
    let q = MessageId::from("q");

    // regenerate the answer twice
    assert_eq!(forks.create_new_fork(&id, &q).await.unwrap(), ForkOutcome::Applied);
    append(&store, &id, msg("a2")).await;
    assert_eq!(forks.create_new_fork(&id, &q).await.unwrap(), ForkOutcome::Applied);
    append(&store, &id, msg("a3")).await;
    assert_eq!(
        forks.fork_info(&id, &q).await.unwrap(),
        Some(ForkInfo { position: 2, total: 3 })
    );

    // walk the branches
    let _ = forks.switch_fork(&id, &q, ForkDirection::Next).await.unwrap();
    assert_eq!(live_ids(&store, &id).await, vec!["sys", "q", "a1"]);
    let _ = forks.switch_fork_to_position(&id, &q, 1).await.unwrap();
    assert_eq!(live_ids(&store, &id).await, vec!["sys", "q", "a2"]);

    // archive and restore keeps the fork entry with its timeline
    let _ = threads
        .archive_current_timeline(&id, Some("scratch".into()))
        .await
        .unwrap();
    let archived = store.get_session(&id).await.unwrap().unwrap();
    assert_eq!(archived.messages().len(), 1);
    assert!(archived.timeline.forks.is_empty());
    let thread_id = archived.threads[0].id.clone();

    // fork operations reach into the archived thread
    let _ = forks.switch_fork(&id, &q, ForkDirection::Next).await.unwrap();

    let _ = threads.switch_thread(&id, &thread_id).await.unwrap();
    assert_eq!(live_ids(&store, &id).await, vec!["sys", "q", "a3"]);
    assert_eq!(
        forks.fork_info(&id, &q).await.unwrap(),
        Some(ForkInfo { position: 2, total: 3 })
    );

    let restored = store.get_session(&id).await.unwrap().unwrap();
    assert_eq!(restored.threads.len(), 1);
    assert_eq!(restored.threads[0].name, "scratch");
    assert!(restored.timeline.check_forks().is_ok());
}
