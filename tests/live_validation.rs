use std::{env, path::Path, sync::Once};

use docsift::{
    config,
    processing::{Chunk, ProcessingService},
    qdrant::QdrantService,
    storage::ChunkStore,
};
use uuid::Uuid;

static INIT: Once = Once::new();

fn set_default_env(key: &str, value: &str) {
    let needs_value = env::var(key).map(|v| v.trim().is_empty()).unwrap_or(true);
    if needs_value {
        // SAFETY: Tests run serially via Once and we intentionally mutate process env.
        unsafe {
            env::set_var(key, value);
        }
    }
}

fn init_config_once() {
    INIT.call_once(|| {
        set_default_env("QDRANT_URL", "http://127.0.0.1:6333");
        set_default_env("QDRANT_COLLECTION_NAME", "docsift-live");
        set_default_env("STORAGE_BACKEND", "qdrant");
        set_default_env("EMBEDDING_PROVIDER", "hashing");
        set_default_env("EMBEDDING_MODEL", "hashing");
        set_default_env("EMBEDDING_DIMENSION", "32");
        config::init_config();
    });
}

#[tokio::test]
#[ignore = "Requires live Qdrant"]
async fn live_qdrant_round_trip_marks_session_present() {
    init_config_once();
    // Prepares the collection and payload indexes.
    let _service = ProcessingService::new().await.expect("service");

    let store = QdrantService::from_config(config::get_config()).expect("qdrant client");
    let session_id = Uuid::new_v4().to_string();
    assert!(!store.session_exists(&session_id).await.expect("count"));

    let chunks = vec![Chunk {
        text: "live validation chunk".into(),
        index: 0,
    }];
    let written = store
        .insert_document_chunks(&session_id, Path::new("live.pdf"), &chunks, vec![vec![0.5; 32]])
        .await
        .expect("insert");

    assert_eq!(written, 1);
    assert!(store.session_exists(&session_id).await.expect("count"));
}
