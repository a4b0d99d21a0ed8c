use bytes::Bytes;
use mirage_storage::{
    FsObjectStore, JSON_CONTENT_TYPE, MemoryObjectStore, ObjectStore, StorageError, put_json,
};
use serde_json::json;

async fn exercise(store: &dyn ObjectStore) {
    store
        .put("logs/2025-01-02/b.json", Bytes::from_static(b"{\"b\":1}"), JSON_CONTENT_TYPE)
        .await
        .unwrap();
    store
        .put("logs/2025-01-01/a.json", Bytes::from_static(b"{\"a\":1}"), JSON_CONTENT_TYPE)
        .await
        .unwrap();
    put_json(store, "health/2025-01-01T00:00:00Z.json", &json!({"ok": true}))
        .await
        .unwrap();

    assert_eq!(
        store.get("logs/2025-01-01/a.json").await.unwrap(),
        Some(Bytes::from_static(b"{\"a\":1}"))
    );
    assert_eq!(store.get("logs/missing.json").await.unwrap(), None);

    assert_eq!(
        store.list("logs/").await.unwrap(),
        vec![
            "logs/2025-01-01/a.json".to_string(),
            "logs/2025-01-02/b.json".to_string()
        ]
    );
    assert_eq!(
        store.list("logs/2025-01-02").await.unwrap(),
        vec!["logs/2025-01-02/b.json".to_string()]
    );
    assert_eq!(
        store.list("health/").await.unwrap(),
        vec!["health/2025-01-01T00:00:00Z.json".to_string()]
    );
    assert!(store.list("nothing/").await.unwrap().is_empty());

    let stored = store.get("health/2025-01-01T00:00:00Z.json").await.unwrap().unwrap();
    let value: serde_json::Value = serde_json::from_slice(&stored).unwrap();
    assert_eq!(value, json!({"ok": true}));

    let err = store
        .put("../escape.json", Bytes::new(), JSON_CONTENT_TYPE)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidKey(_)));
}

#[tokio::test]
async fn memory_store_contract() {
    let store = MemoryObjectStore::new();
    exercise(&store).await;
    assert_eq!(
        store.object("logs/2025-01-01/a.json").unwrap().content_type,
        JSON_CONTENT_TYPE
    );
}

#[tokio::test]
async fn fs_store_contract() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsObjectStore::new(dir.path());
    exercise(&store).await;
    assert!(dir.path().join("logs").join("2025-01-01").join("a.json").is_file());
}

#[tokio::test]
async fn overwrite_replaces_body() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsObjectStore::new(dir.path());
    store
        .put("k.json", Bytes::from_static(b"1"), JSON_CONTENT_TYPE)
        .await
        .unwrap();
    store
        .put("k.json", Bytes::from_static(b"2"), JSON_CONTENT_TYPE)
        .await
        .unwrap();
    assert_eq!(store.get("k.json").await.unwrap(), Some(Bytes::from_static(b"2")));
    assert_eq!(store.list("").await.unwrap(), vec!["k.json".to_string()]);
}

#[tokio::test]
async fn failing_puts_surface_errors() {
    let store = MemoryObjectStore::new();
    store.set_fail_puts(true);
    let err = store
        .put("k.json", Bytes::new(), JSON_CONTENT_TYPE)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Unavailable(_)));
    assert!(store.is_empty());
}
