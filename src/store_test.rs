use std::sync::atomic::{AtomicU32, Ordering};

use super::*;

fn memory_session_store() -> SessionStore {
    SessionStore::new(Arc::new(MemoryStore::new()))
}

fn scratch_path(label: &str) -> PathBuf {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let n = COUNTER.fetch_add(1, Ordering::SeqCst);
    std::env::temp_dir().join(format!("authgate-{label}-{}-{n}.json", std::process::id()))
}

// =========================================================================
// KeyValueStore contract
// =========================================================================

#[tokio::test]
async fn absent_keys_read_as_empty_values() {
    let store = memory_session_store();
    assert_eq!(store.token().await.unwrap(), None);
    assert!(!store.remember_me().await.unwrap());
    assert_eq!(store.pending_verification_email().await.unwrap(), None);
    assert_eq!(store.forgot_password_context().await.unwrap(), None);
}

#[tokio::test]
async fn token_round_trip_and_clear() {
    let store = memory_session_store();
    store.save_token("abc123").await.unwrap();
    assert_eq!(store.token().await.unwrap().as_deref(), Some("abc123"));
    store.clear_token().await.unwrap();
    assert_eq!(store.token().await.unwrap(), None);
}

#[tokio::test]
async fn remember_me_round_trip() {
    let store = memory_session_store();
    store.save_remember_me(true).await.unwrap();
    assert!(store.remember_me().await.unwrap());
    store.save_remember_me(false).await.unwrap();
    assert!(!store.remember_me().await.unwrap());
}

#[tokio::test]
async fn blank_pending_email_reads_as_absent() {
    let store = memory_session_store();
    store.save_pending_verification_email("  ").await.unwrap();
    assert_eq!(store.pending_verification_email().await.unwrap(), None);
}

#[tokio::test]
async fn forgot_context_round_trip() {
    let store = memory_session_store();
    let context = ForgotPasswordContext { email: "a@b.com".into(), code: "123456".into() };
    store.save_forgot_password_context(&context).await.unwrap();
    assert_eq!(store.forgot_password_context().await.unwrap(), Some(context));
    store.clear_forgot_password_context().await.unwrap();
    assert_eq!(store.forgot_password_context().await.unwrap(), None);
}

#[tokio::test]
async fn unreadable_forgot_context_reads_as_absent() {
    let kv = Arc::new(MemoryStore::new());
    kv.set("forgot_password_context", "not json").await.unwrap();
    let store = SessionStore::new(kv);
    assert_eq!(store.forgot_password_context().await.unwrap(), None);
}

// =========================================================================
// FileStore durability
// =========================================================================

#[tokio::test]
async fn file_store_survives_reopen() {
    let path = scratch_path("reopen");

    {
        let store = SessionStore::new(Arc::new(FileStore::open(&path).await.unwrap()));
        store.save_pending_verification_email("a@b.com").await.unwrap();
        store.save_remember_me(true).await.unwrap();
        store.save_token("tok").await.unwrap();
    }

    // Fresh handle over the same file simulates a process restart.
    let store = SessionStore::new(Arc::new(FileStore::open(&path).await.unwrap()));
    assert_eq!(
        store.pending_verification_email().await.unwrap().as_deref(),
        Some("a@b.com")
    );
    assert!(store.remember_me().await.unwrap());
    assert_eq!(store.token().await.unwrap().as_deref(), Some("tok"));

    let _ = tokio::fs::remove_file(&path).await;
}

#[tokio::test]
async fn file_store_remove_persists() {
    let path = scratch_path("remove");

    {
        let store = FileStore::open(&path).await.unwrap();
        store.set("auth_token", "tok").await.unwrap();
        store.remove("auth_token").await.unwrap();
    }

    let store = FileStore::open(&path).await.unwrap();
    assert_eq!(store.get("auth_token").await.unwrap(), None);

    let _ = tokio::fs::remove_file(&path).await;
}

#[tokio::test]
async fn missing_file_is_an_empty_store() {
    let path = scratch_path("missing");
    let store = FileStore::open(&path).await.unwrap();
    assert_eq!(store.get("anything").await.unwrap(), None);
}

#[tokio::test]
async fn corrupt_file_is_an_empty_store() {
    let path = scratch_path("corrupt");
    tokio::fs::write(&path, b"{{{ not json").await.unwrap();
    let store = FileStore::open(&path).await.unwrap();
    assert_eq!(store.get("anything").await.unwrap(), None);
    let _ = tokio::fs::remove_file(&path).await;
}
