use mv_domain::config::SessionsConfig;
use mv_domain::error::SessionError;
use mv_sessions::SessionManager;
use mv_store::{LocalBackend, MemoryBackend};
use tempfile::TempDir;

#[tokio::test]
async fn session_1001_evicts_first_but_its_files_survive() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let store = LocalBackend::new(dir.path()).unwrap();
    let manager = SessionManager::new(SessionsConfig {
        max_sessions: 1000,
        ..SessionsConfig::default()
    });

    let first = manager.create_session();
    {
        let mut lease = manager.lease(&first).await.unwrap();
        let path = store
            .create("/memories/first/notes.md", "written by session one\n")
            .await
            .unwrap();
        lease.mark_touched(path.to_string());
    }

    for _ in 1..1000 {
        manager.create_session();
    }
    assert_eq!(manager.len(), 1000);

    let newest = manager.create_session();
    assert_eq!(manager.len(), 1000);
    assert!(manager.contains(&newest));

    assert_eq!(
        manager.get_session(&first).await.unwrap_err(),
        SessionError::SessionNotFound(first.clone())
    );
    let view = store.view("/memories/first/notes.md", None).await.unwrap();
    assert_eq!(view.render(), "   1: written by session one");
}

#[tokio::test]
async fn unknown_session_id_is_not_found() {
    let manager = SessionManager::new(SessionsConfig::default());
    assert_eq!(
        manager.resolve(Some("does-not-exist")).unwrap_err(),
        SessionError::SessionNotFound("does-not-exist".into())
    );
    let id = manager.resolve(None).unwrap();
    assert_eq!(manager.resolve(Some(&id)).unwrap(), id);
}
