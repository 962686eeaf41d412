//! Session cache tests against a live server

use std::sync::Arc;
use std::time::Duration;

use autodeploy::ssh::SessionCache;

use super::fixtures::SshTestEnvironment;

#[tokio::test]
async fn test_cache_reuses_live_session() {
    skip_if_no_server!();
    let _guard = super::fixtures::acquire_test_lock().await;

    let env = SshTestEnvironment::new()
        .await
        .expect("Failed to create test environment");
    let cache = SessionCache::start(Arc::new(env.transport()), Duration::from_secs(30));

    let first = cache
        .acquire_long_lived(&env.server.target())
        .await
        .expect("first acquire should connect");
    let second = cache
        .acquire_long_lived(&env.server.target())
        .await
        .expect("second acquire should reuse");
    assert!(Arc::ptr_eq(&first, &second));

    // A closed session fails its probe and is replaced
    first.close().await;
    let third = cache
        .acquire_long_lived(&env.server.target())
        .await
        .expect("acquire after close should reconnect");
    assert!(!Arc::ptr_eq(&first, &third));
    assert!(!third.is_closed());

    cache.shutdown().await;
    assert!(cache.is_empty());
    assert!(third.is_closed());
}
