//! Coordination Backend Tests
//!
//! Exercises the in-process lease store the way the presence registry uses it.
//!
//! ## Test Scopes
//! - **Leases**: Expiry after TTL, renewal through keep-alive, explicit revocation.
//! - **Enumeration**: Prefix scans return only live keys; empty scans are not errors.
//! - **Outages**: An unreachable backend fails calls and closes keep-alive streams.

#[cfg(test)]
mod tests {
    use crate::coordination::backend::CoordinationBackend;
    use crate::coordination::memory::MemoryCoordinator;
    use crate::coordination::types::{BackendError, LeaseId};
    use std::time::Duration;

    const TTL: Duration = Duration::from_secs(3);

    // ============================================================
    // LEASE TESTS
    // ============================================================

    #[tokio::test(start_paused = true)]
    async fn test_key_expires_with_lease() {
        let backend = MemoryCoordinator::new();
        let lease = backend.grant_lease(TTL).await.unwrap();
        backend
            .put_with_lease("/peers/a", "127.0.0.1:5001", lease)
            .await
            .unwrap();

        assert_eq!(backend.get_prefix("/peers/").await.unwrap().len(), 1);

        tokio::time::sleep(TTL + Duration::from_millis(1)).await;

        let records = backend.get_prefix("/peers/").await.unwrap();
        assert!(records.is_empty(), "Expired lease should take its key with it");
        assert_eq!(backend.live_lease_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_alive_extends_lease() {
        let backend = MemoryCoordinator::new();
        let lease = backend.grant_lease(TTL).await.unwrap();
        backend.put_with_lease("/peers/a", "addr", lease).await.unwrap();

        let mut stream = backend.keep_alive(lease).await.unwrap();

        // Consume acknowledgements well past the original TTL.
        for _ in 0..10 {
            let ack = stream.recv().await.expect("stream should stay open");
            assert_eq!(ack.lease, lease);
            assert_eq!(ack.ttl, TTL);
        }

        assert_eq!(backend.lease_of("/peers/a"), Some(lease));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_stream_stops_renewal() {
        let backend = MemoryCoordinator::new();
        let lease = backend.grant_lease(TTL).await.unwrap();
        backend.put_with_lease("/peers/a", "addr", lease).await.unwrap();

        let stream = backend.keep_alive(lease).await.unwrap();
        drop(stream);

        tokio::time::sleep(TTL * 2).await;
        assert!(backend.get_prefix("/peers/").await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_revoke_closes_keep_alive_stream() {
        let backend = MemoryCoordinator::new();
        let lease = backend.grant_lease(TTL).await.unwrap();
        backend.put_with_lease("/peers/a", "addr", lease).await.unwrap();
        let mut stream = backend.keep_alive(lease).await.unwrap();

        backend.revoke_lease(lease);

        assert!(stream.recv().await.is_none(), "Revocation should close the stream");
        assert!(backend.get_prefix("/peers/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_put_requires_live_lease() {
        let backend = MemoryCoordinator::new();

        let result = backend.put_with_lease("/peers/a", "addr", LeaseId(999)).await;
        assert_eq!(result, Err(BackendError::LeaseNotFound(LeaseId(999))));
    }

    // ============================================================
    // ENUMERATION TESTS
    // ============================================================

    #[tokio::test]
    async fn test_prefix_scan_filters_namespace() {
        let backend = MemoryCoordinator::new();
        let lease = backend.grant_lease(TTL).await.unwrap();
        backend.put_with_lease("/peers/b", "2", lease).await.unwrap();
        backend.put_with_lease("/peers/a", "1", lease).await.unwrap();
        backend.put_with_lease("/other/c", "3", lease).await.unwrap();

        let records = backend.get_prefix("/peers/").await.unwrap();
        assert_eq!(
            records,
            vec![
                ("/peers/a".to_string(), "1".to_string()),
                ("/peers/b".to_string(), "2".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_prefix_scan_is_ok() {
        let backend = MemoryCoordinator::new();
        let records = backend.get_prefix("/peers/").await;
        assert_eq!(records, Ok(vec![]));
    }

    // ============================================================
    // OUTAGE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_unreachable_backend_fails_calls() {
        let backend = MemoryCoordinator::new();
        backend.set_reachable(false);

        assert!(matches!(
            backend.grant_lease(TTL).await,
            Err(BackendError::Unavailable(_))
        ));
        assert!(matches!(
            backend.get_prefix("/peers/").await,
            Err(BackendError::Unavailable(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_outage_closes_keep_alive_stream() {
        let backend = MemoryCoordinator::new();
        let lease = backend.grant_lease(TTL).await.unwrap();
        let mut stream = backend.keep_alive(lease).await.unwrap();

        assert!(stream.recv().await.is_some());
        backend.set_reachable(false);
        assert!(stream.recv().await.is_none());
    }
}
