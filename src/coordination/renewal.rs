//! Paced lease renewal shared by remote coordination backends.

use super::types::{BackendError, KeepAliveAck, LeaseId};

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;

/// One keep-alive round trip against a remote lease store.
#[async_trait]
pub trait LeaseRenewer: Send {
    /// Renews the lease and returns the TTL left on it in seconds, or `None` once the
    /// backend has closed its side of the exchange.
    async fn renew(&mut self) -> Result<Option<i64>, BackendError>;
}

/// Renews `lease` every `period` and reports each success on `tx`.
///
/// Returns when the receiver is dropped, the lease is gone, or a round trip fails or
/// takes longer than `ttl`.
pub async fn drive_renewal<R: LeaseRenewer>(
    lease: LeaseId,
    ttl: Duration,
    period: Duration,
    tx: mpsc::Sender<KeepAliveAck>,
    mut renewer: R,
) {
    let mut ticker = tokio::time::interval(period);

    loop {
        tokio::select! {
            biased;
            _ = tx.closed() => break,
            _ = ticker.tick() => {}
        }

        // A silent partition must close the stream rather than stall it.
        let reply = match tokio::time::timeout(ttl, renewer.renew()).await {
            Ok(reply) => reply,
            Err(_) => {
                tracing::warn!("Keep-alive for {:?} timed out after {:?}", lease, ttl);
                break;
            }
        };

        match reply {
            Ok(Some(secs)) if secs > 0 => {
                let ack = KeepAliveAck {
                    lease,
                    ttl: Duration::from_secs(secs as u64),
                };
                if tx.send(ack).await.is_err() {
                    break;
                }
            }
            Ok(Some(_)) => {
                tracing::warn!("Lease {:?} expired on the backend", lease);
                break;
            }
            Ok(None) => {
                tracing::warn!("Keep-alive stream for {:?} ended", lease);
                break;
            }
            Err(e) => {
                tracing::warn!("Keep-alive for {:?} failed: {}", lease, e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    const TTL: Duration = Duration::from_secs(3);
    const PERIOD: Duration = Duration::from_secs(1);

    enum Step {
        Reply(Result<Option<i64>, BackendError>),
        Hang,
    }

    struct ScriptedRenewer(VecDeque<Step>);

    #[async_trait]
    impl LeaseRenewer for ScriptedRenewer {
        async fn renew(&mut self) -> Result<Option<i64>, BackendError> {
            match self.0.pop_front() {
                Some(Step::Reply(reply)) => reply,
                Some(Step::Hang) | None => std::future::pending().await,
            }
        }
    }

    fn script(steps: Vec<Step>) -> ScriptedRenewer {
        ScriptedRenewer(steps.into())
    }

    #[tokio::test(start_paused = true)]
    async fn test_acks_until_backend_closes() {
        let (tx, mut rx) = mpsc::channel(8);
        let renewer = script(vec![
            Step::Reply(Ok(Some(3))),
            Step::Reply(Ok(Some(2))),
            Step::Reply(Ok(None)),
        ]);

        drive_renewal(LeaseId(7), TTL, PERIOD, tx, renewer).await;

        let first = rx.recv().await.unwrap();
        assert_eq!(first.lease, LeaseId(7));
        assert_eq!(first.ttl, Duration::from_secs(3));
        assert_eq!(rx.recv().await.unwrap().ttl, Duration::from_secs(2));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_renewal_closes_stream_after_ttl() {
        let (tx, mut rx) = mpsc::channel(8);
        let renewer = script(vec![Step::Reply(Ok(Some(3))), Step::Hang]);
        let started = tokio::time::Instant::now();

        let driver = tokio::spawn(drive_renewal(LeaseId(1), TTL, PERIOD, tx, renewer));

        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none(), "Stalled renewal must end the stream");
        driver.await.unwrap();

        let elapsed = started.elapsed();
        assert!(elapsed >= PERIOD + TTL, "Closed too early: {:?}", elapsed);
        assert!(elapsed < PERIOD + TTL + PERIOD, "Closed too late: {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_lease_or_error_ends_stream() {
        for step in [
            Step::Reply(Ok(Some(0))),
            Step::Reply(Err(BackendError::unavailable("connection reset"))),
        ] {
            let (tx, mut rx) = mpsc::channel(8);
            drive_renewal(LeaseId(2), TTL, PERIOD, tx, script(vec![step])).await;
            assert!(rx.recv().await.is_none());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_receiver_stops_renewal() {
        let (tx, rx) = mpsc::channel(8);
        drop(rx);

        tokio::time::timeout(TTL, drive_renewal(LeaseId(3), TTL, PERIOD, tx, script(vec![])))
            .await
            .expect("Driver should stop once nobody listens");
    }
}
