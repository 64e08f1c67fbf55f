use std::future::Future;

use tokio::sync::mpsc;

use crate::error::Error;

/// Consumer-provided companion-device token sink.
///
/// The wallet app mirrors the access token to its wearable integration so
/// the watch can present barcodes offline. The transport (native bridge,
/// BLE, message client) is the consumer's concern.
pub trait TokenMirror: Send + Sync + 'static {
    fn push_access_token(&self, token: &str) -> impl Future<Output = Result<(), Error>> + Send;
}

/// Fire-and-forget queue in front of a [`TokenMirror`].
///
/// Enqueueing never blocks and never fails the enclosing session operation;
/// delivery failures are logged by the drain task and dropped. Dropping the
/// last queue handle ends the drain task after the remaining tokens are
/// attempted.
#[derive(Clone)]
pub struct MirrorQueue {
    tx: mpsc::UnboundedSender<String>,
}

impl MirrorQueue {
    /// Spawn the drain task on the current runtime.
    #[must_use]
    pub fn spawn<M: TokenMirror>(mirror: M) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            while let Some(token) = rx.recv().await {
                if let Err(e) = mirror.push_access_token(&token).await {
                    tracing::warn!(error = %e, "companion token mirror failed");
                }
            }
        });
        Self { tx }
    }

    /// Queue a token for best-effort delivery.
    pub fn enqueue(&self, token: &str) {
        // Send only fails when the drain task is gone; nothing left to do.
        if self.tx.send(token.to_owned()).is_err() {
            tracing::warn!("mirror queue closed, dropping token update");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::Notify;

    use super::*;

    struct CountingMirror {
        delivered: Arc<AtomicUsize>,
        fail: bool,
        notify: Arc<Notify>,
    }

    impl TokenMirror for CountingMirror {
        async fn push_access_token(&self, _token: &str) -> Result<(), Error> {
            self.delivered.fetch_add(1, Ordering::SeqCst);
            self.notify.notify_one();
            if self.fail {
                Err(Error::Token("bridge unavailable".into()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn delivers_enqueued_tokens() {
        let delivered = Arc::new(AtomicUsize::new(0));
        let notify = Arc::new(Notify::new());
        let queue = MirrorQueue::spawn(CountingMirror {
            delivered: delivered.clone(),
            fail: false,
            notify: notify.clone(),
        });

        queue.enqueue("A1");
        notify.notified().await;
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn delivery_failure_does_not_stop_the_queue() {
        let delivered = Arc::new(AtomicUsize::new(0));
        let notify = Arc::new(Notify::new());
        let queue = MirrorQueue::spawn(CountingMirror {
            delivered: delivered.clone(),
            fail: true,
            notify: notify.clone(),
        });

        queue.enqueue("A1");
        notify.notified().await;
        queue.enqueue("A2");
        notify.notified().await;
        assert_eq!(delivered.load(Ordering::SeqCst), 2);
    }
}
