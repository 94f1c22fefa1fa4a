// ── Record subscriptions ──
//
// Front ends hold one of these per record and redraw on change instead of
// polling the reconciler.

use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// Subscription to the observed or target record.
pub struct StateStream<T> {
    current: T,
    receiver: watch::Receiver<T>,
}

impl<T: Clone + Send + Sync + 'static> StateStream<T> {
    pub(crate) fn new(mut receiver: watch::Receiver<T>) -> Self {
        let current = receiver.borrow_and_update().clone();
        Self { current, receiver }
    }

    /// Record as of subscription or the last `changed()`.
    pub fn current(&self) -> &T {
        &self.current
    }

    /// Wait for the record to change. `None` once the reconciler is gone.
    pub async fn changed(&mut self) -> Option<T> {
        self.receiver.changed().await.ok()?;
        self.current = self.receiver.borrow_and_update().clone();
        Some(self.current.clone())
    }

    /// Yields the current record first, then every change.
    pub fn into_stream(self) -> WatchStream<T> {
        WatchStream::new(self.receiver)
    }
}
