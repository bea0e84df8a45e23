use std::sync::Arc;

use tokio::sync::watch;

/// Single-writer, multi-reader status object.
///
/// Every update replaces the whole value, so pollers never observe a
/// half-written status. Readers hold a [`StatusReader`] and take snapshots.
#[derive(Debug)]
pub struct StatusCell<T> {
    sender: watch::Sender<Arc<T>>,
}

/// Read-only handle onto a [`StatusCell`].
#[derive(Debug, Clone)]
pub struct StatusReader<T> {
    receiver: watch::Receiver<Arc<T>>,
}

impl<T> StatusCell<T> {
    pub fn new(initial: T) -> Self {
        let (sender, _receiver) = watch::channel(Arc::new(initial));
        Self { sender }
    }

    /// Replaces the published value.
    pub fn publish(&self, value: T) {
        self.sender.send_replace(Arc::new(value));
    }

    pub fn snapshot(&self) -> Arc<T> {
        Arc::clone(&*self.sender.borrow())
    }

    pub fn reader(&self) -> StatusReader<T> {
        StatusReader {
            receiver: self.sender.subscribe(),
        }
    }
}

impl<T> StatusReader<T> {
    pub fn snapshot(&self) -> Arc<T> {
        Arc::clone(&*self.receiver.borrow())
    }

    /// Waits until the writer publishes a new value. Returns `false` once the
    /// writer is gone.
    pub async fn changed(&mut self) -> bool {
        self.receiver.changed().await.is_ok()
    }
}
