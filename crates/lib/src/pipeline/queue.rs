//! Multi-consumer side of a tokio mpsc queue.

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Receiver shared by every task of a pool. Each item goes to exactly one caller of `recv`.
pub struct SharedReceiver<T> {
    inner: Arc<Mutex<mpsc::Receiver<T>>>,
}

impl<T> Clone for SharedReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> SharedReceiver<T> {
    pub fn new(rx: mpsc::Receiver<T>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(rx)),
        }
    }

    /// Next item, waiting while the queue is empty and open.
    /// None once every sender is gone and the queue is drained.
    pub async fn recv(&self) -> Option<T> {
        let mut rx = self.inner.lock().await;
        rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drains_after_close() {
        let (tx, rx) = mpsc::channel(4);
        let shared = SharedReceiver::new(rx);
        tx.send(1).await.expect("send");
        tx.send(2).await.expect("send");
        drop(tx);
        let other = shared.clone();
        assert_eq!(shared.recv().await, Some(1));
        assert_eq!(other.recv().await, Some(2));
        assert_eq!(shared.recv().await, None);
        assert_eq!(other.recv().await, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn each_item_delivered_once() {
        let (tx, rx) = mpsc::channel(8);
        let shared = SharedReceiver::new(rx);
        let mut handles = Vec::new();
        for _ in 0..4 {
            let rx = shared.clone();
            handles.push(tokio::spawn(async move {
                let mut got = Vec::new();
                while let Some(n) = rx.recv().await {
                    got.push(n);
                }
                got
            }));
        }
        for n in 0..100 {
            tx.send(n).await.expect("send");
        }
        drop(tx);
        let mut all = Vec::new();
        for h in handles {
            all.extend(h.await.expect("join"));
        }
        all.sort_unstable();
        assert_eq!(all, (0..100).collect::<Vec<_>>());
    }
}
