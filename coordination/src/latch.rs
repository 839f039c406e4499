//! One-shot broadcast latches for dependency signalling
//!
//! A [`Latch`] is the producing side of a dependency edge; any number of
//! [`LatchWaiter`]s observe it. Opening consumes the latch, so it fires at
//! most once, and the value stays readable forever after. A waiter that
//! subscribes after the latch opened sees the value immediately.
//!
//! Dropping a latch without opening it abandons the edge: every waiter
//! resolves with [`LatchAbandoned`] instead of blocking forever.

use std::sync::Arc;

use tokio::sync::watch;

/// The producer went away without opening the latch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Latch abandoned before it opened")]
pub struct LatchAbandoned;

/// Producing side of a one-shot latch.
#[derive(Debug)]
pub struct Latch<T> {
    tx: watch::Sender<Option<Arc<T>>>,
}

/// Observing side of a one-shot latch. Cheap to clone.
#[derive(Debug)]
pub struct LatchWaiter<T> {
    rx: watch::Receiver<Option<Arc<T>>>,
}

impl<T> Clone for LatchWaiter<T> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

/// Create a closed latch and its first waiter.
pub fn latch<T>() -> (Latch<T>, LatchWaiter<T>) {
    let (tx, rx) = watch::channel(None);
    (Latch { tx }, LatchWaiter { rx })
}

impl<T> Latch<T> {
    /// Open the latch, releasing every current and future waiter.
    pub fn open(self, value: T) {
        // Stored even when no receiver exists yet.
        self.tx.send_replace(Some(Arc::new(value)));
    }

    pub fn subscribe(&self) -> LatchWaiter<T> {
        LatchWaiter {
            rx: self.tx.subscribe(),
        }
    }
}

impl<T> LatchWaiter<T> {
    /// Wait until the latch opens.
    pub async fn wait(&self) -> Result<Arc<T>, LatchAbandoned> {
        let mut rx = self.rx.clone();
        let value = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| LatchAbandoned)?
            .clone();
        value.ok_or(LatchAbandoned)
    }

    pub fn is_open(&self) -> bool {
        self.rx.borrow().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_open_releases_all_waiters() {
        let (latch, waiter) = latch::<u32>();
        let a = waiter.clone();
        let b = waiter.clone();
        let ha = tokio::spawn(async move { a.wait().await });
        let hb = tokio::spawn(async move { b.wait().await });

        tokio::task::yield_now().await;
        latch.open(7);

        assert_eq!(*ha.await.unwrap().unwrap(), 7);
        assert_eq!(*hb.await.unwrap().unwrap(), 7);
        assert!(waiter.is_open());
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_value() {
        let (latch, waiter) = latch::<&'static str>();
        latch.open("ready");

        let late = waiter.clone();
        assert_eq!(*late.wait().await.unwrap(), "ready");
        // Waiting twice is fine; the latch never re-arms.
        assert_eq!(*late.wait().await.unwrap(), "ready");
    }

    #[tokio::test]
    async fn test_abandoned_latch_releases_waiters() {
        let (latch, waiter) = latch::<u32>();
        let pending = {
            let w = waiter.clone();
            tokio::spawn(async move { w.wait().await })
        };
        tokio::task::yield_now().await;
        drop(latch);

        assert_eq!(pending.await.unwrap(), Err(LatchAbandoned));
        assert!(!waiter.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_latch_blocks() {
        let (_latch, waiter) = latch::<u32>();
        let result = tokio::time::timeout(Duration::from_secs(1), waiter.wait()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_subscribe_from_producer() {
        let (latch, _waiter) = latch::<Vec<u8>>();
        let extra = latch.subscribe();
        latch.open(vec![1, 2]);
        assert_eq!(extra.wait().await.unwrap().as_slice(), &[1, 2]);
    }
}
