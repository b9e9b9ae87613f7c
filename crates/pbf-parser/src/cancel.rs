use std::sync::Arc;

use tokio::sync::watch;

/// A one-way cancellation latch shared between a caller and a parse.
///
/// Cloning is cheap; every clone observes the same latch. Once cancelled
/// a token stays cancelled.
///
/// ```rust
/// use pbf_parser::CancelToken;
///
/// let token = CancelToken::new();
/// let handle = token.clone();
/// assert!(!token.is_cancelled());
/// handle.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Clone, Debug)]
pub struct CancelToken {
    latch: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        let (latch, _) = watch::channel(false);
        Self {
            latch: Arc::new(latch),
        }
    }

    /// Trip the latch. Idempotent.
    pub fn cancel(&self) {
        self.latch.send_replace(true);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.latch.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called on any clone.
    pub async fn cancelled(&self) {
        let mut rx = self.latch.subscribe();
        // The sender lives in `self`, so the wait can only end by the
        // latch being set.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancelled_resolves_after_cancel() {
        let token = CancelToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());
        token.cancel();
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn already_cancelled_resolves_immediately() {
        let token = CancelToken::new();
        token.cancel();
        token.cancel();
        token.cancelled().await;
        assert!(token.clone().is_cancelled());
    }
}
