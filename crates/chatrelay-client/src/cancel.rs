//! First-class cancellation signal for an in-flight stream.

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

/// Sender half; cheap to clone, safe to fire from any task.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    sender: broadcast::Sender<()>,
}

impl CancelHandle {
    pub fn new() -> (Self, CancelToken) {
        let (sender, receiver) = broadcast::channel(1);
        (Self { sender }, CancelToken { receiver })
    }

    pub fn cancel(&self) {
        let _ = self.sender.send(());
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            receiver: self.sender.subscribe(),
        }
    }
}

/// Receiver half, threaded through the read loop.
#[derive(Debug)]
pub struct CancelToken {
    receiver: broadcast::Receiver<()>,
}

impl CancelToken {
    pub fn is_cancelled(&mut self) -> bool {
        self.receiver.try_recv().is_ok()
    }

    /// Resolves when cancellation fires. If every handle is dropped
    /// without firing, this pends forever: dropping the handle is not a
    /// cancellation.
    pub async fn cancelled(&mut self) {
        loop {
            match self.receiver.recv().await {
                Ok(()) | Err(RecvError::Lagged(_)) => return,
                Err(RecvError::Closed) => std::future::pending::<()>().await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_reaches_every_token() {
        let (handle, mut first) = CancelHandle::new();
        let mut second = handle.token();

        assert!(!first.is_cancelled());
        handle.cancel();
        assert!(first.is_cancelled());
        second.cancelled().await;
    }

    #[tokio::test]
    async fn dropped_handle_is_not_a_cancellation() {
        let (handle, mut token) = CancelHandle::new();
        drop(handle);

        let raced = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            token.cancelled(),
        )
        .await;
        assert!(raced.is_err(), "cancelled() must pend, not resolve");
    }
}
