//! Per-session outbound frame channel
//!
//! Frames go through a bounded queue drained by the connection's writer
//! task, so order is the order of `send` calls. Once the writer is gone the
//! session is being torn down and `send` turns into a no-op.

use crate::protocol::ServerFrame;
use tokio::sync::mpsc;

/// Ordered outbound sink for one session
#[derive(Debug, Clone)]
pub struct Notifier {
    session_id: String,
    tx: mpsc::Sender<ServerFrame>,
}

impl Notifier {
    /// Create a notifier and the receiver the transport drains
    pub fn channel(
        session_id: impl Into<String>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<ServerFrame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                session_id: session_id.into(),
                tx,
            },
            rx,
        )
    }

    /// Queue a frame, waiting only while the queue is full.
    ///
    /// Returns whether the frame was queued.
    pub async fn send(&self, frame: ServerFrame) -> bool {
        let kind = frame.kind();
        match self.tx.send(frame).await {
            Ok(()) => true,
            Err(_) => {
                tracing::debug!(
                    session_id = %self.session_id,
                    frame = kind,
                    "Dropping frame for closed connection"
                );
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_preserves_order() {
        let (notifier, mut rx) = Notifier::channel("s1", 8);
        notifier.send(ServerFrame::StreamStart).await;
        notifier.send(ServerFrame::message("a")).await;
        notifier.send(ServerFrame::StreamEnd).await;

        assert_eq!(rx.recv().await, Some(ServerFrame::StreamStart));
        assert_eq!(rx.recv().await, Some(ServerFrame::message("a")));
        assert_eq!(rx.recv().await, Some(ServerFrame::StreamEnd));
    }

    #[tokio::test]
    async fn test_send_after_disconnect_is_noop() {
        let (notifier, rx) = Notifier::channel("s1", 1);
        drop(rx);
        assert!(notifier.is_closed());
        assert!(!notifier.send(ServerFrame::message("lost")).await);
    }

    #[tokio::test]
    async fn test_bounded_queue_applies_backpressure() {
        let (notifier, mut rx) = Notifier::channel("s1", 1);
        notifier.send(ServerFrame::message("first")).await;

        let sender = notifier.clone();
        let pending = tokio::spawn(async move { sender.send(ServerFrame::message("second")).await });
        tokio::task::yield_now().await;
        assert!(!pending.is_finished());

        assert_eq!(rx.recv().await, Some(ServerFrame::message("first")));
        assert!(pending.await.unwrap());
        assert_eq!(rx.recv().await, Some(ServerFrame::message("second")));
    }
}
