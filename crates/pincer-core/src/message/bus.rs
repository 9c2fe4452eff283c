//! Message bus with one inbound and one outbound queue.
//!
//! Chat adapters and background tasks publish inbound messages; the agent
//! loop consumes them one at a time and publishes replies outbound, where
//! the channel dispatcher picks them up.

use pincer_types::bus::{InboundMessage, OutboundMessage};
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Buffer size for each direction.
const QUEUE_BUFFER: usize = 256;

/// Errors that can occur during message bus operations.
#[derive(Debug, Error)]
pub enum BusError {
    /// The receiving side has been dropped.
    #[error("message bus closed")]
    Closed,
}

/// Central message bus for channel-to-agent communication.
pub struct MessageBus {
    inbound_tx: mpsc::Sender<InboundMessage>,
    inbound_rx: Mutex<mpsc::Receiver<InboundMessage>>,
    outbound_tx: mpsc::Sender<OutboundMessage>,
    outbound_rx: Mutex<mpsc::Receiver<OutboundMessage>>,
}

impl MessageBus {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(QUEUE_BUFFER);
        let (outbound_tx, outbound_rx) = mpsc::channel(QUEUE_BUFFER);
        Self {
            inbound_tx,
            inbound_rx: Mutex::new(inbound_rx),
            outbound_tx,
            outbound_rx: Mutex::new(outbound_rx),
        }
    }

    pub async fn publish_inbound(&self, msg: InboundMessage) -> Result<(), BusError> {
        debug!(channel = %msg.channel, chat_id = %msg.chat_id, "inbound message published");
        self.inbound_tx.send(msg).await.map_err(|_| BusError::Closed)
    }

    /// Wait for the next inbound message. Returns `None` once `cancel` fires.
    pub async fn consume_inbound(&self, cancel: &CancellationToken) -> Option<InboundMessage> {
        let mut rx = self.inbound_rx.lock().await;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            msg = rx.recv() => msg,
        }
    }

    pub async fn publish_outbound(&self, msg: OutboundMessage) -> Result<(), BusError> {
        debug!(channel = %msg.channel, chat_id = %msg.chat_id, "outbound message published");
        self.outbound_tx.send(msg).await.map_err(|_| BusError::Closed)
    }

    /// Wait for the next outbound message. Returns `None` once `cancel` fires.
    pub async fn consume_outbound(&self, cancel: &CancellationToken) -> Option<OutboundMessage> {
        let mut rx = self.outbound_rx.lock().await;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            msg = rx.recv() => msg,
        }
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("inbound_capacity", &self.inbound_tx.capacity())
            .field("outbound_capacity", &self.outbound_tx.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_inbound_fifo() {
        let bus = MessageBus::new();
        let cancel = CancellationToken::new();
        bus.publish_inbound(InboundMessage::new("cli", "u", "c", "first"))
            .await
            .unwrap();
        bus.publish_inbound(InboundMessage::new("cli", "u", "c", "second"))
            .await
            .unwrap();

        assert_eq!(bus.consume_inbound(&cancel).await.unwrap().content, "first");
        assert_eq!(bus.consume_inbound(&cancel).await.unwrap().content, "second");
    }

    #[tokio::test]
    async fn test_outbound_round_trip() {
        let bus = MessageBus::new();
        bus.publish_outbound(OutboundMessage::new("telegram", "42", "hi"))
            .await
            .unwrap();
        let out = bus.consume_outbound(&CancellationToken::new()).await.unwrap();
        assert_eq!(out.chat_id, "42");
    }

    #[tokio::test(start_paused = true)]
    async fn test_consume_returns_none_on_cancel() {
        let bus = MessageBus::new();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });
        assert!(bus.consume_inbound(&cancel).await.is_none());
    }
}
