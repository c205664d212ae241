//! Broadcast fan-out of obstacle batches.
//!
//! Backed by a [`tokio::sync::broadcast`] channel so every subscriber sees
//! every batch and a slow subscriber never stalls the backend.  A subscriber
//! that falls more than the channel capacity behind loses the oldest batches
//! and is told how many it missed.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use depthsense_types::{ObstacleBatch, ObstacleZone, SensingMode};
use tokio::sync::broadcast;
use tracing::warn;

/// Batches buffered per subscriber before the oldest are dropped.
pub const DEFAULT_CAPACITY: usize = 64;

/// Shared obstacle stream.  Clones share the channel and sequence counter.
#[derive(Clone, Debug)]
pub struct ObstacleStream {
    sender: broadcast::Sender<ObstacleBatch>,
    sequence: Arc<AtomicU64>,
}

impl ObstacleStream {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Stamp `zones` with the next sequence number and broadcast them.
    ///
    /// Returns the batch's sequence number.  Having no subscribers is normal.
    pub fn publish(&self, mode: SensingMode, zones: Vec<ObstacleZone>) -> u64 {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        // Err only means nobody is listening.
        let _ = self.sender.send(ObstacleBatch {
            sequence,
            mode,
            timestamp: Utc::now(),
            zones,
        });
        sequence
    }

    pub fn subscribe(&self) -> ObstacleReceiver {
        ObstacleReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ObstacleStream {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// One subscription to an [`ObstacleStream`].
pub struct ObstacleReceiver {
    receiver: broadcast::Receiver<ObstacleBatch>,
}

impl ObstacleReceiver {
    /// Wait for the next batch.
    ///
    /// * `Err(RecvError::Lagged(n))` – `n` batches were dropped.
    /// * `Err(RecvError::Closed)` – every stream handle is gone.
    pub async fn recv(&mut self) -> Result<ObstacleBatch, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Wait for the next batch, skipping over lag.  `None` once the stream
    /// has closed.
    pub async fn next_batch(&mut self) -> Option<ObstacleBatch> {
        loop {
            match self.receiver.recv().await {
                Ok(batch) => return Some(batch),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "obstacle subscriber lagged; oldest batches dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depthsense_types::ZoneKind;

    fn zone(id: &str) -> ObstacleZone {
        ObstacleZone::new(id, ZoneKind::Object, 0.1, 0.1, 0.2, 0.2).unwrap()
    }

    #[tokio::test]
    async fn every_subscriber_receives_every_batch() {
        let stream = ObstacleStream::default();
        let mut a = stream.subscribe();
        let mut b = stream.subscribe();

        assert_eq!(stream.publish(SensingMode::Hands, vec![zone("z")]), 0);
        assert_eq!(stream.publish(SensingMode::Hands, Vec::new()), 1);

        for rx in [&mut a, &mut b] {
            let first = rx.recv().await.unwrap();
            assert_eq!(first.sequence, 0);
            assert_eq!(first.zones.len(), 1);
            assert_eq!(rx.recv().await.unwrap().sequence, 1);
        }
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_fine() {
        let stream = ObstacleStream::new(4);
        assert_eq!(stream.subscriber_count(), 0);
        stream.publish(SensingMode::None, Vec::new());
        let mut rx = stream.subscribe();
        stream.publish(SensingMode::Monocular, Vec::new());
        assert_eq!(rx.recv().await.unwrap().sequence, 1);
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_ahead() {
        let stream = ObstacleStream::new(2);
        let mut rx = stream.subscribe();
        for _ in 0..5 {
            stream.publish(SensingMode::Hands, Vec::new());
        }
        let batch = rx.next_batch().await.unwrap();
        assert_eq!(batch.sequence, 3);
    }

    #[tokio::test]
    async fn batches_serialize_with_wire_field_names() {
        let stream = ObstacleStream::default();
        let mut rx = stream.subscribe();
        stream.publish(SensingMode::MultiModel, vec![zone("object-0")]);
        let json = serde_json::to_value(rx.recv().await.unwrap()).unwrap();
        assert_eq!(json["mode"], "multi-model");
        assert_eq!(json["zones"][0]["type"], "object");
    }
}
