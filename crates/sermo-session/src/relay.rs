use sermo_core::AudioChunk;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// The backpressure boundary between the real-time capture callback and the
/// blocking network writer.
///
/// Single producer, single consumer, FIFO. `push` never blocks the producer;
/// the receiver handed out by [`new`](Self::new) awaits while empty and
/// terminates only after [`close`](Self::close) once every already-pushed
/// chunk has been yielded. Ownership of each chunk transfers at the handoff,
/// so the hot audio path needs no locking beyond the sender guard.
pub struct AudioRelay {
    tx: Mutex<Option<mpsc::UnboundedSender<AudioChunk>>>,
}

impl AudioRelay {
    /// Create a relay and its single consumer end.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AudioChunk>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    /// Enqueue a chunk without blocking. Returns `false` (dropping the
    /// chunk) once the relay is closed for input or the consumer is gone.
    pub fn push(&self, chunk: AudioChunk) -> bool {
        let guard = self.tx.lock().unwrap();
        match guard.as_ref() {
            Some(tx) => tx.send(chunk).is_ok(),
            None => false,
        }
    }

    /// Mark the relay closed for input. Idempotent. Chunks already queued
    /// are not discarded; the consumer drains them before terminating.
    pub fn close(&self) {
        self.tx.lock().unwrap().take();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.lock().unwrap().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(tag: u8) -> AudioChunk {
        AudioChunk {
            bytes: vec![tag; 4],
            sample_rate: 16000,
        }
    }

    #[tokio::test]
    async fn test_push_preserves_fifo_order() {
        let (relay, mut rx) = AudioRelay::new();
        for tag in 0..5u8 {
            assert!(relay.push(chunk(tag)));
        }
        relay.close();
        for tag in 0..5u8 {
            assert_eq!(rx.recv().await.unwrap().bytes[0], tag);
        }
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_close_does_not_discard_queued_chunks() {
        let (relay, mut rx) = AudioRelay::new();
        relay.push(chunk(7));
        relay.push(chunk(8));
        relay.close();
        assert_eq!(rx.recv().await.unwrap().bytes[0], 7);
        assert_eq!(rx.recv().await.unwrap().bytes[0], 8);
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_close_is_idempotent() {
        let (relay, _rx) = AudioRelay::new();
        assert!(!relay.is_closed());
        relay.close();
        relay.close();
        assert!(relay.is_closed());
    }

    #[test]
    fn test_push_after_close_is_rejected() {
        let (relay, mut rx) = AudioRelay::new();
        relay.close();
        assert!(!relay.push(chunk(1)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_push_is_nonblocking_with_stalled_consumer() {
        // The consumer never runs; pushing a burst must still complete
        // promptly since the capture callback can never afford to wait.
        let (relay, _rx) = AudioRelay::new();
        let start = std::time::Instant::now();
        for _ in 0..1000 {
            assert!(relay.push(AudioChunk {
                bytes: vec![0u8; 3200],
                sample_rate: 16000,
            }));
        }
        assert!(start.elapsed() < std::time::Duration::from_secs(1));
    }

    #[test]
    fn test_push_after_consumer_dropped_is_rejected() {
        let (relay, rx) = AudioRelay::new();
        drop(rx);
        assert!(!relay.push(chunk(1)));
    }
}
