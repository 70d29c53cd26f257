use bytes::Bytes;
use tokio::sync::RwLock;

/// Content type of every frame the capture pipeline produces.
pub const FRAME_CONTENT_TYPE: &str = "image/jpeg";

/// Single-slot holder for the most recently published frame.
///
/// Exactly one writer (the tick worker) ever calls [`store`](Self::store);
/// HTTP handlers and the broadcast path read concurrently. Readers get a
/// cheap `Bytes` clone of the whole frame, so a snapshot is immutable and
/// can never be observed half-written. Once a frame has been stored the
/// slot never reverts to empty.
#[derive(Debug, Default)]
pub struct LatestFrame {
    slot: RwLock<Option<Bytes>>,
}

impl LatestFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn store(&self, frame: Bytes) {
        *self.slot.write().await = Some(frame);
    }

    /// The current frame, or `None` while nothing has been captured yet.
    pub async fn snapshot(&self) -> Option<Bytes> {
        self.slot.read().await.clone()
    }
}
