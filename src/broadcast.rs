use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use tokio::sync::broadcast;
use tracing::debug;

use crate::frame::FRAME_CONTENT_TYPE;

/// Fan-out of freshly published frames to connected viewers.
///
/// Payloads are self-describing data URLs, ready to assign straight to an
/// `<img>` src. Delivery is fire-and-forget: nobody is waited on, nothing is
/// retried, and the channel keeps only the newest frame — a viewer that
/// falls behind sees `Lagged` and then the live frame, so broadcast can
/// never trail the latest state.
#[derive(Clone)]
pub struct FramePublisher {
    tx: broadcast::Sender<String>,
}

impl FramePublisher {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn publish(&self, frame: &Bytes) {
        let payload = encode_data_url(frame);
        // send() errors only when no subscriber exists; an unwatched camera
        // is not a failure.
        match self.tx.send(payload) {
            Ok(subscribers) => debug!(subscribers, bytes = frame.len(), "frame broadcast"),
            Err(_) => debug!("no subscribers connected, frame dropped"),
        }
    }
}

impl Default for FramePublisher {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_data_url(frame: &[u8]) -> String {
    format!("data:{FRAME_CONTENT_TYPE};base64,{}", BASE64.encode(frame))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::RecvError;

    #[tokio::test]
    async fn subscriber_receives_data_url_payload() {
        let publisher = FramePublisher::new();
        let mut rx = publisher.subscribe();

        publisher.publish(&Bytes::from_static(b"\xFF\xD8\xFF\xE0"));

        let payload = rx.recv().await.unwrap();
        let encoded = payload
            .strip_prefix("data:image/jpeg;base64,")
            .expect("payload should be a jpeg data URL");
        assert_eq!(BASE64.decode(encoded).unwrap(), b"\xFF\xD8\xFF\xE0");
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_panic() {
        let publisher = FramePublisher::new();
        publisher.publish(&Bytes::from_static(b"frame"));
    }

    #[tokio::test]
    async fn slow_subscriber_skips_to_newest_frame() {
        let publisher = FramePublisher::new();
        let mut rx = publisher.subscribe();

        publisher.publish(&Bytes::from_static(b"old"));
        publisher.publish(&Bytes::from_static(b"new"));

        // Capacity is one: the first frame is gone, only the newest remains.
        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(1))));
        let payload = rx.recv().await.unwrap();
        let encoded = payload.strip_prefix("data:image/jpeg;base64,").unwrap();
        assert_eq!(BASE64.decode(encoded).unwrap(), b"new");
    }
}
