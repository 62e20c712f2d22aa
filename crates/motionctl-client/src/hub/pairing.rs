//! Positional pairing of notification-channel frames.
//!
//! The event channel carries `[topic, payload, topic, payload, …]` with no
//! marker tying the halves together. Frame `2k` is a topic and frame `2k + 1`
//! its payload, purely by arrival order. A lost or reordered frame shifts
//! every later pair; the transport must deliver frames in order and without
//! loss.

use std::borrow::Cow;

use bytes::Bytes;

/// One topic/payload pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    /// Topic frame as received.
    pub topic: Bytes,
    /// Payload frame, still encoded.
    pub payload: Bytes,
}

impl Notification {
    /// Topic as text, lossily decoded for logging.
    pub fn topic_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.topic)
    }

    /// Whether this notification was published under `topic`.
    pub fn is_topic(&self, topic: &str) -> bool {
        self.topic.as_ref() == topic.as_bytes()
    }
}

/// Groups a frame sequence into [`Notification`]s by arrival parity.
#[derive(Debug, Default)]
pub struct FramePairing {
    pending_topic: Option<Bytes>,
}

impl FramePairing {
    /// Start at an even (topic) position.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next frame. Returns a notification on every second frame.
    pub fn push(&mut self, frame: Bytes) -> Option<Notification> {
        match self.pending_topic.take() {
            None => {
                self.pending_topic = Some(frame);
                None
            }
            Some(topic) => Some(Notification {
                topic,
                payload: frame,
            }),
        }
    }

    /// Forget a half-received pair, e.g. when a new event stream starts.
    pub fn reset(&mut self) {
        self.pending_topic = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_by_parity() {
        let mut p = FramePairing::new();
        assert!(p.push(Bytes::from_static(b"status")).is_none());
        let n = p.push(Bytes::from_static(b"{}")).unwrap();
        assert!(n.is_topic("status"));
        assert_eq!(n.payload, Bytes::from_static(b"{}"));
        assert!(p.push(Bytes::from_static(b"other")).is_none());
    }

    #[test]
    fn pairing_is_not_content_checked() {
        // Frames out of step are paired anyway: payload becomes "topic".
        let mut p = FramePairing::new();
        let _ = p.push(Bytes::from_static(b"{\"values\":[]}"));
        let n = p.push(Bytes::from_static(b"status")).unwrap();
        assert_eq!(n.topic_str(), "{\"values\":[]}");
        assert!(!n.is_topic("status"));
    }

    #[test]
    fn reset_drops_half_pair() {
        let mut p = FramePairing::new();
        let _ = p.push(Bytes::from_static(b"stale"));
        p.reset();
        assert!(p.push(Bytes::from_static(b"status")).is_none());
        let n = p.push(Bytes::from_static(b"x")).unwrap();
        assert!(n.is_topic("status"));
    }
}
