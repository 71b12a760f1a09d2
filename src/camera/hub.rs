//! Broadcast hub fanning demultiplexed frames out to stream viewers.
//!
//! Each subscriber is an unbounded channel whose receiving half feeds one
//! HTTP response body. Frames are written with fixed
//! `multipart/x-mixed-replace` part framing; a subscriber whose channel has
//! closed is pruned without affecting delivery to the rest.

use bytes::Bytes;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error};

/// Boundary separating MJPEG parts, fixed for the lifetime of the process.
/// Must not occur inside JPEG data.
const MJPEG_BOUNDARY: &str = "picontrolframe";

#[derive(Debug, Default)]
pub struct BroadcastHub {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Bytes>>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// The Content-Type header value for a stream response fed by this hub
    pub fn content_type() -> String {
        format!("multipart/x-mixed-replace; boundary={MJPEG_BOUNDARY}")
    }

    fn lock_subscribers(&self) -> std::sync::MutexGuard<'_, Vec<mpsc::UnboundedSender<Bytes>>> {
        self.subscribers.lock().unwrap_or_else(|e| {
            error!("Broadcast hub mutex poisoned: {e}");
            e.into_inner()
        })
    }

    /// Register a new viewer. Safe to call whether or not a capture process
    /// is running; no frames arrive until one exists.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Bytes> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscribers = self.lock_subscribers();
        subscribers.push(tx);
        debug!("Stream subscriber added, {} connected", subscribers.len());
        rx
    }

    /// Send one frame to every live subscriber as a complete multipart part.
    /// Subscribers whose connection has gone away are removed. Returns the
    /// number of subscribers that received the frame.
    pub fn broadcast(&self, frame: &[u8]) -> usize {
        let part = encode_part(frame);
        let mut subscribers = self.lock_subscribers();
        subscribers.retain(|tx| tx.send(part.clone()).is_ok());
        subscribers.len()
    }

    /// Drop every subscriber channel, ending all viewer responses
    pub fn close_all(&self) {
        let mut subscribers = self.lock_subscribers();
        if !subscribers.is_empty() {
            debug!("Closing {} stream subscribers", subscribers.len());
        }
        subscribers.clear();
    }

    /// Number of subscribers with a live connection. Purely a count;
    /// closed channels are pruned by `broadcast`, not here.
    pub fn subscriber_count(&self) -> usize {
        self.lock_subscribers()
            .iter()
            .filter(|tx| !tx.is_closed())
            .count()
    }
}

/// Frame bytes wrapped in boundary + JPEG headers + trailing separator
fn encode_part(frame: &[u8]) -> Bytes {
    let header = format!(
        "--{MJPEG_BOUNDARY}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        frame.len()
    );

    let mut part = Vec::with_capacity(header.len() + frame.len() + 2);
    part.extend_from_slice(header.as_bytes());
    part.extend_from_slice(frame);
    part.extend_from_slice(b"\r\n");
    Bytes::from(part)
}
