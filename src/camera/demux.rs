//! JPEG frame demultiplexer for raw MJPEG byte streams.
//!
//! The capture process writes concatenated JPEG images to its stdout with no
//! framing of its own. This module slices that stream into complete frames on
//! the JPEG start-of-image (0xFFD8) and end-of-image (0xFFD9) markers,
//! holding partial frames across arbitrary chunk boundaries.

use bytes::Bytes;

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Splits an append-only byte stream into complete JPEG frames.
///
/// Stateless across frames apart from the pending remainder, so the frames
/// produced are independent of how the input was chunked.
#[derive(Debug, Default)]
pub struct FrameDemuxer {
    pending: Vec<u8>,
}

impl FrameDemuxer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk of raw stream data and return every complete frame it
    /// unlocked, in stream order.
    ///
    /// Bytes before the first start marker are unsalvageable and discarded;
    /// bytes from a start marker without a matching end marker are retained
    /// until more data arrives.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.pending.extend_from_slice(chunk);

        let mut frames = Vec::new();
        loop {
            let Some(start) = find_marker(&self.pending, SOI) else {
                // Nothing salvageable, but a trailing 0xFF may be the first
                // half of a start marker split across chunks.
                if self.pending.last() == Some(&0xFF) {
                    let keep_from = self.pending.len() - 1;
                    self.pending.drain(..keep_from);
                } else {
                    self.pending.clear();
                }
                break;
            };

            let Some(end) = find_marker(&self.pending[start + 2..], EOI) else {
                // Partial frame: keep from the start marker onward.
                self.pending.drain(..start);
                break;
            };
            let frame_end = start + 2 + end + 2;

            frames.push(Bytes::copy_from_slice(&self.pending[start..frame_end]));
            self.pending.drain(..frame_end);
        }

        frames
    }

    /// Number of buffered bytes awaiting a complete frame
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Find the first occurrence of a two-byte marker
fn find_marker(haystack: &[u8], marker: [u8; 2]) -> Option<usize> {
    haystack
        .windows(2)
        .position(|pair| pair == marker)
}
