// src/case/ring.rs

//! Fixed-capacity byte ring between a byte source and the decoder.

use std::collections::VecDeque;

/// Big enough to hold the largest frame (26-byte header + u16 payload).
pub const DEFAULT_RING_CAPACITY: usize = 128 * 1024;

#[derive(Debug)]
pub struct RingBuffer {
    buf: VecDeque<u8>,
    capacity: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes that can be written before the ring is full.
    pub fn free_len(&self) -> usize {
        self.capacity - self.buf.len()
    }

    /// Append as much of `bytes` as fits; returns the number written.
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.free_len());
        self.buf.extend(&bytes[..n]);
        n
    }

    /// Remove exactly `n` bytes from the front, or nothing if fewer are held.
    pub fn take(&mut self, n: usize) -> Option<Vec<u8>> {
        if n > self.buf.len() {
            return None;
        }
        Some(self.buf.drain(..n).collect())
    }
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_RING_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_stops_at_capacity() {
        let mut ring = RingBuffer::new(4);

        assert_eq!(ring.write(&[1, 2, 3]), 3);
        assert_eq!(ring.write(&[4, 5, 6]), 1);
        assert_eq!(ring.free_len(), 0);
        assert_eq!(ring.take(4), Some(vec![1, 2, 3, 4]));
        assert!(ring.is_empty());
    }

    #[test]
    fn take_is_all_or_nothing() {
        let mut ring = RingBuffer::new(8);
        ring.write(&[9, 8]);

        assert_eq!(ring.take(3), None);
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.take(0), Some(vec![]));
        assert_eq!(ring.take(2), Some(vec![9, 8]));
    }

    #[test]
    fn wraps_around_after_partial_reads() {
        let mut ring = RingBuffer::new(4);
        ring.write(&[1, 2, 3, 4]);
        assert_eq!(ring.take(3), Some(vec![1, 2, 3]));

        assert_eq!(ring.write(&[5, 6, 7]), 3);
        assert_eq!(ring.take(4), Some(vec![4, 5, 6, 7]));
    }
}
