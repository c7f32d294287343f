//! Bounded tail buffer for captured process output.

use std::collections::VecDeque;

/// Keeps at most `capacity` of the most recent bytes written to it.
///
/// Older bytes are discarded first, so memory stays bounded no matter how
/// much the child prints.
///
/// # Example
///
/// ```
/// use rooda::process::TailBuffer;
///
/// let mut buf = TailBuffer::new(4);
/// buf.push(b"abcdef");
/// assert_eq!(buf.to_vec(), b"cdef");
/// assert!(buf.truncated());
/// ```
#[derive(Debug, Clone)]
pub struct TailBuffer {
    bytes: VecDeque<u8>,
    capacity: usize,
    dropped: u64,
}

impl TailBuffer {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: VecDeque::with_capacity(capacity.min(64 * 1024)),
            capacity,
            dropped: 0,
        }
    }

    /// Append a chunk, evicting the oldest bytes past capacity.
    pub fn push(&mut self, chunk: &[u8]) {
        if chunk.len() >= self.capacity {
            self.dropped += (self.bytes.len() + chunk.len() - self.capacity) as u64;
            self.bytes.clear();
            self.bytes.extend(&chunk[chunk.len() - self.capacity..]);
            return;
        }

        let overflow = (self.bytes.len() + chunk.len()).saturating_sub(self.capacity);
        if overflow > 0 {
            self.bytes.drain(..overflow);
            self.dropped += overflow as u64;
        }
        self.bytes.extend(chunk);
    }

    /// Whether any bytes have been discarded.
    #[must_use]
    pub fn truncated(&self) -> bool {
        self.dropped > 0
    }

    /// Number of bytes discarded so far.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Copy the retained bytes out in order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        let (a, b) = self.bytes.as_slices();
        let mut out = Vec::with_capacity(a.len() + b.len());
        out.extend_from_slice(a);
        out.extend_from_slice(b);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_under_capacity_keeps_everything() {
        let mut buf = TailBuffer::new(16);
        buf.push(b"hello ");
        buf.push(b"world");
        assert_eq!(buf.to_vec(), b"hello world");
        assert!(!buf.truncated());
        assert_eq!(buf.len(), 11);
    }

    #[test]
    fn test_exact_capacity_is_not_truncated() {
        let mut buf = TailBuffer::new(5);
        buf.push(b"ab");
        buf.push(b"cde");
        assert_eq!(buf.to_vec(), b"abcde");
        assert!(!buf.truncated());
    }

    #[test]
    fn test_drops_oldest_across_chunks() {
        let mut buf = TailBuffer::new(5);
        buf.push(b"abc");
        buf.push(b"defg");
        assert_eq!(buf.to_vec(), b"cdefg");
        assert_eq!(buf.dropped(), 2);
    }

    #[test]
    fn test_oversized_chunk_keeps_its_tail() {
        let mut buf = TailBuffer::new(3);
        buf.push(b"xy");
        buf.push(b"0123456789");
        assert_eq!(buf.to_vec(), b"789");
        assert_eq!(buf.dropped(), 9);
    }

    #[test]
    fn test_many_small_writes_equal_trailing_bytes() {
        let full: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let mut buf = TailBuffer::new(1024);
        for chunk in full.chunks(37) {
            buf.push(chunk);
        }
        assert_eq!(buf.len(), 1024);
        assert_eq!(buf.to_vec(), &full[full.len() - 1024..]);
        assert_eq!(buf.dropped(), (full.len() - 1024) as u64);
    }

    #[test]
    fn test_empty_push_is_noop() {
        let mut buf = TailBuffer::new(4);
        buf.push(b"");
        assert!(buf.is_empty());
        assert!(!buf.truncated());
    }
}
