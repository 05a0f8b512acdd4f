//! Fixed-capacity FIFO buffer with cursor-based reads.
//!
//! Insertion is tail-append; when full, the oldest element is dropped per
//! insert. Cursor tokens encode a monotonic sequence number plus the
//! oldest-seen timestamp; when eviction overtakes a cursor the read
//! restarts at the head and says so instead of silently skipping.

use std::collections::VecDeque;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};

/// One buffered element with its position metadata.
#[derive(Debug, Clone)]
struct Slot<T> {
    seq: u64,
    inserted_at: DateTime<Utc>,
    item: T,
}

/// Result of a cursor-based read.
#[derive(Debug, Clone)]
pub struct ReadPage<T> {
    /// Items newer than the cursor, in insertion order.
    pub items: Vec<T>,
    /// Token to resume from after the last returned item.
    pub next_cursor: String,
    /// True when eviction forced the read to restart at the head.
    pub restarted: bool,
    /// Human-readable explanation when `restarted` is set.
    pub warning: Option<String>,
}

/// Fixed-capacity FIFO with snapshot-copy reads.
#[derive(Debug)]
pub struct BoundedBuffer<T> {
    slots: VecDeque<Slot<T>>,
    capacity: usize,
    next_seq: u64,
}

impl<T: Clone> BoundedBuffer<T> {
    /// Create a buffer holding at most `capacity` elements.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
            next_seq: 0,
        }
    }

    /// Number of buffered elements.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total elements ever appended, including evicted ones.
    pub fn total_appended(&self) -> u64 {
        self.next_seq
    }

    /// Append one element, evicting from the head when full.
    pub fn push(&mut self, item: T) {
        if self.slots.len() == self.capacity {
            self.slots.pop_front();
        }
        self.slots.push_back(Slot {
            seq: self.next_seq,
            inserted_at: Utc::now(),
            item,
        });
        self.next_seq += 1;
    }

    /// Batch-append, evicting as needed to keep `len <= capacity`.
    pub fn append(&mut self, items: impl IntoIterator<Item = T>) {
        for item in items {
            self.push(item);
        }
    }

    /// Independent copy of the current contents in insertion order.
    pub fn snapshot(&self) -> Vec<T> {
        self.slots.iter().map(|s| s.item.clone()).collect()
    }

    /// Remove everything; sequence numbers keep advancing.
    pub fn clear(&mut self) -> usize {
        let n = self.slots.len();
        self.slots.clear();
        n
    }

    /// Sequence number of the oldest retained element.
    fn oldest_seq(&self) -> Option<u64> {
        self.slots.front().map(|s| s.seq)
    }

    /// Read up to `limit` items at or after the cursor position.
    ///
    /// An empty or unparseable cursor reads from the head. When eviction
    /// has overtaken the cursor the read restarts at the oldest retained
    /// element with `restarted = true` and a warning naming the gap.
    pub fn read_since(&self, cursor: &str, limit: usize) -> ReadPage<T> {
        let parsed = Cursor::decode(cursor);
        let mut restarted = false;
        let mut warning = None;

        let start = match parsed {
            Some(c) => {
                match self.oldest_seq() {
                    // Cursor below the ring: data it pointed at is gone.
                    Some(oldest) if c.seq < oldest => {
                        restarted = true;
                        warning = Some(format!(
                            "cursor expired: {} entries were evicted since the last read; restarting from the oldest retained entry",
                            oldest - c.seq
                        ));
                        0
                    }
                    _ => c.seq,
                }
            }
            None => 0,
        };

        let limit = limit.max(1);
        let mut items = Vec::new();
        let mut last = None;
        for slot in &self.slots {
            if slot.seq < start {
                continue;
            }
            if items.len() == limit {
                break;
            }
            items.push(slot.item.clone());
            last = Some((slot.seq, slot.inserted_at));
        }

        let next_cursor = match last {
            Some((seq, ts)) => Cursor {
                seq: seq + 1,
                oldest_ts: ts,
            }
            .encode(),
            // Nothing new: the cursor stays at the write position.
            None => {
                let ts = self
                    .slots
                    .back()
                    .map(|s| s.inserted_at)
                    .unwrap_or_else(Utc::now);
                Cursor {
                    seq: self.next_seq.max(start),
                    oldest_ts: ts,
                }
                .encode()
            }
        };

        ReadPage {
            items,
            next_cursor,
            restarted,
            warning,
        }
    }
}

/// Decoded form of an opaque cursor token. `seq` is the next sequence
/// number to read; `oldest_ts` is the oldest insertion time seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cursor {
    seq: u64,
    oldest_ts: DateTime<Utc>,
}

impl Cursor {
    fn encode(&self) -> String {
        let raw = format!("{}:{}", self.seq, self.oldest_ts.timestamp_millis());
        URL_SAFE_NO_PAD.encode(raw.as_bytes())
    }

    /// Lenient decode: any malformed token means "from the head".
    fn decode(token: &str) -> Option<Self> {
        if token.is_empty() {
            return None;
        }
        let raw = URL_SAFE_NO_PAD.decode(token.as_bytes()).ok()?;
        let raw = String::from_utf8(raw).ok()?;
        let (seq, ts) = raw.split_once(':')?;
        let seq: u64 = seq.parse().ok()?;
        let millis: i64 = ts.parse().ok()?;
        let oldest_ts = DateTime::<Utc>::from_timestamp_millis(millis)?;
        Some(Self { seq, oldest_ts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_eviction_keeps_last_k() {
        let mut buf = BoundedBuffer::new(3);
        buf.append(1..=5);
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.snapshot(), vec![3, 4, 5]);
    }

    #[test]
    fn test_len_never_exceeds_capacity() {
        let mut buf = BoundedBuffer::new(10);
        for batch in 0..20 {
            buf.append((0..7).map(|i| batch * 7 + i));
            assert!(buf.len() <= 10);
        }
        assert_eq!(buf.total_appended(), 140);
    }

    #[test]
    fn test_snapshot_is_independent_copy() {
        let mut buf = BoundedBuffer::new(4);
        buf.append(["a".to_string(), "b".to_string()]);
        let snap = buf.snapshot();
        buf.push("c".to_string());
        assert_eq!(snap, vec!["a", "b"]);
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn test_read_since_empty_cursor_reads_head() {
        let mut buf = BoundedBuffer::new(5);
        buf.append(1..=3);
        let page = buf.read_since("", 10);
        assert_eq!(page.items, vec![1, 2, 3]);
        assert!(!page.restarted);
    }

    #[test]
    fn test_read_since_resumes_after_cursor() {
        let mut buf = BoundedBuffer::new(10);
        buf.append(1..=3);
        let first = buf.read_since("", 2);
        assert_eq!(first.items, vec![1, 2]);

        buf.append(4..=5);
        let second = buf.read_since(&first.next_cursor, 10);
        assert_eq!(second.items, vec![3, 4, 5]);
        assert!(!second.restarted);
    }

    #[test]
    fn test_cursor_restart_after_eviction() {
        let mut buf = BoundedBuffer::new(4);
        buf.append(1..=4);
        let page = buf.read_since("", 2);

        // Push enough that the cursor's position falls off the ring.
        buf.append(5..=12);
        let next = buf.read_since(&page.next_cursor, 100);
        assert!(next.restarted);
        assert!(next.warning.is_some());
        assert_eq!(next.items, vec![9, 10, 11, 12]);
    }

    #[test]
    fn test_cursor_on_empty_buffer_sees_later_appends() {
        let mut buf = BoundedBuffer::new(4);
        let page = buf.read_since("", 10);
        assert!(page.items.is_empty());

        buf.append(1..=2);
        let next = buf.read_since(&page.next_cursor, 10);
        assert_eq!(next.items, vec![1, 2]);
        assert!(!next.restarted);
    }

    #[test]
    fn test_invalid_cursor_treated_as_head() {
        let mut buf = BoundedBuffer::new(5);
        buf.append(1..=2);
        let page = buf.read_since("not-a-cursor!!", 10);
        assert_eq!(page.items, vec![1, 2]);
        assert!(!page.restarted);
    }

    #[test]
    fn test_clear_returns_count() {
        let mut buf = BoundedBuffer::new(5);
        buf.append(1..=4);
        assert_eq!(buf.clear(), 4);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_cursor_roundtrip() {
        let cursor = Cursor {
            seq: 1234,
            oldest_ts: Utc::now(),
        };
        let token = cursor.encode();
        let decoded = Cursor::decode(&token).unwrap();
        assert_eq!(decoded.seq, 1234);
    }
}
