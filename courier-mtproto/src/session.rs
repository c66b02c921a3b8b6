//! Per-connection session state: message identifiers and sequence numbers.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::message::MsgId;

/// Generates monotonic, time-correlated message identifiers.
///
/// Identifiers are `((secs + time_offset) << 32) | (nanos << 2)` — the two
/// least significant bits are zero, so every identifier is divisible by 4.
/// When the clock has not advanced enough, the generator bumps to
/// `last + 4` instead of waiting.
///
/// Not safe to reuse across connections; build a fresh one on reconnect.
#[derive(Debug, Default)]
pub struct MsgIdGenerator {
    last_msg_id: i64,
    time_offset: i32,
}

impl MsgIdGenerator {
    /// Fresh generator with no clock correction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a server-clock correction (from the external bad-msg path).
    pub fn set_time_offset(&mut self, offset: i32) {
        self.time_offset = offset;
    }

    /// Produce the next identifier.
    pub fn next(&mut self) -> MsgId {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let secs = (now.as_secs() as i32).wrapping_add(self.time_offset) as u32 as u64;
        let nanos = now.subsec_nanos() as u64;
        let mut id = ((secs << 32) | (nanos << 2)) as i64;
        if self.last_msg_id >= id {
            id = self.last_msg_id + 4;
        }
        self.last_msg_id = id;
        MsgId(id)
    }
}

/// Assigns protocol sequence numbers with the content-relatedness parity rule.
///
/// Content-related messages get `2 * counter + 1` (odd) and advance the
/// counter; unrelated ones get `2 * counter` (even) and do not.
#[derive(Debug, Default)]
pub struct SeqAllocator {
    counter: i32,
}

impl SeqAllocator {
    /// Fresh allocator starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next sequence number.
    pub fn assign(&mut self, content_related: bool) -> i32 {
        if content_related {
            let n = self.counter * 2 + 1;
            self.counter += 1;
            n
        } else {
            self.counter * 2
        }
    }
}

/// Per-connection numbering state: a random session id plus the identifier
/// and sequence generators. Cheap to build; rebuilt on reconnect.
pub struct Session {
    /// Random 64-bit session identifier, fixed for the connection's lifetime.
    pub session_id: i64,
    ids: MsgIdGenerator,
    seqs: SeqAllocator,
}

impl Session {
    /// Create a fresh session with a random id.
    pub fn new() -> Self {
        let mut rnd = [0u8; 8];
        getrandom::getrandom(&mut rnd).expect("getrandom");
        Self {
            session_id: i64::from_le_bytes(rnd),
            ids: MsgIdGenerator::new(),
            seqs: SeqAllocator::new(),
        }
    }

    /// Allocate the next message identifier.
    pub fn next_msg_id(&mut self) -> MsgId {
        self.ids.next()
    }

    /// Allocate the next sequence number.
    pub fn next_seq_no(&mut self, content_related: bool) -> i32 {
        self.seqs.assign(content_related)
    }

    /// Apply a server-clock correction to the identifier generator.
    pub fn set_time_offset(&mut self, offset: i32) {
        self.ids.set_time_offset(offset);
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msg_ids_strictly_increase_and_divide_by_4() {
        let mut generator = MsgIdGenerator::new();
        let mut last = 0i64;
        for _ in 0..10_000 {
            let MsgId(id) = generator.next();
            assert!(id > last, "id {id} not greater than {last}");
            assert_eq!(id % 4, 0, "id {id} not divisible by 4");
            last = id;
        }
    }

    #[test]
    fn msg_id_tracks_wall_clock() {
        let mut generator = MsgIdGenerator::new();
        let MsgId(id) = generator.next();
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        let secs = id >> 32;
        assert!((secs - now).abs() <= 1, "id seconds {secs} far from clock {now}");
    }

    #[test]
    fn seq_parity() {
        let mut seqs = SeqAllocator::new();
        assert_eq!(seqs.assign(true), 1);
        assert_eq!(seqs.assign(false), 2);
        assert_eq!(seqs.assign(false), 2);
        assert_eq!(seqs.assign(true), 3);
        assert_eq!(seqs.assign(false), 4);
        assert_eq!(seqs.assign(true), 5);
    }
}
