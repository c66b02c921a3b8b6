//! The per-connection outgoing queue.
//!
//! Holds not-yet-sent messages in insertion order, the sent-awaiting-response
//! table, the inbound-ack backlog, and per-chain ordering state. Producers
//! append concurrently (under the caller's lock); exactly one consumer — the
//! connection writer — drains.

use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::message::{MsgId, OutboundMessage, PendingKey, QueuedMessage, SentMessage};

/// Bounds on the queue's auxiliary state.
#[derive(Clone, Copy, Debug)]
pub struct QueueLimits {
    /// Maximum identifiers remembered per chain; oldest evicted beyond this.
    pub chain_cap: usize,
    /// Maximum inbound identifiers awaiting a `msgs_ack`; oldest dropped.
    pub ack_backlog: usize,
}

impl Default for QueueLimits {
    fn default() -> Self {
        Self { chain_cap: 200, ack_backlog: 8192 }
    }
}

/// Outgoing queue state for one connection.
#[derive(Debug, Default)]
pub struct OutgoingQueue {
    pub(crate) pending: BTreeMap<PendingKey, QueuedMessage>,
    next_key: u64,
    sent: HashMap<MsgId, SentMessage>,
    ack_queue: VecDeque<MsgId>,
    call_queues: HashMap<String, VecDeque<MsgId>>,
    limits: QueueLimits,
}

impl OutgoingQueue {
    /// Queue with default limits.
    pub fn new() -> Self {
        Self::with_limits(QueueLimits::default())
    }

    /// Queue with explicit limits.
    pub fn with_limits(limits: QueueLimits) -> Self {
        Self { limits, ..Self::default() }
    }

    /// Append a message; returns its stable pending slot.
    pub fn push(&mut self, msg: OutboundMessage) -> PendingKey {
        self.insert(QueuedMessage::new(msg))
    }

    pub(crate) fn insert(&mut self, msg: QueuedMessage) -> PendingKey {
        let key = PendingKey(self.next_key);
        self.next_key += 1;
        self.pending.insert(key, msg);
        key
    }

    /// Whether anything is waiting to be sent.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Number of pending messages.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Number of messages sent and awaiting a response.
    pub fn sent_len(&self) -> usize {
        self.sent.len()
    }

    // ─── Acks ────────────────────────────────────────────────────────────

    /// Register inbound identifiers to acknowledge with the next frame.
    pub fn register_acks(&mut self, ids: &[MsgId]) {
        for &id in ids {
            if self.ack_queue.len() == self.limits.ack_backlog {
                self.ack_queue.pop_front();
            }
            self.ack_queue.push_back(id);
        }
    }

    /// Peek at up to `max` pending acks without removing them.
    pub fn take_acks(&self, max: usize) -> Vec<MsgId> {
        self.ack_queue.iter().take(max).copied().collect()
    }

    /// Remove the first `n` acks once the frame carrying them was written.
    pub fn commit_acks(&mut self, n: usize) {
        self.ack_queue.drain(..n.min(self.ack_queue.len()));
    }

    /// Number of identifiers awaiting acknowledgment.
    pub fn ack_len(&self) -> usize {
        self.ack_queue.len()
    }

    // ─── Chains ──────────────────────────────────────────────────────────

    /// Identifiers a chained call must wait on.
    pub(crate) fn chain_ids(&self, chain: &str) -> Vec<MsgId> {
        self.call_queues
            .get(chain)
            .map(|q| q.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Append an identifier to a chain, evicting the oldest beyond the cap.
    pub(crate) fn chain_push(&mut self, chain: &str, id: MsgId) {
        let queue = self.call_queues.entry(chain.to_string()).or_default();
        queue.push_back(id);
        if queue.len() > self.limits.chain_cap {
            queue.pop_front();
        }
    }

    // ─── Sent bookkeeping ────────────────────────────────────────────────

    /// Move committed messages from pending to the sent table.
    ///
    /// Called once per successfully written frame; resets the pending cursor
    /// when the queue drains so slot keys stay small across epochs.
    pub fn commit(&mut self, commits: &[(PendingKey, MsgId)], ack_count: usize) {
        let now = std::time::Instant::now();
        for &(key, msg_id) in commits {
            if let Some(queued) = self.pending.remove(&key) {
                let seq_no = queued.seq_no.unwrap_or(0);
                let body = queued.wrapped.unwrap_or(queued.msg.body);
                self.sent.insert(
                    msg_id,
                    SentMessage {
                        name: queued.msg.name,
                        kind: queued.msg.kind,
                        body,
                        msg_id,
                        seq_no,
                        content_related: queued.msg.content_related,
                        sent_at: now,
                    },
                );
            }
        }
        self.commit_acks(ack_count);
        if self.pending.is_empty() {
            self.next_key = 0;
        }
    }

    /// Remove and return sent messages the read path has resolved.
    pub fn resolve_sent(&mut self, ids: &[MsgId]) -> Vec<SentMessage> {
        ids.iter().filter_map(|id| self.sent.remove(id)).collect()
    }

    /// Look at a sent message without removing it.
    pub fn sent_message(&self, id: MsgId) -> Option<&SentMessage> {
        self.sent.get(&id)
    }

    /// Drain everything for a reconnect: all pending slots plus all sent
    /// messages with no durable resend policy. Chains and acks are discarded
    /// with the connection epoch.
    pub fn drain_all(&mut self) -> (Vec<(PendingKey, QueuedMessage)>, Vec<SentMessage>) {
        let pending = std::mem::take(&mut self.pending).into_iter().collect();
        let sent = std::mem::take(&mut self.sent).into_values().collect();
        self.ack_queue.clear();
        self.call_queues.clear();
        self.next_key = 0;
        (pending, sent)
    }
}
