//! Frame batching: select, gate, wrap, and pack queued messages into one
//! wire-ready frame.
//!
//! One call builds at most one frame. Messages that do not fit stay queued
//! for the next call; messages gated by forward secrecy stay queued and set
//! the `deferred` flag so the scheduler waits for the next wake instead of
//! spinning.

use crate::envelope;
use crate::message::{DropReason, MessageKind, MsgId, PendingKey, QueuedMessage};
use crate::queue::OutgoingQueue;
use crate::session::Session;
use crate::shared::SharedKeys;
use crate::wire::{self, AppInfo};

/// Maximum sum of `body + MSG_OVERHEAD` across one frame's messages.
pub const MAX_PAYLOAD: usize = 32760;
/// Maximum number of messages per frame.
pub const MAX_MESSAGES: usize = 1020;
/// Fixed per-message cost used for frame budgeting.
pub const MSG_OVERHEAD: usize = 32;
/// Maximum acknowledgment identifiers flushed per frame.
pub const MAX_ACKS: usize = MAX_MESSAGES;

/// The batcher was asked to build an encrypted frame with no temporary key.
///
/// This is a programming-invariant violation, not a recoverable condition;
/// the caller must check key presence before re-entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct NoTempKey;

impl std::fmt::Display for NoTempKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "encrypted batch attempted with no temporary key")
    }
}
impl std::error::Error for NoTempKey {}

/// A built frame plus the bookkeeping it commits on successful write.
pub struct Packed {
    /// Final wire bytes (encrypted frame, or plain frame on the
    /// unencrypted path).
    pub wire: Vec<u8>,
    /// `(pending slot, assigned identifier)` pairs to move to the sent
    /// table once the write succeeds.
    pub commits: Vec<(PendingKey, MsgId)>,
    /// How many acks ride in this frame (trimmed from the backlog on
    /// successful write).
    pub ack_count: usize,
    /// Number of messages in the frame.
    pub message_count: usize,
    /// Whether the frame is a container.
    pub container: bool,
}

/// Result of one batch attempt.
pub struct PackOutcome {
    /// The frame to write, if anything was admitted.
    pub frame: Option<Packed>,
    /// Messages removed from the queue without sending, with the reason;
    /// the caller fails their send futures.
    pub dropped: Vec<(PendingKey, DropReason)>,
    /// True when candidates remain queued but gating deferred them all;
    /// the scheduler must wait for the next wake signal instead of looping.
    pub deferred: bool,
}

/// Build one unencrypted frame (pre-key handshake traffic).
///
/// Picks the first pending message flagged unencrypted; each such message
/// travels in its own frame. Messages not flagged unencrypted are left for
/// the encrypted path.
pub fn pack_plain(queue: &mut OutgoingQueue, session: &mut Session) -> PackOutcome {
    let keys: Vec<PendingKey> = queue.pending.keys().copied().collect();
    for key in keys {
        let entry = queue.pending.get_mut(&key).expect("key just listed");
        if !entry.msg.unencrypted {
            continue;
        }
        let msg_id = match entry.msg_id {
            Some(id) => id,
            None => {
                let id = session.next_msg_id();
                entry.msg_id = Some(id);
                id
            }
        };
        log::trace!("[batch] sending {} as unencrypted message", entry.msg.name);
        let wire = envelope::plain_frame(msg_id, &entry.msg.body);
        return PackOutcome {
            frame: Some(Packed {
                wire,
                commits: vec![(key, msg_id)],
                ack_count: 0,
                message_count: 1,
                container: false,
            }),
            dropped: Vec::new(),
            deferred: false,
        };
    }
    // Everything pending wants the encrypted path; wait for a key.
    PackOutcome { frame: None, dropped: Vec::new(), deferred: !queue.is_empty() }
}

/// Build one encrypted frame.
///
/// Walks the pending map in slot order, gates and wraps candidates, packs
/// them under the frame size and count limits, appends pending acks and the
/// poll-wait control message, and wraps multiple messages in a container.
pub fn pack_encrypted(
    queue: &mut OutgoingQueue,
    session: &mut Session,
    shared: &SharedKeys,
    app: &AppInfo,
) -> Result<PackOutcome, NoTempKey> {
    let snap = shared.temp_key().ok_or(NoTempKey)?;
    let pfs_gated = shared.pfs() && !snap.bound;
    let http = shared.is_http();

    let mut batch: Vec<(MsgId, i32, Vec<u8>)> = Vec::new();
    let mut commits: Vec<(PendingKey, MsgId)> = Vec::new();
    let mut dropped: Vec<(PendingKey, DropReason)> = Vec::new();
    let mut stale_containers: Vec<PendingKey> = Vec::new();

    let mut total_length = 0usize;
    let mut deferred = false;
    let mut has_seq = false;
    let mut has_state = false;
    let mut has_resend = false;
    let mut has_http_wait = false;
    let mut inited_here = false;

    let keys: Vec<PendingKey> = queue.pending.keys().copied().collect();
    for key in keys {
        let entry = queue.pending.get(&key).expect("key just listed");

        // The unencrypted path is permanently dead once a key exists.
        if entry.msg.unencrypted {
            log::debug!("[batch] abandoning unencrypted {} after key install", entry.msg.name);
            dropped.push((key, DropReason::Abandoned));
            continue;
        }
        // Containers from a failed earlier attempt are rebuilt, not resent.
        if entry.msg.kind == MessageKind::Container {
            stale_containers.push(key);
            continue;
        }
        // Forward secrecy: only the bind call and poll-wait may go out
        // before the temp key is bound.
        if pfs_gated && entry.msg.kind == MessageKind::Method {
            log::debug!("[batch] skipping {} until the temp key is bound", entry.msg.name);
            deferred = true;
            continue;
        }
        // At most one state request and one resend request per frame.
        match entry.msg.kind {
            MessageKind::HttpWait => has_http_wait = true,
            MessageKind::StateRequest => {
                if has_state {
                    dropped.push((key, DropReason::Superseded));
                    continue;
                }
                has_state = true;
            }
            MessageKind::ResendRequest => {
                if has_resend {
                    dropped.push((key, DropReason::Superseded));
                    continue;
                }
                has_resend = true;
            }
            _ => {}
        }

        let body_len = entry.wrapped.as_ref().map_or(entry.msg.body.len(), Vec::len);
        if (total_length > 0 && total_length + body_len + MSG_OVERHEAD > MAX_PAYLOAD)
            || batch.len() >= MAX_MESSAGES
        {
            log::trace!("[batch] length overflow, postponing part of payload");
            break;
        }

        if entry.seq_no.is_some() {
            has_seq = true;
        }

        let msg_id = match entry.msg_id {
            Some(id) => id,
            None => session.next_msg_id(),
        };

        // Wrapping happens once; a partial attempt keeps the wrapped bytes.
        let mut chain_to_append: Option<String> = None;
        let body: Vec<u8> = match &entry.wrapped {
            Some(w) => w.clone(),
            None => {
                if entry.msg.kind == MessageKind::Method && !snap.inited && !inited_here {
                    inited_here = true;
                    log::debug!("[batch] wrapping {} in the handshake envelope", entry.msg.name);
                    init_wrap(app, &entry.msg.body, entry.msg.chain.as_deref(), queue, &mut chain_to_append)
                } else if entry.msg.kind == MessageKind::Method
                    && let Some(chain) = &entry.msg.chain
                {
                    chain_to_append = Some(chain.clone());
                    wire::invoke_after_msgs(&queue.chain_ids(chain), &entry.msg.body)
                } else {
                    entry.msg.body.clone()
                }
            }
        };

        // Re-check the wrapped size before any chain mutation, so an
        // overflow break never leaves a stale identifier in a chain.
        if total_length > 0 && total_length + body.len() + MSG_OVERHEAD > MAX_PAYLOAD {
            log::trace!("[batch] length overflow after wrapping, postponing");
            break;
        }

        let entry = queue.pending.get_mut(&key).expect("key just listed");
        let seq_no = match entry.seq_no {
            Some(n) => n,
            None => session.next_seq_no(entry.msg.content_related),
        };
        entry.msg_id = Some(msg_id);
        entry.seq_no = Some(seq_no);
        entry.wrapped = Some(body.clone());

        if let Some(chain) = chain_to_append {
            queue.chain_push(&chain, msg_id);
        }

        log::trace!(
            "[batch] sending {} as encrypted message (msg_id {msg_id})",
            queue.pending[&key].msg.name
        );
        total_length += body.len() + MSG_OVERHEAD;
        batch.push((msg_id, seq_no, body));
        commits.push((key, msg_id));
    }

    for key in dropped.iter().map(|(k, _)| *k).chain(stale_containers) {
        queue.pending.remove(&key);
    }

    // Outstanding acks ride along as a single msgs_ack.
    let acks = queue.take_acks(MAX_ACKS);
    let ack_count = acks.len();
    if ack_count > 0 {
        log::debug!("[batch] adding msgs_ack over {ack_count} ids");
        let body = wire::msgs_ack(&acks);
        let msg_id = session.next_msg_id();
        let seq_no = session.next_seq_no(false);
        batch.push((msg_id, seq_no, body));
    }
    // Polling mode keeps the connection held open with a poll-wait message.
    if http && !has_http_wait {
        log::debug!("[batch] adding http_wait");
        let body = wire::http_wait();
        let msg_id = session.next_msg_id();
        let seq_no = session.next_seq_no(true);
        batch.push((msg_id, seq_no, body));
    }

    let message_count = batch.len();
    let (msg_id, seq_no, payload, container) = if batch.len() > 1 || has_seq {
        let inner: Vec<(MsgId, i32, &[u8])> =
            batch.iter().map(|(id, seq, body)| (*id, *seq, body.as_slice())).collect();
        let payload = wire::msg_container(&inner);
        let msg_id = session.next_msg_id();
        let seq_no = session.next_seq_no(false);
        log::debug!(
            "[batch] wrapping {} messages ({total_length} bytes) in msg_container",
            batch.len()
        );
        // The container itself is tracked: a failed write leaves a
        // placeholder the next attempt skips.
        let ids: Vec<MsgId> = commits.iter().map(|(_, id)| *id).collect();
        let mut placeholder = QueuedMessage::container_placeholder(ids);
        placeholder.msg_id = Some(msg_id);
        placeholder.seq_no = Some(seq_no);
        let placeholder_key = queue.insert(placeholder);
        commits.push((placeholder_key, msg_id));
        (msg_id, seq_no, payload, true)
    } else if let Some((msg_id, seq_no, payload)) = batch.pop() {
        (msg_id, seq_no, payload, false)
    } else {
        if !deferred {
            log::warn!("[batch] no message sent");
        }
        return Ok(PackOutcome { frame: None, dropped, deferred });
    };

    let wire = envelope::encrypt_envelope(
        &snap.auth_key,
        snap.salt,
        session.session_id,
        msg_id,
        seq_no,
        &payload,
    );

    if inited_here {
        shared.mark_inited();
    }

    Ok(PackOutcome {
        frame: Some(Packed { wire, commits, ack_count, message_count, container }),
        dropped,
        deferred,
    })
}

fn init_wrap(
    app: &AppInfo,
    body: &[u8],
    chain: Option<&str>,
    queue: &OutgoingQueue,
    chain_to_append: &mut Option<String>,
) -> Vec<u8> {
    // A chained first call is chained first, then announced.
    let inner = match chain {
        Some(chain) => {
            *chain_to_append = Some(chain.to_string());
            wire::invoke_after_msgs(&queue.chain_ids(chain), body)
        }
        None => body.to_vec(),
    };
    wire::init_envelope(app, &inner)
}
