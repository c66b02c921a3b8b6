//! Outgoing message model.

use std::time::Instant;

/// A 64-bit MTProto message identifier.
///
/// Client-issued identifiers are derived from the current Unix time, strictly
/// increase within one connection epoch, and are always divisible by 4 (the
/// two least significant bits are `0b00` for client messages).
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct MsgId(pub i64);

impl std::fmt::Display for MsgId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable slot key for a not-yet-sent message in the pending map.
///
/// Keys record insertion order; they are not message identifiers and are
/// recycled once the queue fully drains.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PendingKey(pub u64);

/// What a queued message is, as far as the batcher cares.
///
/// The batcher gates, deduplicates, and wraps messages by kind instead of
/// inspecting constructor names.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MessageKind {
    /// An RPC method call awaiting a server response.
    Method,
    /// The temp-key binding call; exempt from forward-secrecy gating.
    BindTempKey,
    /// Poll-wait control message for the polling transport mode.
    HttpWait,
    /// `msgs_state_req` — at most one per frame.
    StateRequest,
    /// `msg_resend_req` — at most one per frame.
    ResendRequest,
    /// Any other service object (acks, status, ...).
    Service,
    /// A synthetic container placeholder left behind by a partial attempt.
    Container,
}

impl MessageKind {
    /// Whether this kind carries a method call (expects a server response).
    pub fn is_method(self) -> bool {
        matches!(self, Self::Method | Self::BindTempKey)
    }
}

/// One logical unit to transmit, as handed in by a producer.
#[derive(Clone, Debug)]
pub struct OutboundMessage {
    /// Constructor name, kept for diagnostics only.
    pub name: String,
    /// TL-serialized body.
    pub body: Vec<u8>,
    /// Batching classification.
    pub kind: MessageKind,
    /// Whether this message advances the sequence counter (odd seqno).
    pub content_related: bool,
    /// Whether this message must go out before any key exists.
    pub unencrypted: bool,
    /// Optional logical chain: the server executes this call only after the
    /// chain's currently-pending identifiers.
    pub chain: Option<String>,
}

impl OutboundMessage {
    /// A content-related method call.
    pub fn method(name: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            body,
            kind: MessageKind::Method,
            content_related: true,
            unencrypted: false,
            chain: None,
        }
    }

    /// A content-unrelated service object.
    pub fn service(name: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            body,
            kind: MessageKind::Service,
            content_related: false,
            unencrypted: false,
            chain: None,
        }
    }

    /// The temp-key binding call.
    pub fn bind_temp_key(body: Vec<u8>) -> Self {
        Self {
            name: "auth.bindTempAuthKey".into(),
            body,
            kind: MessageKind::BindTempKey,
            content_related: true,
            unencrypted: false,
            chain: None,
        }
    }

    /// Mark the message unencrypted (pre-key handshake traffic).
    pub fn plain(mut self) -> Self {
        self.unencrypted = true;
        self
    }

    /// Attach a chain name.
    pub fn in_chain(mut self, chain: impl Into<String>) -> Self {
        self.chain = Some(chain.into());
        self
    }
}

/// A message inside the pending map.
///
/// Identifier, sequence number, and the wrapped body are assigned at first
/// admission and stick across partial attempts, so a retried message keeps
/// exactly the bytes and numbering of its first admission.
#[derive(Clone, Debug)]
pub struct QueuedMessage {
    /// The producer's message.
    pub msg: OutboundMessage,
    /// Identifier, set once at admission.
    pub msg_id: Option<MsgId>,
    /// Sequence number, set once at admission.
    pub seq_no: Option<i32>,
    /// Body after init/chain wrapping, computed at admission.
    pub wrapped: Option<Vec<u8>>,
    /// For container placeholders: identifiers of the wrapped messages.
    pub container_ids: Vec<MsgId>,
}

impl QueuedMessage {
    pub(crate) fn new(msg: OutboundMessage) -> Self {
        Self { msg, msg_id: None, seq_no: None, wrapped: None, container_ids: Vec::new() }
    }

    pub(crate) fn container_placeholder(ids: Vec<MsgId>) -> Self {
        Self {
            msg: OutboundMessage {
                name: "msg_container".into(),
                body: Vec::new(),
                kind: MessageKind::Container,
                content_related: false,
                unencrypted: false,
                chain: None,
            },
            msg_id: None,
            seq_no: None,
            wrapped: None,
            container_ids: ids,
        }
    }
}

/// A message that has been written to the transport, retained until the read
/// path resolves or evicts it.
#[derive(Clone, Debug)]
pub struct SentMessage {
    /// Constructor name, for diagnostics.
    pub name: String,
    /// Batching classification.
    pub kind: MessageKind,
    /// The body as it went on the wire (after any wrapping).
    pub body: Vec<u8>,
    /// Assigned identifier.
    pub msg_id: MsgId,
    /// Assigned sequence number.
    pub seq_no: i32,
    /// Whether the message advanced the sequence counter.
    pub content_related: bool,
    /// When the frame carrying it was written.
    pub sent_at: Instant,
}

/// Why the batcher removed a message from the queue without sending it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DropReason {
    /// Unencrypted message found after a temporary key exists; the
    /// unencrypted path is permanently dead on this connection.
    Abandoned,
    /// A duplicate control message; an earlier one in the same frame already
    /// tells the server everything.
    Superseded,
}
