//! # courier — MTProto client transport pipeline
//!
//! `courier` is a modular Rust implementation of the outgoing transport
//! pipeline of an MTProto client. It consists of three focused sub-crates
//! wired together here for convenience:
//!
//! | Sub-crate         | Role                                                    |
//! |-------------------|----------------------------------------------------------|
//! | `courier-crypto`  | AES-256-IGE, SHA macros, auth keys, frame encryption     |
//! | `courier-mtproto` | Sans-io core: ids, seqnos, queueing, batching, envelopes |
//! | `courier-sender`  | Async connection writer, transport framing, DC arena     |
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use courier::{Connection, DcId, OutboundMessage, SenderConfig, SharedKeys};
//!
//! # async fn demo(serialized_call: Vec<u8>) {
//! let shared = Arc::new(SharedKeys::new(true, false));
//! let conn = Connection::new(DcId(2), shared, SenderConfig::default());
//!
//! // Producers enqueue from anywhere; the writer task drains.
//! let sent = conn.enqueue(OutboundMessage::method("help.getConfig", serialized_call));
//! let msg_id = sent.await.unwrap();
//! # let _ = msg_id;
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Re-export of [`courier_crypto`] — AES-IGE, SHA, auth keys, frame encryption.
pub use courier_crypto as crypto;

/// Re-export of [`courier_mtproto`] — queue, batcher, envelopes, session state.
pub use courier_mtproto as mtproto;

/// Re-export of [`courier_sender`] — connection writer, transports, DC arena.
pub use courier_sender as sender;

// ─── Convenience re-exports ───────────────────────────────────────────────────

pub use courier_crypto::AuthKey;
pub use courier_mtproto::{
    AppInfo, MessageKind, MsgId, OutboundMessage, OutgoingQueue, QueueLimits, Session, SharedKeys,
    LAYER,
};
pub use courier_sender::{
    Connection, DcArena, DcId, Framing, Reconnector, SendError, SenderConfig,
};
