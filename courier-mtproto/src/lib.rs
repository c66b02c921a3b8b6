//! Sans-io core of the courier outgoing transport pipeline.
//!
//! This crate handles:
//! * Message identifiers and sequence numbers
//! * The per-connection outgoing queue (pending, sent, acks, chains)
//! * Batching queued messages into size-bounded frames and containers
//! * Envelope construction and MTProto 2.0 frame encryption
//! * Hand-written TL serialization for the service surface
//!
//! It is intentionally runtime-agnostic: the async connection writer lives
//! in `courier-sender`; this crate never blocks or spawns.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod batch;
pub mod envelope;
pub mod message;
pub mod queue;
pub mod session;
pub mod shared;
pub mod wire;

pub use batch::{pack_encrypted, pack_plain, NoTempKey, PackOutcome, Packed};
pub use message::{DropReason, MessageKind, MsgId, OutboundMessage, PendingKey, QueuedMessage, SentMessage};
pub use queue::{OutgoingQueue, QueueLimits};
pub use session::{MsgIdGenerator, SeqAllocator, Session};
pub use shared::{SharedKeys, TempKey, TempKeySnapshot};
pub use wire::{AppInfo, LAYER};
