//! Async connection writer for the courier MTProto pipeline.
//!
//! This crate owns everything that touches a socket or a runtime:
//! * [`Connection`] — per-socket state, concurrent enqueue, send futures
//! * [`writer`] — the one-task-per-connection write loop
//! * [`FrameStream`] / [`FrameReader`] — abridged and intermediate framing
//! * [`DcArena`] — connections indexed by datacenter id
//!
//! The protocol itself (queueing, batching, encryption) lives in
//! `courier-mtproto`, which this crate drives.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod conn;
mod errors;
mod pool;
mod transport;
pub mod writer;

pub use config::{AppInfo, QueueLimits, SenderConfig};
pub use conn::{ConnStats, Connection, SendFuture};
pub use errors::SendError;
pub use pool::{DcArena, DcId};
pub use transport::{FrameReader, FrameStream, Framing};
pub use writer::Reconnector;
