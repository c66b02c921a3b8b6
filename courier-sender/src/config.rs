//! Sender configuration.
//!
//! Everything is passed explicitly; there are no process-wide defaults.

pub use courier_mtproto::{AppInfo, QueueLimits};

use crate::transport::Framing;

/// Per-connection configuration for the sender.
#[derive(Clone, Debug, Default)]
pub struct SenderConfig {
    /// Client metadata announced in the handshake envelope.
    pub app: AppInfo,
    /// Bounds on the outgoing queue's auxiliary state.
    pub limits: QueueLimits,
    /// Transport framing for outgoing frames.
    pub framing: Framing,
}
