//! Error types for courier-sender.

use std::fmt;

use courier_mtproto::DropReason;

/// Why a message's send future failed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SendError {
    /// The message was flagged unencrypted but a temporary key now exists;
    /// the unencrypted path is permanently dead on this connection.
    Abandoned,
    /// A duplicate control message was dropped in favor of an earlier one
    /// in the same frame.
    Superseded,
    /// The connection went away before the message was written; safe to
    /// retry on a fresh connection.
    ConnectionReset,
    /// The writer was stopped for good.
    Stopped,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Abandoned => write!(f, "unencrypted message abandoned after key install"),
            Self::Superseded => write!(f, "superseded by an equivalent control message"),
            Self::ConnectionReset => write!(f, "connection reset before the message was written"),
            Self::Stopped => write!(f, "writer stopped"),
        }
    }
}

impl std::error::Error for SendError {}

impl From<DropReason> for SendError {
    fn from(reason: DropReason) -> Self {
        match reason {
            DropReason::Abandoned => Self::Abandoned,
            DropReason::Superseded => Self::Superseded,
        }
    }
}
