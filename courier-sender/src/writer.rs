//! The connection writer: one cooperative task per connection driving the
//! batcher and the transport.
//!
//! The task suspends only while the queue is empty, the writer is paused, or
//! every candidate was deferred by gating; it never suspends mid-batch. A
//! stop signal is honored immediately while suspended and between frames
//! while busy. A transport failure terminates the task and triggers exactly
//! one reconnect, unless the connection was already marked for replacement.

use std::sync::Arc;

use tokio::io::AsyncWrite;
use tokio::task::JoinHandle;

use crate::conn::Connection;
use crate::pool::DcId;
use crate::transport::FrameStream;

/// Fire-and-forget reconnect trigger, invoked at most once per stale
/// connection.
pub trait Reconnector: Send + Sync + 'static {
    /// Schedule a reconnect for the given datacenter.
    fn reconnect(&self, dc_id: DcId);
}

/// Spawn the writer task for `conn` over `stream`.
pub fn spawn<W>(
    conn: Arc<Connection>,
    stream: FrameStream<W>,
    reconnector: Arc<dyn Reconnector>,
) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(run(conn, stream, reconnector))
}

/// The writer loop. Runs until stopped, the connection goes stale, or the
/// transport fails.
pub async fn run<W>(conn: Arc<Connection>, mut stream: FrameStream<W>, reconnector: Arc<dyn Reconnector>)
where
    W: AsyncWrite + Unpin,
{
    let dc_id = conn.dc_id();
    let mut please_wait = false;
    loop {
        // Idle: suspend until there is sendable work.
        while please_wait || conn.is_paused() || conn.queue_is_empty() {
            if conn.is_stale() {
                log::debug!("[writer {dc_id}] not writing, connection is old");
                return;
            }
            please_wait = false;
            log::trace!("[writer {dc_id}] waiting for work");
            tokio::select! {
                _ = conn.cancel_token().cancelled() => {
                    log::trace!("[writer {dc_id}] stopped while idle");
                    return;
                }
                _ = conn.notify_handle().notified() => {}
            }
        }
        if conn.cancel_token().is_cancelled() {
            log::trace!("[writer {dc_id}] stopped between frames");
            return;
        }
        if conn.is_stale() {
            log::debug!("[writer {dc_id}] not writing, connection is old");
            return;
        }

        // Writing: build one frame under the queue lock, then write without it.
        let outcome = match conn.build_frame() {
            Ok(outcome) => outcome,
            Err(e) => {
                // Key vanished between the mode check and the pack; re-check
                // presence on the next wake.
                log::error!("[writer {dc_id}] {e}");
                please_wait = true;
                continue;
            }
        };
        conn.fail_dropped(&outcome.dropped);
        please_wait = outcome.deferred;

        let Some(packed) = outcome.frame else {
            continue;
        };
        match stream.send(&packed.wire).await {
            Ok(()) => {
                log::trace!(
                    "[writer {dc_id}] sent frame: {} messages, {} acks",
                    packed.message_count,
                    packed.ack_count
                );
                conn.commit(&packed);
            }
            Err(e) => {
                if conn.is_stale() {
                    // Replacement already scheduled; don't double-reconnect.
                    log::debug!("[writer {dc_id}] write failed on stale connection: {e}");
                    return;
                }
                conn.mark_stale();
                log::error!("[writer {dc_id}] write failed: {e}, reconnecting");
                reconnector.reconnect(dc_id);
                return;
            }
        }
    }
}
