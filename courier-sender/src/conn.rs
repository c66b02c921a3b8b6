//! Per-socket connection state and the producer-facing enqueue surface.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use courier_mtproto::batch::{self, NoTempKey, PackOutcome, Packed};
use courier_mtproto::{
    DropReason, MsgId, OutboundMessage, OutgoingQueue, PendingKey, SentMessage, Session,
    SharedKeys,
};
use tokio::sync::{Notify, oneshot};
use tokio_util::sync::CancellationToken;

use crate::config::SenderConfig;
use crate::errors::SendError;
use crate::pool::DcId;

struct Inner {
    queue: OutgoingQueue,
    session: Session,
    futures: HashMap<PendingKey, oneshot::Sender<Result<MsgId, SendError>>>,
}

/// One physical connection's write-side state.
///
/// Producers enqueue concurrently; exactly one writer task (spawned by
/// [`crate::writer`]) drains. Created on successful dial, discarded on
/// reconnect — identifiers and session state never survive an epoch.
pub struct Connection {
    dc_id: DcId,
    shared: Arc<SharedKeys>,
    config: SenderConfig,
    inner: Mutex<Inner>,
    notify: Notify,
    stale: AtomicBool,
    paused: AtomicBool,
    cancel: CancellationToken,
    frames_sent: AtomicU64,
    messages_sent: AtomicU64,
    last_write: Mutex<Option<Instant>>,
}

/// Send statistics for diagnostics.
#[derive(Clone, Copy, Debug)]
pub struct ConnStats {
    /// Frames written to the transport.
    pub frames_sent: u64,
    /// Logical messages those frames carried.
    pub messages_sent: u64,
    /// When the last frame was written.
    pub last_write: Option<Instant>,
}

/// Resolves once the frame carrying the message has been written.
///
/// This is the send acknowledgment, not the server's response — response
/// correlation belongs to the read path.
pub struct SendFuture(oneshot::Receiver<Result<MsgId, SendError>>);

impl Future for SendFuture {
    type Output = Result<MsgId, SendError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.0).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // The connection dropped without resolving: retryable.
            Poll::Ready(Err(_)) => Poll::Ready(Err(SendError::ConnectionReset)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Connection {
    /// Fresh connection state for one dialed socket.
    pub fn new(dc_id: DcId, shared: Arc<SharedKeys>, config: SenderConfig) -> Arc<Self> {
        Arc::new(Self {
            dc_id,
            shared,
            inner: Mutex::new(Inner {
                queue: OutgoingQueue::with_limits(config.limits),
                session: Session::new(),
                futures: HashMap::new(),
            }),
            config,
            notify: Notify::new(),
            stale: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            frames_sent: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            last_write: Mutex::new(None),
        })
    }

    /// The datacenter this connection talks to.
    pub fn dc_id(&self) -> DcId {
        self.dc_id
    }

    /// The key state shared with the read path.
    pub fn shared(&self) -> &Arc<SharedKeys> {
        &self.shared
    }

    /// This connection's session identifier.
    pub fn session_id(&self) -> i64 {
        self.inner.lock().unwrap().session.session_id
    }

    /// Queue a message and wake the writer.
    pub fn enqueue(&self, msg: OutboundMessage) -> SendFuture {
        let (tx, rx) = oneshot::channel();
        {
            let mut inner = self.inner.lock().unwrap();
            let key = inner.queue.push(msg);
            inner.futures.insert(key, tx);
        }
        self.notify.notify_one();
        SendFuture(rx)
    }

    /// Register inbound identifiers to acknowledge.
    ///
    /// Passive: acks ride the next frame rather than forcing one.
    pub fn ack(&self, ids: &[MsgId]) {
        self.inner.lock().unwrap().queue.register_acks(ids);
    }

    /// Read-path hook: remove sent messages whose responses arrived.
    pub fn resolve_sent(&self, ids: &[MsgId]) -> Vec<SentMessage> {
        self.inner.lock().unwrap().queue.resolve_sent(ids)
    }

    /// Whether the connection has been marked for replacement.
    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }

    /// Mark the connection for replacement; the writer exits on next check.
    pub fn mark_stale(&self) {
        self.stale.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    /// Suspend the writer (e.g. during reconnect supervision).
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    /// Resume a paused writer.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
        self.notify.notify_one();
    }

    /// Whether the writer is paused.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Stop the writer for good.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Wake the writer (e.g. after installing or binding a key).
    pub fn wake(&self) {
        self.notify.notify_one();
    }

    /// Send statistics.
    pub fn stats(&self) -> ConnStats {
        ConnStats {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            last_write: *self.last_write.lock().unwrap(),
        }
    }

    /// Fail every queued and in-flight message with `err`.
    ///
    /// Called by reconnect supervision when this epoch's messages have no
    /// durable resend policy.
    pub fn fail_all(&self, err: SendError) {
        let mut inner = self.inner.lock().unwrap();
        let _ = inner.queue.drain_all();
        for (_, tx) in inner.futures.drain() {
            let _ = tx.send(Err(err));
        }
    }

    // ─── Writer internals ────────────────────────────────────────────────

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn notify_handle(&self) -> &Notify {
        &self.notify
    }

    pub(crate) fn queue_is_empty(&self) -> bool {
        self.inner.lock().unwrap().queue.is_empty()
    }

    /// One batch attempt. Mode is chosen by key presence at entry; the lock
    /// is held only for the synchronous pack, never across a write.
    pub(crate) fn build_frame(&self) -> Result<PackOutcome, NoTempKey> {
        let mut inner = self.inner.lock().unwrap();
        let inner = &mut *inner;
        if self.shared.has_temp_key() {
            batch::pack_encrypted(&mut inner.queue, &mut inner.session, &self.shared, &self.config.app)
        } else {
            Ok(batch::pack_plain(&mut inner.queue, &mut inner.session))
        }
    }

    /// Fail the futures of messages the batcher dropped.
    pub(crate) fn fail_dropped(&self, dropped: &[(PendingKey, DropReason)]) {
        if dropped.is_empty() {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        for &(key, reason) in dropped {
            if let Some(tx) = inner.futures.remove(&key) {
                let _ = tx.send(Err(reason.into()));
            }
        }
    }

    /// Commit a successfully written frame: move messages to the sent table,
    /// resolve their send futures, trim acks, update statistics.
    pub(crate) fn commit(&self, packed: &Packed) {
        let mut inner = self.inner.lock().unwrap();
        inner.queue.commit(&packed.commits, packed.ack_count);
        for &(key, msg_id) in &packed.commits {
            if let Some(tx) = inner.futures.remove(&key) {
                let _ = tx.send(Ok(msg_id));
            }
        }
        drop(inner);
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.messages_sent.fetch_add(packed.message_count as u64, Ordering::Relaxed);
        *self.last_write.lock().unwrap() = Some(Instant::now());
    }
}
