//! Writer task tests over in-memory duplex streams.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use courier_crypto::AuthKey;
use courier_mtproto::envelope::open_client_frame;
use courier_mtproto::{MsgId, OutboundMessage, SharedKeys, wire};
use courier_sender::{
    Connection, DcId, FrameReader, FrameStream, Framing, Reconnector, SendError, SenderConfig,
    writer,
};
use tokio::io::DuplexStream;
use tokio::time::timeout;

const SALT: i64 = 77;

fn auth_key() -> AuthKey {
    AuthKey::from_bytes(std::array::from_fn(|i| (i * 3) as u8))
}

fn ready_keys() -> Arc<SharedKeys> {
    let shared = Arc::new(SharedKeys::new(false, false));
    shared.install_temp_key(auth_key(), SALT);
    shared.mark_inited();
    shared.mark_bound();
    shared
}

struct CountingReconnector(AtomicUsize);

impl Reconnector for CountingReconnector {
    fn reconnect(&self, _dc_id: DcId) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

fn config() -> SenderConfig {
    SenderConfig { framing: Framing::Intermediate, ..SenderConfig::default() }
}

fn harness(
    shared: Arc<SharedKeys>,
) -> (Arc<Connection>, FrameStream<DuplexStream>, FrameReader<DuplexStream>, Arc<CountingReconnector>) {
    let (client, server) = tokio::io::duplex(1 << 20);
    let conn = Connection::new(DcId(2), shared, config());
    let stream = FrameStream::new(client, Framing::Intermediate);
    let reader = FrameReader::new(server, Framing::Intermediate);
    let reconnector = Arc::new(CountingReconnector(AtomicUsize::new(0)));
    (conn, stream, reader, reconnector)
}

#[tokio::test]
async fn send_future_resolves_once_the_frame_is_written() {
    let (conn, stream, mut reader, reconnector) = harness(ready_keys());
    let body = vec![0x19u8, 0x28, 0x37, 0x46];
    let fut = conn.enqueue(OutboundMessage::method("ping", body.clone()));
    let handle = writer::spawn(Arc::clone(&conn), stream, reconnector);

    let msg_id = timeout(Duration::from_secs(5), fut).await.unwrap().unwrap();

    let mut frame = timeout(Duration::from_secs(5), reader.recv()).await.unwrap().unwrap();
    let opened = open_client_frame(&mut frame, &auth_key(), Some(conn.session_id())).unwrap();
    assert_eq!(opened.body, body);
    assert_eq!(opened.msg_id, msg_id);
    assert_eq!(opened.salt, SALT);
    assert_eq!(conn.stats().frames_sent, 1);

    conn.stop();
    handle.await.unwrap();
}

#[tokio::test]
async fn two_queued_calls_arrive_in_one_container() {
    let (conn, stream, mut reader, reconnector) = harness(ready_keys());
    let fut_a = conn.enqueue(OutboundMessage::method("a", vec![0xAA; 8]));
    let fut_b = conn.enqueue(OutboundMessage::method("b", vec![0xBB; 8]));
    let handle = writer::spawn(Arc::clone(&conn), stream, reconnector);

    let id_a = fut_a.await.unwrap();
    let id_b = fut_b.await.unwrap();
    assert!(id_b > id_a);

    let mut frame = timeout(Duration::from_secs(5), reader.recv()).await.unwrap().unwrap();
    let opened = open_client_frame(&mut frame, &auth_key(), Some(conn.session_id())).unwrap();
    assert_eq!(
        u32::from_le_bytes(opened.body[..4].try_into().unwrap()),
        wire::MSG_CONTAINER
    );
    assert_eq!(i32::from_le_bytes(opened.body[4..8].try_into().unwrap()), 2);
    assert_eq!(conn.stats().messages_sent, 2);

    conn.stop();
    handle.await.unwrap();
}

#[tokio::test]
async fn transport_failure_schedules_exactly_one_reconnect() {
    let (conn, stream, reader, reconnector) = harness(ready_keys());
    drop(reader); // writes now fail

    let fut = conn.enqueue(OutboundMessage::method("ping", vec![1; 4]));
    writer::run(Arc::clone(&conn), stream, Arc::clone(&reconnector) as Arc<dyn Reconnector>).await;

    assert_eq!(reconnector.0.load(Ordering::SeqCst), 1);
    assert!(conn.is_stale());

    // The message was not lost: still queued for the next epoch, so its
    // future only fails once supervision drains the connection.
    conn.fail_all(SendError::ConnectionReset);
    assert_eq!(fut.await, Err(SendError::ConnectionReset));
}

#[tokio::test]
async fn failure_on_already_stale_connection_is_swallowed() {
    let (conn, stream, reader, reconnector) = harness(ready_keys());
    drop(reader);
    conn.enqueue(OutboundMessage::method("ping", vec![1; 4]));
    conn.mark_stale();

    writer::run(Arc::clone(&conn), stream, Arc::clone(&reconnector) as Arc<dyn Reconnector>).await;
    assert_eq!(reconnector.0.load(Ordering::SeqCst), 0, "no double reconnect");
}

#[tokio::test]
async fn stop_terminates_a_suspended_writer() {
    let (conn, stream, _reader, reconnector) = harness(ready_keys());
    let handle = writer::spawn(Arc::clone(&conn), stream, reconnector);

    conn.stop();
    timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn paused_writer_holds_frames_until_resume() {
    let (conn, stream, mut reader, reconnector) = harness(ready_keys());
    conn.pause();
    let fut = conn.enqueue(OutboundMessage::method("ping", vec![2; 4]));
    let handle = writer::spawn(Arc::clone(&conn), stream, reconnector);

    assert!(
        timeout(Duration::from_millis(100), reader.recv()).await.is_err(),
        "nothing may be written while paused"
    );

    conn.resume();
    fut.await.unwrap();
    timeout(Duration::from_secs(5), reader.recv()).await.unwrap().unwrap();

    conn.stop();
    handle.await.unwrap();
}

#[tokio::test]
async fn pfs_gating_defers_until_bound() {
    let shared = Arc::new(SharedKeys::new(true, false));
    shared.install_temp_key(auth_key(), SALT);
    shared.mark_inited();
    let (conn, stream, mut reader, reconnector) = harness(Arc::clone(&shared));

    let call = conn.enqueue(OutboundMessage::method("ping", vec![9; 4]));
    let handle = writer::spawn(Arc::clone(&conn), stream, reconnector);

    assert!(
        timeout(Duration::from_millis(100), reader.recv()).await.is_err(),
        "gated call must not be written"
    );

    // The bind call itself passes the gate.
    let bind_body = vec![0xB0u8; 16];
    let bind = conn.enqueue(OutboundMessage::bind_temp_key(bind_body.clone()));
    bind.await.unwrap();
    let mut frame = timeout(Duration::from_secs(5), reader.recv()).await.unwrap().unwrap();
    let opened = open_client_frame(&mut frame, &auth_key(), Some(conn.session_id())).unwrap();
    assert_eq!(opened.body, bind_body);

    // Binding plus a wake releases the deferred call.
    shared.mark_bound();
    conn.wake();
    let msg_id = timeout(Duration::from_secs(5), call).await.unwrap().unwrap();
    let mut frame = timeout(Duration::from_secs(5), reader.recv()).await.unwrap().unwrap();
    let opened = open_client_frame(&mut frame, &auth_key(), Some(conn.session_id())).unwrap();
    assert_eq!(opened.msg_id, msg_id);
    assert_eq!(opened.body, vec![9; 4]);

    conn.stop();
    handle.await.unwrap();
}

#[tokio::test]
async fn acks_ride_the_next_frame() {
    let (conn, stream, mut reader, reconnector) = harness(ready_keys());
    let handle = writer::spawn(Arc::clone(&conn), stream, reconnector);

    conn.ack(&[MsgId(4), MsgId(8)]);
    // Passive: no wake, nothing written yet.
    assert!(timeout(Duration::from_millis(100), reader.recv()).await.is_err());

    conn.enqueue(OutboundMessage::method("ping", vec![7; 4])).await.unwrap();
    let mut frame = timeout(Duration::from_secs(5), reader.recv()).await.unwrap().unwrap();
    let opened = open_client_frame(&mut frame, &auth_key(), Some(conn.session_id())).unwrap();
    // Call + msgs_ack in one container.
    assert_eq!(
        u32::from_le_bytes(opened.body[..4].try_into().unwrap()),
        wire::MSG_CONTAINER
    );
    assert_eq!(i32::from_le_bytes(opened.body[4..8].try_into().unwrap()), 2);

    conn.stop();
    handle.await.unwrap();
}
