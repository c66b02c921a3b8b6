//! Hand-written TL serialization for the service surface the pipeline emits.
//!
//! The application RPC schema lives in an external serializer; the pipeline
//! itself only ever builds this closed set of service objects, so their
//! constructors are written out directly.

use crate::message::MsgId;

/// Schema layer announced in the handshake envelope.
pub const LAYER: i32 = 166;

/// `msgs_ack#62d6b459 msg_ids:Vector<long>`
pub const MSGS_ACK: u32 = 0x62d6b459;
/// `http_wait#9299359f max_delay:int wait_after:int max_wait:int`
pub const HTTP_WAIT: u32 = 0x9299359f;
/// `msg_container#73f1f8dc messages:vector<%Message>`
pub const MSG_CONTAINER: u32 = 0x73f1f8dc;
/// `msgs_state_req#da69fb52 msg_ids:Vector<long>`
pub const MSGS_STATE_REQ: u32 = 0xda69fb52;
/// `msg_resend_req#7d861a08 msg_ids:Vector<long>`
pub const MSG_RESEND_REQ: u32 = 0x7d861a08;
/// `invokeAfterMsgs#3dc4b4f0 msg_ids:Vector<long> query:!X`
pub const INVOKE_AFTER_MSGS: u32 = 0x3dc4b4f0;
/// `invokeWithLayer#da9b0d0d layer:int query:!X`
pub const INVOKE_WITH_LAYER: u32 = 0xda9b0d0d;
/// `initConnection#c1cd5ea9 flags:# api_id:int device_model:string ... query:!X`
pub const INIT_CONNECTION: u32 = 0xc1cd5ea9;

const VECTOR: u32 = 0x1cb5c415;

/// Client/application metadata announced in the handshake envelope.
#[derive(Clone, Debug)]
pub struct AppInfo {
    /// Application identifier issued by the service.
    pub api_id: i32,
    /// Device model string.
    pub device_model: String,
    /// Operating system version string.
    pub system_version: String,
    /// Application version string.
    pub app_version: String,
    /// System language code.
    pub system_lang_code: String,
    /// Language pack name (empty for none).
    pub lang_pack: String,
    /// Application language code.
    pub lang_code: String,
}

impl Default for AppInfo {
    fn default() -> Self {
        Self {
            api_id: 0,
            device_model: "Linux".into(),
            system_version: "1.0".into(),
            app_version: env!("CARGO_PKG_VERSION").into(),
            system_lang_code: "en".into(),
            lang_pack: String::new(),
            lang_code: "en".into(),
        }
    }
}

/// TL string/bytes encoding: length-prefixed, zero-padded to 4 bytes.
///
/// * `len ≤ 253`: `[len as u8][data][padding]`
/// * `len ≥ 254`: `[0xfe][len as 3 LE bytes][data][padding]`
pub fn write_bytes(buf: &mut Vec<u8>, data: &[u8]) {
    let len = data.len();
    let header_len = if len <= 253 {
        buf.push(len as u8);
        1
    } else {
        buf.push(0xfe);
        buf.push((len & 0xff) as u8);
        buf.push(((len >> 8) & 0xff) as u8);
        buf.push(((len >> 16) & 0xff) as u8);
        4
    };
    buf.extend_from_slice(data);
    let padding = (4 - (header_len + len) % 4) % 4;
    buf.extend(std::iter::repeat_n(0u8, padding));
}

fn write_string(buf: &mut Vec<u8>, s: &str) {
    write_bytes(buf, s.as_bytes());
}

fn write_id_vector(buf: &mut Vec<u8>, ids: &[MsgId]) {
    buf.extend_from_slice(&VECTOR.to_le_bytes());
    buf.extend_from_slice(&(ids.len() as i32).to_le_bytes());
    for id in ids {
        buf.extend_from_slice(&id.0.to_le_bytes());
    }
}

/// Serialize `msgs_ack` over the given identifiers.
pub fn msgs_ack(ids: &[MsgId]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(12 + ids.len() * 8);
    buf.extend_from_slice(&MSGS_ACK.to_le_bytes());
    write_id_vector(&mut buf, ids);
    buf
}

/// Serialize `msgs_state_req` over the given identifiers.
pub fn msgs_state_req(ids: &[MsgId]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(12 + ids.len() * 8);
    buf.extend_from_slice(&MSGS_STATE_REQ.to_le_bytes());
    write_id_vector(&mut buf, ids);
    buf
}

/// Serialize `msg_resend_req` over the given identifiers.
pub fn msg_resend_req(ids: &[MsgId]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(12 + ids.len() * 8);
    buf.extend_from_slice(&MSG_RESEND_REQ.to_le_bytes());
    write_id_vector(&mut buf, ids);
    buf
}

/// Serialize the poll-wait control message `http_wait(0, 0, 30000)`.
pub fn http_wait() -> Vec<u8> {
    let mut buf = Vec::with_capacity(16);
    buf.extend_from_slice(&HTTP_WAIT.to_le_bytes());
    buf.extend_from_slice(&0i32.to_le_bytes()); // max_delay
    buf.extend_from_slice(&0i32.to_le_bytes()); // wait_after
    buf.extend_from_slice(&30_000i32.to_le_bytes()); // max_wait
    buf
}

/// Wrap `query` in `invokeAfterMsgs` over the chain's pending identifiers.
pub fn invoke_after_msgs(ids: &[MsgId], query: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(12 + ids.len() * 8 + query.len());
    buf.extend_from_slice(&INVOKE_AFTER_MSGS.to_le_bytes());
    write_id_vector(&mut buf, ids);
    buf.extend_from_slice(query);
    buf
}

/// Wrap `query` in `invokeWithLayer(layer, initConnection(app, query))` —
/// the handshake envelope announcing client metadata and the schema layer.
pub fn init_envelope(app: &AppInfo, query: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(64 + query.len());
    buf.extend_from_slice(&INVOKE_WITH_LAYER.to_le_bytes());
    buf.extend_from_slice(&LAYER.to_le_bytes());
    buf.extend_from_slice(&INIT_CONNECTION.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes()); // flags: no proxy, no params
    buf.extend_from_slice(&app.api_id.to_le_bytes());
    write_string(&mut buf, &app.device_model);
    write_string(&mut buf, &app.system_version);
    write_string(&mut buf, &app.app_version);
    write_string(&mut buf, &app.system_lang_code);
    write_string(&mut buf, &app.lang_pack);
    write_string(&mut buf, &app.lang_code);
    buf.extend_from_slice(query);
    buf
}

/// Serialize `msg_container` from `(msg_id, seq_no, body)` triples.
///
/// The inner vector is bare: a count followed by the messages, each laid out
/// as `msg_id:long seqno:int bytes:int body`.
pub fn msg_container(messages: &[(MsgId, i32, &[u8])]) -> Vec<u8> {
    let total: usize = messages.iter().map(|(_, _, b)| 16 + b.len()).sum();
    let mut buf = Vec::with_capacity(8 + total);
    buf.extend_from_slice(&MSG_CONTAINER.to_le_bytes());
    buf.extend_from_slice(&(messages.len() as i32).to_le_bytes());
    for (msg_id, seq_no, body) in messages {
        buf.extend_from_slice(&msg_id.0.to_le_bytes());
        buf.extend_from_slice(&seq_no.to_le_bytes());
        buf.extend_from_slice(&(body.len() as i32).to_le_bytes());
        buf.extend_from_slice(body);
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_encoding_aligns_to_4() {
        for len in 0..=300 {
            let data = vec![0xAB; len];
            let mut buf = Vec::new();
            write_bytes(&mut buf, &data);
            assert_eq!(buf.len() % 4, 0, "unaligned encoding for len {len}");
            if len <= 253 {
                assert_eq!(buf[0] as usize, len);
            } else {
                assert_eq!(buf[0], 0xfe);
                let n = buf[1] as usize | (buf[2] as usize) << 8 | (buf[3] as usize) << 16;
                assert_eq!(n, len);
            }
        }
    }

    #[test]
    fn msgs_ack_layout() {
        let ids = [MsgId(4), MsgId(8), MsgId(12)];
        let buf = msgs_ack(&ids);
        assert_eq!(u32::from_le_bytes(buf[..4].try_into().unwrap()), MSGS_ACK);
        assert_eq!(u32::from_le_bytes(buf[4..8].try_into().unwrap()), VECTOR);
        assert_eq!(i32::from_le_bytes(buf[8..12].try_into().unwrap()), 3);
        assert_eq!(i64::from_le_bytes(buf[12..20].try_into().unwrap()), 4);
        assert_eq!(buf.len(), 12 + 3 * 8);
    }

    #[test]
    fn container_layout() {
        let a = [1u8, 2, 3, 4];
        let b = [5u8, 6, 7, 8];
        let buf = msg_container(&[(MsgId(100), 1, &a[..]), (MsgId(104), 3, &b[..])]);
        assert_eq!(u32::from_le_bytes(buf[..4].try_into().unwrap()), MSG_CONTAINER);
        assert_eq!(i32::from_le_bytes(buf[4..8].try_into().unwrap()), 2);
        // first message header
        assert_eq!(i64::from_le_bytes(buf[8..16].try_into().unwrap()), 100);
        assert_eq!(i32::from_le_bytes(buf[16..20].try_into().unwrap()), 1);
        assert_eq!(i32::from_le_bytes(buf[20..24].try_into().unwrap()), 4);
        assert_eq!(&buf[24..28], &a);
    }

    #[test]
    fn init_envelope_wraps_query() {
        let app = AppInfo::default();
        let query = [0xDEu8, 0xAD, 0xBE, 0xEF];
        let buf = init_envelope(&app, &query);
        assert_eq!(u32::from_le_bytes(buf[..4].try_into().unwrap()), INVOKE_WITH_LAYER);
        assert_eq!(i32::from_le_bytes(buf[4..8].try_into().unwrap()), LAYER);
        assert_eq!(u32::from_le_bytes(buf[8..12].try_into().unwrap()), INIT_CONNECTION);
        assert_eq!(&buf[buf.len() - 4..], &query);
    }

    #[test]
    fn http_wait_field_order() {
        let buf = http_wait();
        assert_eq!(buf.len(), 16);
        assert_eq!(i32::from_le_bytes(buf[4..8].try_into().unwrap()), 0);
        assert_eq!(i32::from_le_bytes(buf[8..12].try_into().unwrap()), 0);
        assert_eq!(i32::from_le_bytes(buf[12..16].try_into().unwrap()), 30_000);
    }
}
