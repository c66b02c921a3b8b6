//! Plaintext envelope construction and frame encryption.
//!
//! Layout of the encrypted envelope before padding:
//!
//! ```text
//! salt:       i64
//! session_id: i64
//! msg_id:     i64
//! seq_no:     i32
//! body_len:   i32
//! body:       [u8; body_len]
//! ```

use courier_crypto::AuthKey;

use crate::message::MsgId;

/// Errors from [`open_frame`] / [`open_client_frame`].
#[derive(Debug)]
pub enum OpenError {
    /// The underlying crypto layer rejected the frame.
    Crypto(courier_crypto::DecryptError),
    /// The decrypted plaintext was too short to contain a valid envelope.
    FrameTooShort,
    /// Session-ID mismatch (possible replay or wrong connection).
    SessionMismatch,
}

impl std::fmt::Display for OpenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Crypto(e) => write!(f, "crypto: {e}"),
            Self::FrameTooShort => write!(f, "inner plaintext too short"),
            Self::SessionMismatch => write!(f, "session_id mismatch"),
        }
    }
}
impl std::error::Error for OpenError {}

/// The envelope extracted from a successfully decrypted frame.
pub struct OpenedFrame {
    /// Server salt from the envelope.
    pub salt: i64,
    /// Session identifier from the envelope.
    pub session_id: i64,
    /// Identifier of the top-level message.
    pub msg_id: MsgId,
    /// Sequence number of the top-level message.
    pub seq_no: i32,
    /// TL-serialized body (a container or a single message).
    pub body: Vec<u8>,
}

/// Build the plaintext envelope around `payload`.
pub fn build_envelope(
    salt: i64,
    session_id: i64,
    msg_id: MsgId,
    seq_no: i32,
    payload: &[u8],
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32 + payload.len());
    buf.extend_from_slice(&salt.to_le_bytes());
    buf.extend_from_slice(&session_id.to_le_bytes());
    buf.extend_from_slice(&msg_id.0.to_le_bytes());
    buf.extend_from_slice(&seq_no.to_le_bytes());
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Build and encrypt the envelope into a wire-ready frame.
pub fn encrypt_envelope(
    auth_key: &AuthKey,
    salt: i64,
    session_id: i64,
    msg_id: MsgId,
    seq_no: i32,
    payload: &[u8],
) -> Vec<u8> {
    let plaintext = build_envelope(salt, session_id, msg_id, seq_no, payload);
    courier_crypto::encrypt_frame(&plaintext, auth_key)
}

fn parse_envelope(plaintext: &[u8], expect_session: Option<i64>) -> Result<OpenedFrame, OpenError> {
    if plaintext.len() < 32 {
        return Err(OpenError::FrameTooShort);
    }
    let salt = i64::from_le_bytes(plaintext[..8].try_into().unwrap());
    let session_id = i64::from_le_bytes(plaintext[8..16].try_into().unwrap());
    let msg_id = i64::from_le_bytes(plaintext[16..24].try_into().unwrap());
    let seq_no = i32::from_le_bytes(plaintext[24..28].try_into().unwrap());
    let body_len = u32::from_le_bytes(plaintext[28..32].try_into().unwrap()) as usize;

    if let Some(expected) = expect_session
        && session_id != expected
    {
        return Err(OpenError::SessionMismatch);
    }

    let body = plaintext[32..32 + body_len.min(plaintext.len() - 32)].to_vec();
    Ok(OpenedFrame { salt, session_id, msg_id: MsgId(msg_id), seq_no, body })
}

/// Decrypt and parse a frame received from the server.
pub fn open_frame(
    frame: &mut [u8],
    auth_key: &AuthKey,
    expect_session: Option<i64>,
) -> Result<OpenedFrame, OpenError> {
    let plaintext = courier_crypto::decrypt_frame(frame, auth_key).map_err(OpenError::Crypto)?;
    parse_envelope(plaintext, expect_session)
}

/// Decrypt and parse a frame this client produced (test harnesses).
pub fn open_client_frame(
    frame: &mut [u8],
    auth_key: &AuthKey,
    expect_session: Option<i64>,
) -> Result<OpenedFrame, OpenError> {
    let plaintext =
        courier_crypto::decrypt_client_frame(frame, auth_key).map_err(OpenError::Crypto)?;
    parse_envelope(plaintext, expect_session)
}

// ─── Unencrypted framing ─────────────────────────────────────────────────────

/// Frame an unencrypted message:
/// `8 zero bytes || msg_id || len:u32 || body || random pad`.
///
/// The pad length is the 16-alignment remainder plus a random number of
/// whole 16-byte blocks (0..16).
pub fn plain_frame(msg_id: MsgId, body: &[u8]) -> Vec<u8> {
    let mut rnd = [0u8; 1];
    getrandom::getrandom(&mut rnd).expect("getrandom failed");
    plain_frame_with(msg_id, body, rnd[0] % 16)
}

/// Like [`plain_frame`] with an injected block count, for deterministic tests.
pub fn plain_frame_with(msg_id: MsgId, body: &[u8], extra_blocks: u8) -> Vec<u8> {
    let pad_len = (body.len().wrapping_neg() & 15) + 16 * (extra_blocks as usize);
    let mut pad = vec![0u8; pad_len];
    if pad_len > 0 {
        getrandom::getrandom(&mut pad).expect("getrandom failed");
    }

    let mut buf = Vec::with_capacity(20 + body.len() + pad_len);
    buf.extend_from_slice(&[0u8; 8]); // auth_key_id = 0
    buf.extend_from_slice(&msg_id.0.to_le_bytes());
    buf.extend_from_slice(&(body.len() as u32).to_le_bytes());
    buf.extend_from_slice(body);
    buf.extend_from_slice(&pad);
    buf
}

/// Parse an unencrypted frame back into `(msg_id, body)` (test harnesses).
pub fn parse_plain_frame(frame: &[u8]) -> Option<(MsgId, Vec<u8>)> {
    if frame.len() < 20 || frame[..8] != [0u8; 8] {
        return None;
    }
    let msg_id = i64::from_le_bytes(frame[8..16].try_into().unwrap());
    let len = u32::from_le_bytes(frame[16..20].try_into().unwrap()) as usize;
    if frame.len() < 20 + len {
        return None;
    }
    Some((MsgId(msg_id), frame[20..20 + len].to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> AuthKey {
        AuthKey::from_bytes(std::array::from_fn(|i| i as u8))
    }

    #[test]
    fn envelope_round_trip() {
        let key = test_key();
        let body = b"the quick brown fox";
        let mut frame = encrypt_envelope(&key, 7, 42, MsgId(1024), 3, body);
        let opened = open_client_frame(&mut frame, &key, Some(42)).unwrap();
        assert_eq!(opened.salt, 7);
        assert_eq!(opened.session_id, 42);
        assert_eq!(opened.msg_id, MsgId(1024));
        assert_eq!(opened.seq_no, 3);
        assert_eq!(opened.body, body);
    }

    #[test]
    fn session_mismatch_rejected() {
        let key = test_key();
        let mut frame = encrypt_envelope(&key, 0, 42, MsgId(4), 1, b"x");
        assert!(matches!(
            open_client_frame(&mut frame, &key, Some(43)),
            Err(OpenError::SessionMismatch)
        ));
    }

    #[test]
    fn plain_frame_layout() {
        for extra in 0..16u8 {
            let body = [1u8, 2, 3];
            let frame = plain_frame_with(MsgId(256), &body, extra);
            // Padded length: 13 to align 3 to 16, plus whole blocks.
            assert_eq!(frame.len(), 20 + 3 + 13 + 16 * extra as usize);
            let (id, parsed) = parse_plain_frame(&frame).unwrap();
            assert_eq!(id, MsgId(256));
            assert_eq!(parsed, body);
        }
    }
}
