//! Cryptographic primitives for the courier MTProto client.
//!
//! Provides:
//! - AES-256-IGE encryption/decryption
//! - SHA-1 / SHA-256 hash macros
//! - `AuthKey` — 256-byte session key
//! - MTProto 2.0 frame encryption / decryption

#![deny(unsafe_code)]

pub mod aes;
mod auth_key;
mod sha;

pub use auth_key::AuthKey;

// ─── MTProto 2.0 encrypt / decrypt ───────────────────────────────────────────

/// Errors from [`decrypt_frame`] / [`decrypt_client_frame`].
#[derive(Clone, Debug, PartialEq)]
pub enum DecryptError {
    /// Ciphertext too short or not block-aligned.
    InvalidBuffer,
    /// The `auth_key_id` in the ciphertext does not match our key.
    AuthKeyMismatch,
    /// The `msg_key` in the ciphertext does not match our computed value.
    MessageKeyMismatch,
}

impl std::fmt::Display for DecryptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidBuffer => write!(f, "invalid ciphertext buffer length"),
            Self::AuthKeyMismatch => write!(f, "auth_key_id mismatch"),
            Self::MessageKeyMismatch => write!(f, "msg_key mismatch"),
        }
    }
}
impl std::error::Error for DecryptError {}

enum Side { Client, Server }
impl Side {
    fn x(&self) -> usize { match self { Side::Client => 0, Side::Server => 8 } }
}

fn calc_key(auth_key: &AuthKey, msg_key: &[u8; 16], side: Side) -> ([u8; 32], [u8; 32]) {
    let x = side.x();
    let sha_a = sha256!(msg_key, &auth_key.data[x..x + 36]);
    let sha_b = sha256!(&auth_key.data[40 + x..40 + x + 36], msg_key);

    let mut aes_key = [0u8; 32];
    aes_key[..8].copy_from_slice(&sha_a[..8]);
    aes_key[8..24].copy_from_slice(&sha_b[8..24]);
    aes_key[24..].copy_from_slice(&sha_a[24..]);

    let mut aes_iv = [0u8; 32];
    aes_iv[..8].copy_from_slice(&sha_b[..8]);
    aes_iv[8..24].copy_from_slice(&sha_a[8..24]);
    aes_iv[24..].copy_from_slice(&sha_b[24..]);

    (aes_key, aes_iv)
}

/// Padding needed to round `len` up to a 16-byte boundary, with the protocol
/// minimum of 12 bytes (one extra block is added when the plain remainder
/// would fall below it).
fn padding_len(len: usize) -> usize {
    let mut pad = (16 - len % 16) % 16;
    if pad < 12 {
        pad += 16;
    }
    pad
}

/// Encrypt `plaintext` into a wire-ready MTProto 2.0 frame.
///
/// Returns `key_id || msg_key || AES-256-IGE(plaintext || padding)`.
pub fn encrypt_frame(plaintext: &[u8], auth_key: &AuthKey) -> Vec<u8> {
    let mut rnd = [0u8; 32];
    getrandom::getrandom(&mut rnd).expect("getrandom failed");
    do_encrypt_frame(plaintext, auth_key, &rnd)
}

/// Like [`encrypt_frame`] but with injected padding bytes, for deterministic
/// tests. Padding never exceeds 27 bytes, so 32 injected bytes suffice.
pub fn do_encrypt_frame(plaintext: &[u8], auth_key: &AuthKey, rnd: &[u8; 32]) -> Vec<u8> {
    let pad = padding_len(plaintext.len());
    let mut padded = Vec::with_capacity(plaintext.len() + pad);
    padded.extend_from_slice(plaintext);
    padded.extend_from_slice(&rnd[..pad]);

    let x = Side::Client.x();
    let msg_key_large = sha256!(&auth_key.data[88 + x..88 + x + 32], &padded);
    let mut msg_key = [0u8; 16];
    msg_key.copy_from_slice(&msg_key_large[8..24]);

    let (key, iv) = calc_key(auth_key, &msg_key, Side::Client);
    aes::ige_encrypt(&mut padded, &key, &iv);

    let mut frame = Vec::with_capacity(24 + padded.len());
    frame.extend_from_slice(&auth_key.key_id);
    frame.extend_from_slice(&msg_key);
    frame.extend_from_slice(&padded);
    frame
}

fn decrypt_side<'a>(
    frame: &'a mut [u8],
    auth_key: &AuthKey,
    side: Side,
) -> Result<&'a mut [u8], DecryptError> {
    if frame.len() < 24 || (frame.len() - 24) % 16 != 0 {
        return Err(DecryptError::InvalidBuffer);
    }
    if auth_key.key_id != frame[..8] {
        return Err(DecryptError::AuthKeyMismatch);
    }
    let mut msg_key = [0u8; 16];
    msg_key.copy_from_slice(&frame[8..24]);

    let x = side.x();
    let (key, iv) = calc_key(auth_key, &msg_key, side);
    aes::ige_decrypt(&mut frame[24..], &key, &iv);

    let our_key = sha256!(&auth_key.data[88 + x..88 + x + 32], &frame[24..]);
    if msg_key != our_key[8..24] {
        return Err(DecryptError::MessageKeyMismatch);
    }
    Ok(&mut frame[24..])
}

/// Decrypt a frame received *from* the server.
///
/// `frame` must start with `key_id || msg_key || ciphertext`. On success
/// returns a slice of `frame` containing the padded plaintext.
pub fn decrypt_frame<'a>(frame: &'a mut [u8], auth_key: &AuthKey) -> Result<&'a mut [u8], DecryptError> {
    decrypt_side(frame, auth_key, Side::Server)
}

/// Decrypt a frame produced by [`encrypt_frame`] (client direction).
///
/// The read path never needs this; it exists so tests and harnesses can open
/// frames the client itself encrypted.
pub fn decrypt_client_frame<'a>(frame: &'a mut [u8], auth_key: &AuthKey) -> Result<&'a mut [u8], DecryptError> {
    decrypt_side(frame, auth_key, Side::Client)
}
