//! AES-256 in IGE (Infinite Garble Extension) mode, as used by MTProto.
//!
//! IGE chains both the previous plaintext and the previous ciphertext block:
//!
//! ```text
//! c[i] = E(p[i] ^ c[i-1]) ^ p[i-1]        c[0] = iv[0..16], p[0] = iv[16..32]
//! ```
//!
//! The block cipher itself comes from the `aes` crate; only the chaining is
//! implemented here.

use aes::Aes256;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};

/// Encrypt `data` in place. `data.len()` must be a multiple of 16.
pub fn ige_encrypt(data: &mut [u8], key: &[u8; 32], iv: &[u8; 32]) {
    assert_eq!(data.len() % 16, 0, "IGE requires 16-byte aligned input");
    let cipher = Aes256::new(GenericArray::from_slice(key));

    let mut prev_cipher = [0u8; 16];
    let mut prev_plain = [0u8; 16];
    prev_cipher.copy_from_slice(&iv[..16]);
    prev_plain.copy_from_slice(&iv[16..]);

    for block in data.chunks_exact_mut(16) {
        let plain: [u8; 16] = block.try_into().unwrap();
        for (b, p) in block.iter_mut().zip(prev_cipher.iter()) {
            *b ^= p;
        }
        cipher.encrypt_block(GenericArray::from_mut_slice(block));
        for (b, p) in block.iter_mut().zip(prev_plain.iter()) {
            *b ^= p;
        }
        prev_cipher.copy_from_slice(block);
        prev_plain = plain;
    }
}

/// Decrypt `data` in place. `data.len()` must be a multiple of 16.
pub fn ige_decrypt(data: &mut [u8], key: &[u8; 32], iv: &[u8; 32]) {
    assert_eq!(data.len() % 16, 0, "IGE requires 16-byte aligned input");
    let cipher = Aes256::new(GenericArray::from_slice(key));

    let mut prev_cipher = [0u8; 16];
    let mut prev_plain = [0u8; 16];
    prev_cipher.copy_from_slice(&iv[..16]);
    prev_plain.copy_from_slice(&iv[16..]);

    for block in data.chunks_exact_mut(16) {
        let cipher_block: [u8; 16] = block.try_into().unwrap();
        for (b, p) in block.iter_mut().zip(prev_plain.iter()) {
            *b ^= p;
        }
        cipher.decrypt_block(GenericArray::from_mut_slice(block));
        for (b, p) in block.iter_mut().zip(prev_cipher.iter()) {
            *b ^= p;
        }
        prev_plain.copy_from_slice(block);
        prev_cipher = cipher_block;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let key = [7u8; 32];
        let iv = [3u8; 32];
        let original: Vec<u8> = (0..64u8).collect();
        let mut data = original.clone();

        ige_encrypt(&mut data, &key, &iv);
        assert_ne!(data, original);
        ige_decrypt(&mut data, &key, &iv);
        assert_eq!(data, original);
    }

    #[test]
    fn chaining_differs_per_block() {
        // Two identical plaintext blocks must not produce identical
        // ciphertext blocks (that is the point of the chaining).
        let key = [1u8; 32];
        let iv = [2u8; 32];
        let mut data = [0xAAu8; 32];
        ige_encrypt(&mut data, &key, &iv);
        assert_ne!(data[..16], data[16..]);
    }
}
