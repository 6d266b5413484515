// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Deoxys-II-256-128 AEAD and MRAE Box Key Derivation
//!
//! The confidential runtime's calldata cipher: Deoxys-II with a 256-bit
//! key, 15-byte nonce, and 128-bit authentication tag. The symmetric key
//! comes from an X25519 shared secret passed through a domain-separated
//! HMAC (SHA-512/256 keyed with the fixed context string), which removes
//! ECDH-output bias before the secret is used as an AEAD key.
//!
//! Callers must never reuse a (key, nonce) pair for two plaintexts; the
//! cipher layer upholds that by drawing a fresh random nonce per
//! encryption.

use deoxys::{
    aead::{generic_array::GenericArray, Aead, KeyInit, Payload},
    DeoxysII256,
};
use hmac::{Hmac, Mac};
use sha2::Sha512_256;

use crate::error::{Error, Result};
use crate::mrae::curve25519::scalar_mult;

/// Symmetric key size in bytes (256 bits).
pub const KEY_SIZE: usize = 32;
/// Nonce size in bytes.
pub const NONCE_SIZE: usize = 15;
/// Authentication tag size in bytes (128 bits).
pub const TAG_SIZE: usize = 16;

/// Domain-separation tweak for the box key derivation.
const BOX_KDF_TWEAK: &[u8] = b"MRAE_Box_Deoxys-II-256-128";

/// Derive the Deoxys-II symmetric key for a (secret, peer public) pair.
///
/// `key = HMAC-SHA512/256(key = "MRAE_Box_Deoxys-II-256-128",
/// msg = X25519(secret, peer_public))`. Deterministic: the same inputs
/// always derive the same key.
pub fn derive_symmetric_key(peer_public: &[u8; 32], secret: &[u8; 32]) -> [u8; 32] {
    let shared = scalar_mult(secret, peer_public);
    let mut kdf = <Hmac<Sha512_256> as Mac>::new_from_slice(BOX_KDF_TWEAK)
        .expect("HMAC accepts any key length");
    kdf.update(&shared);
    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&kdf.finalize().into_bytes());
    key
}

/// Encrypt and authenticate `plaintext`, returning `ciphertext || tag`.
pub fn seal(key: &[u8; KEY_SIZE], nonce: &[u8; NONCE_SIZE], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let cipher = DeoxysII256::new(GenericArray::from_slice(key));
    cipher
        .encrypt(
            GenericArray::from_slice(nonce),
            Payload { msg: plaintext, aad },
        )
        .map_err(|_| Error::AuthenticationFailed)
}

/// Decrypt and verify `ciphertext || tag`; fails on any tag mismatch.
pub fn open(key: &[u8; KEY_SIZE], nonce: &[u8; NONCE_SIZE], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let cipher = DeoxysII256::new(GenericArray::from_slice(key));
    cipher
        .decrypt(
            GenericArray::from_slice(nonce),
            Payload { msg: ciphertext, aad },
        )
        .map_err(|_| Error::AuthenticationFailed)
}

/// Slice-validating variant of [`open`] for wire-sourced nonces.
pub fn open_checked(key: &[u8; KEY_SIZE], nonce: &[u8], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let nonce: &[u8; NONCE_SIZE] = nonce.try_into().map_err(|_| Error::InvalidLength {
        kind: "nonce",
        expected: NONCE_SIZE,
        actual: nonce.len(),
    })?;
    open(key, nonce, ciphertext, aad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::OsRng, RngCore};

    #[test]
    fn test_seal_open_round_trip() {
        let mut key = [0u8; KEY_SIZE];
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut key);
        OsRng.fill_bytes(&mut nonce);

        let plaintext = b"confidential call";
        let sealed = seal(&key, &nonce, plaintext, b"").unwrap();
        assert_eq!(sealed.len(), plaintext.len() + TAG_SIZE);

        let opened = open(&key, &nonce, &sealed, b"").unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn test_empty_plaintext_round_trip() {
        let key = [7u8; KEY_SIZE];
        let nonce = [9u8; NONCE_SIZE];
        let sealed = seal(&key, &nonce, b"", b"").unwrap();
        assert_eq!(sealed.len(), TAG_SIZE);
        assert_eq!(open(&key, &nonce, &sealed, b"").unwrap(), b"");
    }

    #[test]
    fn test_open_rejects_wrong_key() {
        let key = [1u8; KEY_SIZE];
        let nonce = [2u8; NONCE_SIZE];
        let sealed = seal(&key, &nonce, b"data", b"").unwrap();

        let mut wrong_key = key;
        wrong_key[0] ^= 1;
        assert!(matches!(
            open(&wrong_key, &nonce, &sealed, b"").unwrap_err(),
            Error::AuthenticationFailed
        ));
    }

    #[test]
    fn test_open_rejects_wrong_nonce() {
        let key = [1u8; KEY_SIZE];
        let nonce = [2u8; NONCE_SIZE];
        let sealed = seal(&key, &nonce, b"data", b"").unwrap();

        let mut wrong_nonce = nonce;
        wrong_nonce[14] ^= 1;
        assert!(open(&key, &wrong_nonce, &sealed, b"").is_err());
    }

    #[test]
    fn test_open_rejects_truncated_tag() {
        let key = [1u8; KEY_SIZE];
        let nonce = [2u8; NONCE_SIZE];
        let sealed = seal(&key, &nonce, b"data", b"").unwrap();
        assert!(open(&key, &nonce, &sealed[..sealed.len() - 1], b"").is_err());
    }

    #[test]
    fn test_open_rejects_altered_ciphertext() {
        let key = [1u8; KEY_SIZE];
        let nonce = [2u8; NONCE_SIZE];
        let mut sealed = seal(&key, &nonce, b"data", b"").unwrap();
        sealed[0] ^= 0x80;
        assert!(open(&key, &nonce, &sealed, b"").is_err());
    }

    #[test]
    fn test_open_rejects_wrong_aad() {
        let key = [1u8; KEY_SIZE];
        let nonce = [2u8; NONCE_SIZE];
        let sealed = seal(&key, &nonce, b"data", b"aad-1").unwrap();
        assert!(open(&key, &nonce, &sealed, b"aad-2").is_err());
    }

    #[test]
    fn test_open_checked_validates_nonce_length() {
        let key = [0u8; KEY_SIZE];
        let err = open_checked(&key, &[0u8; 12], b"", b"").unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidLength { kind: "nonce", expected: 15, actual: 12 }
        ));
    }

    #[test]
    fn test_key_derivation_is_deterministic() {
        let secret = [0x42u8; 32];
        let peer = crate::mrae::curve25519::scalar_mult_base(&[0x17u8; 32]);
        assert_eq!(
            derive_symmetric_key(&peer, &secret),
            derive_symmetric_key(&peer, &secret)
        );
    }
}
