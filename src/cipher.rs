// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Calldata Ciphers
//!
//! The uniform encrypt/decrypt capability behind every confidential call.
//! Three interchangeable strategies:
//!
//! - **Plain**: identity transform for intentionally public calls
//! - **X25519DeoxysII**: ephemeral X25519 key agreement with the runtime's
//!   calldata public key, HMAC-derived box key, Deoxys-II-256-128 AEAD
//! - **Mock**: identity transform with a fixed nonce, for asserting
//!   calldata shape in tests without real cryptography
//!
//! A cipher's symmetric key is fixed at construction and lives until the
//! session drops it (e.g. because the runtime rotated to a new key epoch).
//! Nonces are random per encryption, so concurrent encrypt calls are
//! independent and unordered.

use rand::{rngs::OsRng, RngCore};
use serde_bytes::ByteBuf;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::envelope::{
    self, AeadBox, CallResult, EncryptedBody, Envelope, EnvelopeBody, Failure, InnerCallData,
    OkValue, FORMAT_ENCRYPTED_X25519_DEOXYSII, FORMAT_MOCK,
};
use crate::error::{Error, Result};
use crate::mrae::{curve25519, deoxysii};

/// Discriminant tag identifying a cipher strategy on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    /// Identity transform; calldata travels in the clear.
    Plain,
    /// X25519 key agreement + Deoxys-II-256-128.
    X25519DeoxysII,
    /// Test-only deterministic mock.
    Mock,
}

impl Kind {
    /// The envelope `format` value for this kind, when one is emitted.
    pub fn format(&self) -> u64 {
        match self {
            Kind::Plain => envelope::FORMAT_PLAIN,
            Kind::X25519DeoxysII => FORMAT_ENCRYPTED_X25519_DEOXYSII,
            Kind::Mock => FORMAT_MOCK,
        }
    }
}

/// The X25519 + Deoxys-II calldata cipher.
///
/// Holds only the derived symmetric key and the local ephemeral public
/// key; the local secret is dropped inside the constructor. The symmetric
/// key is zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct X25519DeoxysII {
    #[zeroize(skip)]
    public_key: [u8; 32],
    key: [u8; deoxysii::KEY_SIZE],
}

impl X25519DeoxysII {
    /// Construct with a fresh random local keypair bound to `peer_public`.
    pub fn ephemeral(peer_public: &[u8; 32]) -> Self {
        let mut secret = [0u8; 32];
        OsRng.fill_bytes(&mut secret);
        let cipher = Self::from_secret_key(&secret, peer_public);
        secret.zeroize();
        cipher
    }

    /// Deterministic construction from a caller-supplied secret key.
    pub fn from_secret_key(secret: &[u8; 32], peer_public: &[u8; 32]) -> Self {
        X25519DeoxysII {
            public_key: curve25519::scalar_mult_base(secret),
            key: deoxysii::derive_symmetric_key(peer_public, secret),
        }
    }

    /// The local ephemeral public key sent alongside ciphertexts.
    pub fn public_key(&self) -> &[u8; 32] {
        &self.public_key
    }

    #[cfg(test)]
    pub(crate) fn symmetric_key(&self) -> &[u8; 32] {
        &self.key
    }
}

impl std::fmt::Debug for X25519DeoxysII {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the symmetric key.
        f.debug_struct("X25519DeoxysII")
            .field("public_key", &hex::encode(self.public_key))
            .finish_non_exhaustive()
    }
}

/// Fixed nonce used by the mock cipher.
pub const MOCK_NONCE: [u8; deoxysii::NONCE_SIZE] = [0xde; deoxysii::NONCE_SIZE];

/// Polymorphic calldata cipher.
#[derive(Clone, Debug)]
pub enum Cipher {
    /// Identity transform for intentionally public calls.
    Plain,
    /// The real thing.
    X25519DeoxysII(X25519DeoxysII),
    /// Deterministic test cipher.
    Mock,
}

impl Cipher {
    /// Construct an ephemeral X25519+Deoxys-II cipher for `peer_public`.
    pub fn ephemeral_x25519_deoxysii(peer_public: &[u8; 32]) -> Self {
        Cipher::X25519DeoxysII(X25519DeoxysII::ephemeral(peer_public))
    }

    /// This cipher's discriminant.
    pub fn kind(&self) -> Kind {
        match self {
            Cipher::Plain => Kind::Plain,
            Cipher::X25519DeoxysII(_) => Kind::X25519DeoxysII,
            Cipher::Mock => Kind::Mock,
        }
    }

    /// The ephemeral local public key; empty for Plain and Mock.
    pub fn public_key(&self) -> &[u8] {
        match self {
            Cipher::X25519DeoxysII(c) => c.public_key(),
            _ => &[],
        }
    }

    /// Encrypt raw bytes, returning `(ciphertext, nonce)`.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<(Vec<u8>, [u8; deoxysii::NONCE_SIZE])> {
        match self {
            Cipher::Plain => Ok((plaintext.to_vec(), [0u8; deoxysii::NONCE_SIZE])),
            Cipher::X25519DeoxysII(c) => {
                let mut nonce = [0u8; deoxysii::NONCE_SIZE];
                OsRng.fill_bytes(&mut nonce);
                let ciphertext = deoxysii::seal(&c.key, &nonce, plaintext, b"")?;
                Ok((ciphertext, nonce))
            }
            Cipher::Mock => Ok((plaintext.to_vec(), MOCK_NONCE)),
        }
    }

    /// Decrypt raw bytes produced by [`Cipher::encrypt`].
    pub fn decrypt(&self, nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        match self {
            Cipher::Plain => Ok(ciphertext.to_vec()),
            Cipher::X25519DeoxysII(c) => deoxysii::open_checked(&c.key, nonce, ciphertext, b""),
            Cipher::Mock => {
                if nonce != MOCK_NONCE {
                    return Err(Error::MockNonceMismatch(hex::encode(nonce)));
                }
                Ok(ciphertext.to_vec())
            }
        }
    }

    /// Encrypt calldata with the inner `{body}` CBOR wrap applied first.
    pub fn encrypt_call_data(
        &self,
        plaintext: &[u8],
    ) -> Result<(Vec<u8>, [u8; deoxysii::NONCE_SIZE])> {
        let inner = envelope::to_vec(&InnerCallData {
            body: ByteBuf::from(plaintext.to_vec()),
        })?;
        self.encrypt(&inner)
    }

    /// Inverse of [`Cipher::encrypt_call_data`].
    pub fn decrypt_call_data(&self, nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        let plaintext = self.decrypt(nonce, ciphertext)?;
        let inner: InnerCallData = envelope::from_slice(&plaintext)?;
        Ok(inner.body.into_vec())
    }

    /// Build the outer calldata envelope.
    ///
    /// Returns `None` for empty plaintext: balance-only transfers carry no
    /// confidential payload and must stay envelope-free. Plain ciphers
    /// omit the `format` tag for compatibility with non-confidential
    /// receivers.
    pub fn encrypt_envelope(&self, plaintext: &[u8]) -> Result<Option<Envelope>> {
        if plaintext.is_empty() {
            return Ok(None);
        }
        let envelope = match self {
            Cipher::Plain => Envelope {
                format: None,
                body: EnvelopeBody::Plain(ByteBuf::from(plaintext.to_vec())),
            },
            Cipher::X25519DeoxysII(c) => {
                let (data, nonce) = self.encrypt_call_data(plaintext)?;
                Envelope {
                    format: Some(self.kind().format()),
                    body: EnvelopeBody::Encrypted(EncryptedBody {
                        pk: Some(ByteBuf::from(c.public_key().to_vec())),
                        nonce: ByteBuf::from(nonce.to_vec()),
                        data: ByteBuf::from(data),
                    }),
                }
            }
            Cipher::Mock => {
                let (data, nonce) = self.encrypt_call_data(plaintext)?;
                Envelope {
                    format: Some(self.kind().format()),
                    body: EnvelopeBody::Encrypted(EncryptedBody {
                        pk: None,
                        nonce: ByteBuf::from(nonce.to_vec()),
                        data: ByteBuf::from(data),
                    }),
                }
            }
        };
        Ok(Some(envelope))
    }

    /// Envelope + CBOR + hex in one step; the shape calldata takes on the
    /// JSON-RPC wire. Empty plaintext yields the empty string.
    pub fn encrypt_encode(&self, plaintext: &[u8]) -> Result<String> {
        match self.encrypt_envelope(plaintext)? {
            None => Ok(String::new()),
            Some(env) => Ok(format!("0x{}", hex::encode(envelope::to_vec(&env)?))),
        }
    }

    /// Decode a hex-encoded CBOR envelope and decrypt its body.
    pub fn decrypt_encoded(&self, data: &str) -> Result<Vec<u8>> {
        let raw = hex::decode(data.trim_start_matches("0x")).map_err(|source| Error::Hex {
            field: "data",
            source,
        })?;
        let env: Envelope = envelope::from_slice(&raw)
            .map_err(|_| Error::malformed_envelope("not a CBOR call envelope", &raw))?;
        match env.body {
            EnvelopeBody::Plain(bytes) => Ok(bytes.into_vec()),
            EnvelopeBody::Encrypted(body) => self.decrypt_call_data(&body.nonce, &body.data),
        }
    }

    /// Wrap a call result the way the runtime does: plain for Plain,
    /// AEAD-boxed under `unknown` otherwise. Used by test harnesses that
    /// stand in for the runtime.
    pub fn encrypt_call_result(&self, result: &CallResult) -> Result<Vec<u8>> {
        match self {
            Cipher::Plain => envelope::to_vec(result),
            _ => {
                let inner = envelope::to_vec(result)?;
                let (data, nonce) = self.encrypt(&inner)?;
                envelope::to_vec(&CallResult {
                    unknown: Some(AeadBox {
                        nonce: ByteBuf::from(nonce.to_vec()),
                        data: ByteBuf::from(data),
                    }),
                    ..Default::default()
                })
            }
        }
    }

    /// Decode and decrypt a call result, surfacing runtime failures.
    ///
    /// `fail` becomes [`Error::CallFailed`]; `ok` is returned directly or
    /// unboxed; `unknown` is decrypted and re-interpreted. Anything else
    /// is [`Error::UnexpectedCallResult`].
    pub fn decrypt_call_result(&self, raw: &[u8]) -> Result<Vec<u8>> {
        let result: CallResult = envelope::from_slice(raw)
            .map_err(|_| Error::malformed_envelope("not a CBOR call result", raw))?;
        if let Some(failure) = result.fail {
            return Err(failure_to_error(failure));
        }
        if let Some(ok) = result.ok {
            return match ok {
                OkValue::Bytes(bytes) => Ok(bytes.into_vec()),
                OkValue::Text(text) => Ok(text.into_bytes()),
                OkValue::Enveloped(aead_box) => self.open_result_box(&aead_box),
            };
        }
        if let Some(aead_box) = result.unknown {
            return self.open_result_box(&aead_box);
        }
        Err(Error::UnexpectedCallResult)
    }

    fn open_result_box(&self, aead_box: &AeadBox) -> Result<Vec<u8>> {
        let plaintext = self.decrypt(&aead_box.nonce, &aead_box.data)?;
        let inner: CallResult =
            envelope::from_slice(&plaintext).map_err(|_| Error::UnexpectedCallResult)?;
        if let Some(failure) = inner.fail {
            return Err(failure_to_error(failure));
        }
        match inner.ok {
            Some(OkValue::Bytes(bytes)) => Ok(bytes.into_vec()),
            Some(OkValue::Text(text)) => Ok(text.into_bytes()),
            _ => Err(Error::UnexpectedCallResult),
        }
    }
}

fn failure_to_error(failure: Failure) -> Error {
    Error::CallFailed {
        module: failure.module,
        code: failure.code,
        message: failure.message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex32(s: &str) -> [u8; 32] {
        let v = hex::decode(s).unwrap();
        v.try_into().unwrap()
    }

    #[test]
    fn test_key_derivation_fixed_vector() {
        let secret = hex32("c07b151fbc1e7a11dff926111188f8d872f62eba0396da97c0a24adb75161750");
        let public = hex32("3046db3fa70ce605457dc47c48837ebd8bd0a26abfde5994d033e1ced68e2576");
        let cipher = X25519DeoxysII::from_secret_key(&secret, &public);
        assert_eq!(cipher.public_key(), &public);
        assert_eq!(
            cipher.symmetric_key(),
            &hex32("e69ac21066a8c2284e8fdc690e579af4513547b9b31dd144792c1904b45cf586")
        );
    }

    #[test]
    fn test_kind_maps_to_wire_format() {
        assert_eq!(Kind::Plain.format(), envelope::FORMAT_PLAIN);
        assert_eq!(Kind::X25519DeoxysII.format(), FORMAT_ENCRYPTED_X25519_DEOXYSII);
        assert_eq!(Kind::Mock.format(), FORMAT_MOCK);
    }

    #[test]
    fn test_mock_envelope_carries_mock_format() {
        let env = Cipher::Mock.encrypt_envelope(b"x").unwrap().unwrap();
        assert_eq!(env.format, Some(FORMAT_MOCK));
    }

    #[test]
    fn test_round_trip_all_ciphers() {
        let peer_secret = [3u8; 32];
        let peer_public = curve25519::scalar_mult_base(&peer_secret);
        let ciphers = [
            Cipher::Plain,
            Cipher::ephemeral_x25519_deoxysii(&peer_public),
            Cipher::Mock,
        ];
        for cipher in &ciphers {
            for plaintext in [&b""[..], &[1, 2, 3, 4, 5][..], &[0u8; 1024][..]] {
                let (ciphertext, nonce) = cipher.encrypt(plaintext).unwrap();
                assert_eq!(cipher.decrypt(&nonce, &ciphertext).unwrap(), plaintext);
            }
        }
    }

    #[test]
    fn test_end_to_end_ephemeral_session() {
        let peer_secret = [7u8; 32];
        let peer_public = curve25519::scalar_mult_base(&peer_secret);
        let cipher = Cipher::ephemeral_x25519_deoxysii(&peer_public);

        let plaintext = [1u8, 2, 3, 4, 5];
        let (ciphertext, nonce) = cipher.encrypt(&plaintext).unwrap();
        assert_eq!(ciphertext.len(), plaintext.len() + deoxysii::TAG_SIZE);
        assert_eq!(cipher.decrypt(&nonce, &ciphertext).unwrap(), plaintext);

        // A cipher from a different ephemeral keypair cannot decrypt.
        let other = Cipher::ephemeral_x25519_deoxysii(&peer_public);
        assert!(other.decrypt(&nonce, &ciphertext).is_err());
    }

    #[test]
    fn test_encrypt_envelope_empty_plaintext() {
        for cipher in [Cipher::Plain, Cipher::Mock] {
            assert!(cipher.encrypt_envelope(b"").unwrap().is_none());
            assert_eq!(cipher.encrypt_encode(b"").unwrap(), "");
        }
    }

    #[test]
    fn test_plain_envelope_has_no_format() {
        let env = Cipher::Plain.encrypt_envelope(&[9, 9]).unwrap().unwrap();
        assert_eq!(env.format, None);
        assert!(matches!(env.body, EnvelopeBody::Plain(ref b) if b.as_ref() == [9u8, 9]));
    }

    #[test]
    fn test_encrypt_encode_decrypt_encoded_round_trip() {
        let peer_public = curve25519::scalar_mult_base(&[11u8; 32]);
        let cipher = Cipher::ephemeral_x25519_deoxysii(&peer_public);
        let encoded = cipher.encrypt_encode(b"calldata").unwrap();
        assert!(encoded.starts_with("0x"));
        assert_eq!(cipher.decrypt_encoded(&encoded).unwrap(), b"calldata");
    }

    #[test]
    fn test_envelope_carries_ephemeral_public_key() {
        let peer_public = curve25519::scalar_mult_base(&[13u8; 32]);
        let cipher = Cipher::ephemeral_x25519_deoxysii(&peer_public);
        let env = cipher.encrypt_envelope(b"x").unwrap().unwrap();
        assert_eq!(env.format, Some(FORMAT_ENCRYPTED_X25519_DEOXYSII));
        match env.body {
            EnvelopeBody::Encrypted(body) => {
                assert_eq!(body.pk.unwrap().as_ref(), cipher.public_key());
                assert_eq!(body.nonce.len(), deoxysii::NONCE_SIZE);
            }
            EnvelopeBody::Plain(_) => panic!("expected encrypted body"),
        }
    }

    #[test]
    fn test_mock_rejects_unexpected_nonce() {
        let err = Cipher::Mock.decrypt(&[0u8; 15], b"data").unwrap_err();
        assert!(matches!(err, Error::MockNonceMismatch(_)));
    }

    #[test]
    fn test_call_result_fail_surfaces_as_error() {
        let raw = envelope::to_vec(&CallResult {
            fail: Some(Failure {
                module: "evm".to_string(),
                code: 8,
                message: Some("reverted".to_string()),
            }),
            ..Default::default()
        })
        .unwrap();
        let err = Cipher::Plain.decrypt_call_result(&raw).unwrap_err();
        assert!(matches!(err, Error::CallFailed { code: 8, .. }));
    }

    #[test]
    fn test_call_result_unknown_round_trip() {
        let peer_public = curve25519::scalar_mult_base(&[17u8; 32]);
        let cipher = Cipher::ephemeral_x25519_deoxysii(&peer_public);
        let wrapped = cipher
            .encrypt_call_result(&CallResult {
                ok: Some(OkValue::Bytes(ByteBuf::from(vec![0xca, 0xfe]))),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(cipher.decrypt_call_result(&wrapped).unwrap(), [0xca, 0xfe]);
    }

    #[test]
    fn test_call_result_empty_shape_is_unexpected() {
        let raw = envelope::to_vec(&CallResult::default()).unwrap();
        let err = Cipher::Plain.decrypt_call_result(&raw).unwrap_err();
        assert!(matches!(err, Error::UnexpectedCallResult));
    }

    #[test]
    fn test_call_data_wrap_round_trip() {
        let peer_public = curve25519::scalar_mult_base(&[19u8; 32]);
        let cipher = Cipher::ephemeral_x25519_deoxysii(&peer_public);
        let (data, nonce) = cipher.encrypt_call_data(b"inner calldata").unwrap();
        assert_eq!(
            cipher.decrypt_call_data(&nonce, &data).unwrap(),
            b"inner calldata"
        );
    }
}
