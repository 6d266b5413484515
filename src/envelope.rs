// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Envelope Wire Codec
//!
//! Canonical CBOR encoding of the calldata envelope and the call-result
//! wrapper. The envelope is a map `{format?, body}` where `body` is either
//! raw bytes (plaintext calls) or `{pk?, nonce, data}` (encrypted calls);
//! an absent or zero `format` means plaintext. Call results carry exactly
//! one of `ok` / `fail` / `unknown`.
//!
//! Unknown top-level envelope keys invalidate the envelope: a pre-built
//! envelope that fails [`envelope_format_ok`] must be treated as ordinary
//! calldata and re-wrapped, never trusted as-is.

use ciborium::value::Value;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_bytes::ByteBuf;

use crate::error::{Error, Result};

/// Format tag for plaintext bodies (also expressed by omitting `format`).
pub const FORMAT_PLAIN: u64 = 0;
/// Format tag for X25519 + Deoxys-II encrypted bodies.
pub const FORMAT_ENCRYPTED_X25519_DEOXYSII: u64 = 1;
/// Sentinel format used by the mock cipher in tests. Receivers treat it as
/// unknown-but-structurally-valid.
pub const FORMAT_MOCK: u64 = 9999;

/// The outer calldata envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Envelope {
    /// Cipher kind tag; absent or 0 means plaintext.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<u64>,
    /// Plaintext bytes or the encrypted body struct.
    pub body: EnvelopeBody,
}

/// Envelope body: raw bytes for plaintext, a struct for encrypted calls.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvelopeBody {
    /// `{pk?, nonce, data}` for encrypted calls.
    Encrypted(EncryptedBody),
    /// Raw plaintext calldata.
    Plain(ByteBuf),
}

/// Encrypted envelope body. `pk` is the sender's ephemeral public key; it
/// may be omitted when implicit from context (e.g. inside signed queries).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncryptedBody {
    /// Ephemeral X25519 public key of the sender (32 bytes).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pk: Option<ByteBuf>,
    /// AEAD nonce (15 bytes).
    pub nonce: ByteBuf,
    /// Ciphertext with trailing authentication tag.
    pub data: ByteBuf,
}

/// A nonce/ciphertext pair, as found in `unknown` results and AEAD-wrapped
/// `ok` values.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AeadBox {
    /// AEAD nonce (15 bytes).
    pub nonce: ByteBuf,
    /// Ciphertext with trailing authentication tag.
    pub data: ByteBuf,
}

/// Inner calldata wrapper encrypted by the cipher layer: `{body: bytes}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InnerCallData {
    /// The actual calldata.
    pub body: ByteBuf,
}

/// Result of a confidential call. Exactly one variant is populated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct CallResult {
    /// Success payload, plain or AEAD-wrapped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ok: Option<OkValue>,
    /// Confidentiality-preserving revert representation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail: Option<Failure>,
    /// AEAD-wrapped result the caller must attempt to decrypt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unknown: Option<AeadBox>,
}

/// Success payload shapes seen on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OkValue {
    /// Raw result bytes.
    Bytes(ByteBuf),
    /// Result rendered as text by the transport.
    Text(String),
    /// AEAD-wrapped result.
    Enveloped(AeadBox),
}

/// Module/code/message triple reported by the runtime on failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// Runtime module reporting the failure.
    pub module: String,
    /// Module-specific error code.
    pub code: u64,
    /// Optional human-readable message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// CBOR-encode a wire value.
pub fn to_vec<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| Error::Encode(e.to_string()))?;
    Ok(buf)
}

/// Decode a wire value from CBOR bytes.
pub fn from_slice<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    ciborium::from_reader(data).map_err(|e| Error::Decode(e.to_string()))
}

/// Structural validation of a candidate pre-built envelope.
///
/// Accepts iff the bytes decode to a CBOR map with no keys beyond
/// `format`/`body`, a `body` is present, and — when `format` names a
/// cipher other than plain — the body has the encrypted-struct shape with
/// byte-like `data`. Gates whether calldata arriving already enveloped
/// (e.g. via `sendRawTransaction`) can be forwarded untouched.
pub fn envelope_format_ok(raw: &[u8]) -> bool {
    let value: Value = match ciborium::from_reader(raw) {
        Ok(v) => v,
        Err(_) => return false,
    };
    let Value::Map(entries) = value else {
        return false;
    };

    let mut format: u64 = FORMAT_PLAIN;
    let mut body: Option<&Value> = None;
    for (key, val) in &entries {
        let Value::Text(key) = key else {
            return false;
        };
        match key.as_str() {
            "format" => match val {
                Value::Integer(i) => match u64::try_from(*i) {
                    Ok(f) => format = f,
                    Err(_) => return false,
                },
                _ => return false,
            },
            "body" => body = Some(val),
            // Any unexpected top-level key invalidates the envelope.
            _ => return false,
        }
    }

    let Some(body) = body else {
        return false;
    };

    if format == FORMAT_PLAIN {
        return true;
    }

    // Non-plain formats require the encrypted body struct with byte-like
    // data, not raw bytes.
    let Value::Map(body_entries) = body else {
        return false;
    };
    body_entries
        .iter()
        .any(|(k, v)| matches!(k, Value::Text(t) if t == "data") && matches!(v, Value::Bytes(_)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip<T>(value: &T) -> T
    where
        T: Serialize + DeserializeOwned,
    {
        from_slice(&to_vec(value).unwrap()).unwrap()
    }

    #[test]
    fn test_plain_envelope_round_trip() {
        let env = Envelope {
            format: None,
            body: EnvelopeBody::Plain(ByteBuf::from(vec![1, 2, 3])),
        };
        assert_eq!(round_trip(&env), env);
    }

    #[test]
    fn test_encrypted_envelope_round_trip() {
        let env = Envelope {
            format: Some(FORMAT_ENCRYPTED_X25519_DEOXYSII),
            body: EnvelopeBody::Encrypted(EncryptedBody {
                pk: Some(ByteBuf::from(vec![0xaa; 32])),
                nonce: ByteBuf::from(vec![0x01; 15]),
                data: ByteBuf::from(vec![0xfe; 48]),
            }),
        };
        assert_eq!(round_trip(&env), env);
    }

    #[test]
    fn test_call_result_round_trips_each_variant() {
        let ok = CallResult {
            ok: Some(OkValue::Bytes(ByteBuf::from(vec![5, 6]))),
            ..Default::default()
        };
        assert_eq!(round_trip(&ok), ok);

        let fail = CallResult {
            fail: Some(Failure {
                module: "evm".to_string(),
                code: 8,
                message: Some("reverted".to_string()),
            }),
            ..Default::default()
        };
        assert_eq!(round_trip(&fail), fail);

        let unknown = CallResult {
            unknown: Some(AeadBox {
                nonce: ByteBuf::from(vec![0u8; 15]),
                data: ByteBuf::from(vec![9u8; 20]),
            }),
            ..Default::default()
        };
        assert_eq!(round_trip(&unknown), unknown);
    }

    #[test]
    fn test_plain_envelope_omits_format_tag() {
        let env = Envelope {
            format: None,
            body: EnvelopeBody::Plain(ByteBuf::from(vec![1])),
        };
        let raw = to_vec(&env).unwrap();
        let value: Value = ciborium::from_reader(raw.as_slice()).unwrap();
        let Value::Map(entries) = value else { panic!("not a map") };
        assert_eq!(entries.len(), 1);
        assert!(matches!(&entries[0].0, Value::Text(t) if t == "body"));
    }

    #[test]
    fn test_format_ok_accepts_plain_and_encrypted() {
        let plain = Envelope {
            format: None,
            body: EnvelopeBody::Plain(ByteBuf::from(vec![1, 2])),
        };
        assert!(envelope_format_ok(&to_vec(&plain).unwrap()));

        let encrypted = Envelope {
            format: Some(FORMAT_ENCRYPTED_X25519_DEOXYSII),
            body: EnvelopeBody::Encrypted(EncryptedBody {
                pk: None,
                nonce: ByteBuf::from(vec![0u8; 15]),
                data: ByteBuf::from(vec![1u8; 16]),
            }),
        };
        assert!(envelope_format_ok(&to_vec(&encrypted).unwrap()));
    }

    #[test]
    fn test_format_ok_accepts_unknown_format_with_valid_shape() {
        let mock = Envelope {
            format: Some(FORMAT_MOCK),
            body: EnvelopeBody::Encrypted(EncryptedBody {
                pk: None,
                nonce: ByteBuf::from(vec![0u8; 15]),
                data: ByteBuf::from(vec![1u8; 4]),
            }),
        };
        assert!(envelope_format_ok(&to_vec(&mock).unwrap()));
    }

    #[test]
    fn test_format_ok_rejects_unknown_top_level_key() {
        let value = Value::Map(vec![
            (
                Value::Text("body".to_string()),
                Value::Bytes(vec![1, 2, 3]),
            ),
            (Value::Text("extra".to_string()), Value::Integer(1.into())),
        ]);
        let mut raw = Vec::new();
        ciborium::into_writer(&value, &mut raw).unwrap();
        assert!(!envelope_format_ok(&raw));
        // The typed decoder agrees.
        assert!(from_slice::<Envelope>(&raw).is_err());
    }

    #[test]
    fn test_format_ok_rejects_missing_body() {
        let value = Value::Map(vec![(
            Value::Text("format".to_string()),
            Value::Integer(1.into()),
        )]);
        let mut raw = Vec::new();
        ciborium::into_writer(&value, &mut raw).unwrap();
        assert!(!envelope_format_ok(&raw));
    }

    #[test]
    fn test_format_ok_rejects_encrypted_format_with_raw_body() {
        let value = Value::Map(vec![
            (
                Value::Text("format".to_string()),
                Value::Integer(1.into()),
            ),
            (
                Value::Text("body".to_string()),
                Value::Bytes(vec![1, 2, 3]),
            ),
        ]);
        let mut raw = Vec::new();
        ciborium::into_writer(&value, &mut raw).unwrap();
        assert!(!envelope_format_ok(&raw));
    }

    #[test]
    fn test_format_ok_rejects_non_envelope_bytes() {
        assert!(!envelope_format_ok(&[0x01, 0x02, 0x03]));
        assert!(!envelope_format_ok(b""));
        // A CBOR array is structurally not an envelope.
        let mut raw = Vec::new();
        ciborium::into_writer(&vec![1u8, 2, 3], &mut raw).unwrap();
        assert!(!envelope_format_ok(&raw));
    }
}
