// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Error Types
//!
//! One error enum for the whole crate. The taxonomy follows the failure
//! classes of the envelope protocol:
//!
//! - **InvalidLength**: fixed-size key/nonce/signature inputs of the wrong
//!   size; rejected before any cryptography runs
//! - **AuthenticationFailed**: AEAD tag mismatch on decryption
//! - **MalformedEnvelope**: bytes that do not decode to a recognized
//!   envelope shape (the offending payload is attached for debugging)
//! - **KeyFetch / UnsupportedChain**: network and chain-gating failures
//! - **CallFailed**: a confidential call result carrying the runtime's
//!   module/code/message triple
//!
//! Cryptographic *rejection* (small-order points, non-canonical scalars)
//! is not an error: signature verification returns `Ok(false)` for those,
//! as constant-time verification conventions require.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced by envelope construction, key fetching, and decryption.
#[derive(Debug, Error)]
pub enum Error {
    /// A fixed-size input (key, point, nonce, signature) had the wrong length.
    #[error("invalid {kind} length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// Which input failed validation, e.g. "public key".
        kind: &'static str,
        /// Required size in bytes.
        expected: usize,
        /// Size actually supplied.
        actual: usize,
    },

    /// AEAD decryption failed: wrong key, wrong nonce, or tampered ciphertext.
    #[error("decryption failed: authentication tag mismatch")]
    AuthenticationFailed,

    /// The mock cipher was handed a nonce other than its fixed constant.
    #[error("mock cipher: unexpected nonce {0}")]
    MockNonceMismatch(String),

    /// Bytes that were expected to be a CBOR envelope did not decode to one.
    ///
    /// `payload` carries the hex of the offending bytes so callers can tell
    /// "this was never meant to be confidential" apart from corruption.
    #[error("malformed envelope ({reason}): payload 0x{payload}")]
    MalformedEnvelope {
        /// What was wrong with the shape.
        reason: String,
        /// Hex of the rejected payload.
        payload: String,
    },

    /// CBOR serialization failed.
    #[error("envelope encoding failed: {0}")]
    Encode(String),

    /// CBOR deserialization failed.
    #[error("envelope decoding failed: {0}")]
    Decode(String),

    /// Hex (de)serialization failed on an RPC field.
    #[error("invalid hex in field '{field}': {source}")]
    Hex {
        /// Field being decoded.
        field: &'static str,
        /// Underlying decode error.
        #[source]
        source: hex::FromHexError,
    },

    /// Neither the provider request path nor the HTTP gateway fallback
    /// yielded a runtime calldata public key.
    #[error("failed to fetch runtime calldata public key for chain {chain_id} via {gateway}: {reason}")]
    KeyFetch {
        /// Chain the fetch targeted.
        chain_id: u64,
        /// Gateway used for the fallback attempt.
        gateway: String,
        /// Why the fetch failed.
        reason: String,
    },

    /// Signed queries are hard-restricted to the recognized confidential
    /// chains; the runtime-side verifier is chain-specific.
    #[error("chain {0} does not support signed queries")]
    UnsupportedChain(u64),

    /// The call is missing a field the signed-query leash requires.
    #[error("signed query requires the '{0}' field on the call")]
    MissingCallField(&'static str),

    /// A call field cannot be represented in the signed-query wire form.
    #[error("invalid '{field}' field on the call: {reason}")]
    InvalidCallField {
        /// Field that failed validation.
        field: &'static str,
        /// Why it cannot be encoded.
        reason: String,
    },

    /// A confidential call reverted; decoded from the result's `fail` variant.
    #[error("call failed in module '{module}' with code {code}{}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    CallFailed {
        /// Runtime module reporting the failure.
        module: String,
        /// Module-specific error code.
        code: u64,
        /// Optional human-readable message.
        message: Option<String>,
    },

    /// A call result with no recognizable `ok`/`fail`/`unknown` shape.
    #[error("unexpected call result shape")]
    UnexpectedCallResult,

    /// Upstream provider/transport failure (JSON-RPC, block queries).
    #[error("provider error: {0}")]
    Provider(String),

    /// Signing the EIP-712 query failed.
    #[error("signer error: {0}")]
    Signer(String),

    /// HTTP gateway fallback failure.
    #[error("gateway request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    pub(crate) fn malformed_envelope(reason: impl Into<String>, payload: &[u8]) -> Self {
        Error::MalformedEnvelope {
            reason: reason.into(),
            payload: hex::encode(payload),
        }
    }
}
