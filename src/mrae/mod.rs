// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! MRAE Primitives
//!
//! The misuse-resistant authenticated encryption stack underneath the
//! calldata cipher:
//!
//! - **curve25519**: constant-time field arithmetic and X25519 scalar
//!   multiplication (16-limb representation, Montgomery ladder)
//! - **ed25519**: RFC 8032 signature verification, cofactored and
//!   cofactorless, with small-order and malleability rejection
//! - **deoxysii**: Deoxys-II-256-128 AEAD plus the domain-separated
//!   HMAC key derivation for X25519 box keys

pub mod curve25519;
pub mod deoxysii;
pub mod ed25519;

pub use curve25519::{scalar_mult, scalar_mult_base, scalar_mult_checked};
pub use deoxysii::{derive_symmetric_key, open, seal, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use ed25519::{verify, verify_checked, Variant};
