// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod calldata_key;
pub mod chains;
pub mod cipher;
pub mod envelope;
pub mod error;
pub mod mrae;
pub mod signed_calls;
pub mod wrapper;

// Re-export the main client surface
pub use calldata_key::{CallDataPublicKey, KeyFetcher, KeyTransport, DEFAULT_KEY_TTL};
pub use chains::{ChainRegistry, ChainSpec, SAPPHIRE_LOCALNET, SAPPHIRE_MAINNET, SAPPHIRE_TESTNET};
pub use cipher::{Cipher, Kind};
pub use envelope::{envelope_format_ok, CallResult, Envelope};
pub use error::{Error, Result};
pub use signed_calls::{Leash, LeashOverrides, SignedCallDataPack};
pub use wrapper::{ConfidentialMiddleware, ConfidentialMiddlewareError};
