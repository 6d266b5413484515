// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Confidential Chain Registry
//!
//! Static registry of the recognized confidential EVM chains. The key
//! fetcher consults it for the HTTP gateway fallback, and the signed-call
//! pack consults it to gate EIP-712 signing to chains whose runtime-side
//! query verifier actually understands signed queries.

use std::collections::HashMap;

/// Chain ID of the Sapphire mainnet (0x5afe).
pub const SAPPHIRE_MAINNET: u64 = 0x5afe;
/// Chain ID of the Sapphire testnet (0x5aff).
pub const SAPPHIRE_TESTNET: u64 = 0x5aff;
/// Chain ID of a local Sapphire development node (0x5afd).
pub const SAPPHIRE_LOCALNET: u64 = 0x5afd;

/// Static description of one confidential chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainSpec {
    /// Numeric EVM chain ID.
    pub chain_id: u64,
    /// Logical network name ("mainnet", "testnet", "localnet").
    pub name: &'static str,
    /// Well-known public JSON-RPC gateway, used when the wrapped provider
    /// cannot service the calldata-public-key request itself.
    pub default_gateway: &'static str,
    /// Runtime identifier of the confidential paratime on this chain.
    pub runtime_id: &'static str,
}

/// Registry of all recognized confidential chains.
#[derive(Debug)]
pub struct ChainRegistry {
    chains: HashMap<u64, ChainSpec>,
}

impl ChainRegistry {
    /// Build the registry with the built-in chain set.
    pub fn new() -> Self {
        let mut chains = HashMap::new();
        for spec in [
            ChainSpec {
                chain_id: SAPPHIRE_MAINNET,
                name: "mainnet",
                default_gateway: "https://sapphire.oasis.io",
                runtime_id: "0x000000000000000000000000000000000000000000000000f80306c9858e7279",
            },
            ChainSpec {
                chain_id: SAPPHIRE_TESTNET,
                name: "testnet",
                default_gateway: "https://testnet.sapphire.oasis.io",
                runtime_id: "0x000000000000000000000000000000000000000000000000a6d1e3ebf60dff6c",
            },
            ChainSpec {
                chain_id: SAPPHIRE_LOCALNET,
                name: "localnet",
                default_gateway: "http://localhost:8545",
                runtime_id: "0x8000000000000000000000000000000000000000000000000000000000000000",
            },
        ] {
            chains.insert(spec.chain_id, spec);
        }
        ChainRegistry { chains }
    }

    /// Look up a chain by numeric ID.
    pub fn get_chain(&self, chain_id: u64) -> Option<&ChainSpec> {
        self.chains.get(&chain_id)
    }

    /// Look up a chain by logical network name.
    pub fn get_chain_by_name(&self, name: &str) -> Option<&ChainSpec> {
        self.chains.values().find(|spec| spec.name == name)
    }

    /// Whether signed queries may be produced for this chain.
    pub fn supports_signed_queries(&self, chain_id: u64) -> bool {
        self.chains.contains_key(&chain_id)
    }

    /// All registered chain IDs.
    pub fn list_supported_chains(&self) -> Vec<u64> {
        self.chains.keys().copied().collect()
    }
}

impl Default for ChainRegistry {
    fn default() -> Self {
        Self::new()
    }
}
