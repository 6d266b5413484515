// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Leashed Signed Queries
//!
//! An unsigned `eth_call` cannot assert a sender identity, so the runtime
//! accepts a *signed query*: the call's fields plus a leash (account-nonce
//! bound and block-range window) signed as EIP-712 typed data. The runtime
//! verifies the signature, checks the leash against current chain state,
//! and scopes the call's view to the recovered sender.
//!
//! Signing is hard-restricted to the chains in [`crate::chains`]: the
//! runtime-side query verifier is chain-specific, so any other chain ID is
//! rejected before a single network call is made.

use ethers::abi::{encode, Token};
use ethers::providers::Middleware;
use ethers::signers::Signer;
use ethers::types::transaction::eip712::{EIP712Domain, Eip712, Eip712Error};
use ethers::types::{Address, BlockId, BlockNumber, NameOrAddress, TransactionRequest, H256, U256};
use ethers::utils::keccak256;
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

use crate::chains::ChainRegistry;
use crate::cipher::Cipher;
use crate::envelope;
use crate::error::{Error, Result};

/// Default validity window: 15 blocks, roughly 90 seconds.
pub const DEFAULT_BLOCK_RANGE: u64 = 15;
/// Default gas price for simulated calls.
const DEFAULT_GAS_PRICE: u64 = 1;
/// Default gas limit for simulated calls.
const DEFAULT_GAS_LIMIT: u64 = 30_000_000;

/// EIP-712 domain values the runtime's verifier expects.
const SIGNED_QUERY_DOMAIN_NAME: &str = "oasis-runtime-sdk/evm: signed query";
const SIGNED_QUERY_DOMAIN_VERSION: &str = "1.0.0";

const CALL_TYPE: &str = "Call(address from,address to,uint64 gasLimit,uint256 gasPrice,uint256 value,bytes data,Leash leash)Leash(uint64 nonce,uint64 blockNumber,bytes32 blockHash,uint64 blockRange)";
const LEASH_TYPE: &str =
    "Leash(uint64 nonce,uint64 blockNumber,bytes32 blockHash,uint64 blockRange)";

/// Validity window for a signed query.
///
/// The query holds only while the runtime's current block stays within
/// `[block_number, block_number + block_range]` and the sender's account
/// nonce has not passed `nonce`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Leash {
    /// Maximum sender account nonce at execution time.
    pub nonce: u64,
    /// Base block of the window.
    pub block_number: u64,
    /// Hash of the base block, pinning the fork.
    pub block_hash: H256,
    /// Window length in blocks; must be non-negative by construction.
    pub block_range: u64,
}

/// Caller-supplied overrides for leash construction.
#[derive(Clone, Copy, Debug, Default)]
pub struct LeashOverrides {
    /// Fixed account-nonce bound instead of the pending transaction count.
    pub nonce: Option<u64>,
    /// Fixed base block instead of the provider's latest.
    pub block: Option<(u64, H256)>,
    /// Window length instead of [`DEFAULT_BLOCK_RANGE`].
    pub block_range: Option<u64>,
}

/// The EIP-712-signable view of a call, with defaults applied.
#[derive(Clone, Debug)]
pub struct SignableCall {
    /// Sender asserting identity.
    pub from: Address,
    /// Target contract.
    pub to: Address,
    /// Gas limit (defaults to 30,000,000).
    pub gas_limit: u64,
    /// Gas price (defaults to 1).
    pub gas_price: U256,
    /// Transferred value (defaults to 0).
    pub value: U256,
    /// Calldata, possibly already enveloped (defaults to empty).
    pub data: Vec<u8>,
    /// The validity window.
    pub leash: Leash,
    /// Chain the query is bound to, used for the signing domain.
    pub chain_id: u64,
}

fn hash_leash(leash: &Leash) -> [u8; 32] {
    keccak256(encode(&[
        Token::FixedBytes(keccak256(LEASH_TYPE.as_bytes()).to_vec()),
        Token::Uint(U256::from(leash.nonce)),
        Token::Uint(U256::from(leash.block_number)),
        Token::FixedBytes(leash.block_hash.as_bytes().to_vec()),
        Token::Uint(U256::from(leash.block_range)),
    ]))
}

impl Eip712 for SignableCall {
    type Error = Eip712Error;

    fn domain(&self) -> std::result::Result<EIP712Domain, Self::Error> {
        Ok(EIP712Domain {
            name: Some(SIGNED_QUERY_DOMAIN_NAME.to_string()),
            version: Some(SIGNED_QUERY_DOMAIN_VERSION.to_string()),
            chain_id: Some(U256::from(self.chain_id)),
            verifying_contract: None,
            salt: None,
        })
    }

    fn type_hash() -> std::result::Result<[u8; 32], Self::Error> {
        Ok(keccak256(CALL_TYPE.as_bytes()))
    }

    fn struct_hash(&self) -> std::result::Result<[u8; 32], Self::Error> {
        Ok(keccak256(encode(&[
            Token::FixedBytes(Self::type_hash()?.to_vec()),
            Token::Address(self.from),
            Token::Address(self.to),
            Token::Uint(U256::from(self.gas_limit)),
            Token::Uint(self.gas_price),
            Token::Uint(self.value),
            Token::FixedBytes(keccak256(&self.data).to_vec()),
            Token::FixedBytes(hash_leash(&self.leash).to_vec()),
        ])))
    }
}

/// Leash in its wire form (snake_case names, plain integers).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeashWire {
    /// Maximum sender account nonce.
    pub nonce: u64,
    /// Base block number.
    pub block_number: u64,
    /// Base block hash (32 bytes).
    pub block_hash: ByteBuf,
    /// Window length in blocks.
    pub block_range: u64,
}

/// The runtime SDK's query struct: an EthCall in big-endian fixed-width
/// byte encodings (addresses 20 bytes, uint256 values 32 bytes).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulateCallQuery {
    /// Sender address (20 bytes).
    pub caller: ByteBuf,
    /// Target contract address (20 bytes).
    pub address: ByteBuf,
    /// Value, big-endian (32 bytes).
    pub value: ByteBuf,
    /// Gas price, big-endian (32 bytes).
    pub gas_price: ByteBuf,
    /// Gas limit.
    pub gas_limit: u64,
    /// Calldata.
    pub data: ByteBuf,
    /// The embedded leash.
    pub leash: LeashWire,
}

/// `{query, signature}` as CBOR-encoded for the runtime.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedQueryEnvelope {
    /// The simulated call plus leash.
    pub query: SimulateCallQuery,
    /// 65-byte ECDSA signature (r, s, v) over the EIP-712 digest.
    pub signature: ByteBuf,
}

/// A fully built and signed query, ready for encoding.
#[derive(Clone, Debug)]
pub struct SignedCallDataPack {
    /// The signed view of the call.
    pub signable: SignableCall,
    /// The wire query.
    pub query: SimulateCallQuery,
    /// EIP-712 signature bytes.
    pub signature: [u8; 65],
}

impl SignedCallDataPack {
    /// Build and sign a query for `call`.
    ///
    /// `call` must carry `from` and `to`; it is cloned internally and
    /// never mutated. Leash values come from `overrides` when present,
    /// otherwise from the provider: pending transaction count for the
    /// nonce, and the parent of the latest block as the base block.
    pub async fn make<M: Middleware, S: Signer>(
        call: &TransactionRequest,
        provider: &M,
        signer: &S,
        overrides: LeashOverrides,
    ) -> Result<Self> {
        let chain_id = signer.chain_id();
        if !ChainRegistry::new().supports_signed_queries(chain_id) {
            return Err(Error::UnsupportedChain(chain_id));
        }

        let call = call.clone();
        let from = call.from.ok_or(Error::MissingCallField("from"))?;
        let to = match call.to {
            Some(NameOrAddress::Address(addr)) => addr,
            Some(NameOrAddress::Name(_)) => {
                return Err(Error::Provider(
                    "ENS names are not resolvable in signed queries".to_string(),
                ))
            }
            None => return Err(Error::MissingCallField("to")),
        };

        // The wire query carries the gas limit as a u64.
        let gas_limit = match call.gas {
            Some(gas) if gas.bits() > 64 => {
                return Err(Error::InvalidCallField {
                    field: "gas",
                    reason: "gas limit does not fit in 64 bits".to_string(),
                })
            }
            Some(gas) => gas.as_u64(),
            None => DEFAULT_GAS_LIMIT,
        };

        let leash = resolve_leash(provider, from, overrides).await?;

        let signable = SignableCall {
            from,
            to,
            gas_limit,
            gas_price: call.gas_price.unwrap_or_else(|| U256::from(DEFAULT_GAS_PRICE)),
            value: call.value.unwrap_or_default(),
            data: call.data.map(|d| d.to_vec()).unwrap_or_default(),
            leash,
            chain_id,
        };

        let signature = signer
            .sign_typed_data(&signable)
            .await
            .map_err(|e| Error::Signer(e.to_string()))?;
        let signature_bytes: [u8; 65] =
            signature
                .to_vec()
                .try_into()
                .map_err(|v: Vec<u8>| Error::InvalidLength {
                    kind: "signature",
                    expected: 65,
                    actual: v.len(),
                })?;

        let query = signable.to_query();
        Ok(SignedCallDataPack {
            signable,
            query,
            signature: signature_bytes,
        })
    }

    /// CBOR-encode `{query, signature}`.
    pub fn encode(&self) -> Result<Vec<u8>> {
        envelope::to_vec(&SignedQueryEnvelope {
            query: self.query.clone(),
            signature: ByteBuf::from(self.signature.to_vec()),
        })
    }

    /// Encode and wrap in an additional calldata envelope for
    /// confidential signed queries; returns the hex wire form.
    pub fn encode_enveloped(&self, cipher: &Cipher) -> Result<String> {
        cipher.encrypt_encode(&self.encode()?)
    }
}

impl SignableCall {
    /// Project into the big-endian fixed-width wire query.
    fn to_query(&self) -> SimulateCallQuery {
        SimulateCallQuery {
            caller: ByteBuf::from(self.from.as_bytes().to_vec()),
            address: ByteBuf::from(self.to.as_bytes().to_vec()),
            value: ByteBuf::from(u256_be(self.value).to_vec()),
            gas_price: ByteBuf::from(u256_be(self.gas_price).to_vec()),
            gas_limit: self.gas_limit,
            data: ByteBuf::from(self.data.clone()),
            leash: LeashWire {
                nonce: self.leash.nonce,
                block_number: self.leash.block_number,
                block_hash: ByteBuf::from(self.leash.block_hash.as_bytes().to_vec()),
                block_range: self.leash.block_range,
            },
        }
    }
}

fn u256_be(value: U256) -> [u8; 32] {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    buf
}

async fn resolve_leash<M: Middleware>(
    provider: &M,
    from: Address,
    overrides: LeashOverrides,
) -> Result<Leash> {
    let nonce = match overrides.nonce {
        Some(nonce) => nonce,
        None => provider
            .get_transaction_count(from, Some(BlockId::Number(BlockNumber::Pending)))
            .await
            .map_err(|e| Error::Provider(e.to_string()))?
            .as_u64(),
    };

    let (block_number, block_hash) = match overrides.block {
        Some(block) => block,
        None => {
            let latest = provider
                .get_block(BlockNumber::Latest)
                .await
                .map_err(|e| Error::Provider(e.to_string()))?
                .ok_or_else(|| Error::Provider("provider has no latest block".to_string()))?;
            let number = latest
                .number
                .ok_or_else(|| Error::Provider("latest block has no number".to_string()))?
                .as_u64();
            // Anchor on the parent: its hash is final even if the head
            // block is still being re-organized.
            (number.saturating_sub(1), latest.parent_hash)
        }
    };

    Ok(Leash {
        nonce,
        block_number,
        block_hash,
        block_range: overrides.block_range.unwrap_or(DEFAULT_BLOCK_RANGE),
    })
}
