// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Runtime Calldata Public Key Fetcher
//!
//! Retrieves the confidential runtime's current ephemeral X25519 public
//! key, preferring the wrapped provider's own request channel and falling
//! back to the chain's well-known HTTP gateway. The result is cached in a
//! single slot with a TTL (default 5 minutes); within the TTL, `fetch`
//! performs no I/O. The slot sits behind a `tokio::sync::Mutex`, which
//! also collapses concurrent cache-miss fetches into one at a time.
//!
//! Known limitation, kept deliberately: the cache is keyed by instance,
//! not by chain, so a provider that switches chains mid-TTL can be served
//! the previous chain's key until expiry. See DESIGN.md.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use ethers::providers::{JsonRpcClient, Provider};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::chains::ChainRegistry;
use crate::cipher::Cipher;
use crate::error::{Error, Result};

/// How long a fetched key is served from cache.
pub const DEFAULT_KEY_TTL: Duration = Duration::from_secs(300);

/// JSON-RPC method exposing the runtime's calldata public key.
const CALL_DATA_PUBLIC_KEY_METHOD: &str = "oasis_callDataPublicKey";

/// The runtime's current calldata public key, as cached by the fetcher.
///
/// Read-only once created; a refresh supersedes the whole value rather
/// than mutating it. `epoch` increases across rotations of the runtime
/// key absent a rollback.
#[derive(Clone, Debug)]
pub struct CallDataPublicKey {
    /// The X25519 public key clients perform key agreement against.
    pub public_key: [u8; 32],
    /// Runtime-provided integrity checksum over the key.
    pub checksum: Vec<u8>,
    /// Runtime signature binding the key to the current epoch.
    pub signature: Vec<u8>,
    /// Key-rotation counter.
    pub epoch: u64,
    /// Chain the key was fetched for.
    pub chain_id: u64,
    /// When the fetch completed, for TTL accounting.
    pub fetched: Instant,
}

/// Wire shape of the `oasis_callDataPublicKey` result.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CallDataPublicKeyResponse {
    /// Hex-encoded 32-byte public key.
    pub key: String,
    /// Hex-encoded checksum.
    #[serde(default)]
    pub checksum: String,
    /// Hex-encoded signature.
    #[serde(default)]
    pub signature: String,
    /// Key-rotation epoch.
    #[serde(default)]
    pub epoch: u64,
}

impl CallDataPublicKeyResponse {
    fn into_key(self, chain_id: u64) -> Result<CallDataPublicKey> {
        let key_bytes = decode_hex_field(&self.key, "key")?;
        let public_key: [u8; 32] =
            key_bytes
                .as_slice()
                .try_into()
                .map_err(|_| Error::InvalidLength {
                    kind: "calldata public key",
                    expected: 32,
                    actual: key_bytes.len(),
                })?;
        Ok(CallDataPublicKey {
            public_key,
            checksum: decode_hex_field(&self.checksum, "checksum")?,
            signature: decode_hex_field(&self.signature, "signature")?,
            epoch: self.epoch,
            chain_id,
            fetched: Instant::now(),
        })
    }
}

fn decode_hex_field(value: &str, field: &'static str) -> Result<Vec<u8>> {
    hex::decode(value.trim_start_matches("0x")).map_err(|source| Error::Hex { field, source })
}

/// Anything that can serve the calldata-public-key RPC natively.
///
/// Implemented for every `ethers` provider; the fetcher probes this first
/// and treats failure as "unsupported", silently moving to the gateway.
#[async_trait]
pub trait KeyTransport: Send + Sync {
    /// Issue the `oasis_callDataPublicKey` request.
    async fn call_data_public_key(&self) -> Result<CallDataPublicKeyResponse>;
}

#[async_trait]
impl<P: JsonRpcClient> KeyTransport for Provider<P> {
    async fn call_data_public_key(&self) -> Result<CallDataPublicKeyResponse> {
        self.request(CALL_DATA_PUBLIC_KEY_METHOD, ())
            .await
            .map_err(|e| Error::Provider(e.to_string()))
    }
}

/// Raw JSON-RPC POST to a chain's default gateway.
async fn fetch_from_gateway(gateway: &str) -> Result<CallDataPublicKeyResponse> {
    let request = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": CALL_DATA_PUBLIC_KEY_METHOD,
        "params": [],
    });
    let response: serde_json::Value = reqwest::Client::new()
        .post(gateway)
        .json(&request)
        .send()
        .await?
        .json()
        .await?;
    serde_json::from_value(response["result"].clone())
        .map_err(|e| Error::Decode(format!("gateway returned no usable result: {e}")))
}

/// Fetches and caches the runtime calldata public key.
#[derive(Debug)]
pub struct KeyFetcher {
    ttl: Duration,
    registry: ChainRegistry,
    slot: Mutex<Option<CallDataPublicKey>>,
}

impl KeyFetcher {
    /// Fetcher with the default 5-minute TTL.
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_KEY_TTL)
    }

    /// Fetcher with a custom TTL (tests use `Duration::ZERO`).
    pub fn with_ttl(ttl: Duration) -> Self {
        KeyFetcher {
            ttl,
            registry: ChainRegistry::new(),
            slot: Mutex::new(None),
        }
    }

    /// Get the runtime's calldata public key, from cache when fresh.
    ///
    /// On a miss: probe the transport's native request channel, then fall
    /// back to the chain's default gateway. No retries — a total failure
    /// is terminal for this call and the caller decides whether to retry.
    pub async fn fetch<T: KeyTransport + ?Sized>(
        &self,
        transport: &T,
        chain_id: u64,
    ) -> Result<CallDataPublicKey> {
        let mut slot = self.slot.lock().await;
        if let Some(cached) = slot.as_ref() {
            // XXX: served even if the provider switched chains since.
            if cached.fetched.elapsed() < self.ttl {
                return Ok(cached.clone());
            }
        }

        let response = match transport.call_data_public_key().await {
            Ok(response) => response,
            Err(probe_err) => {
                // Expected for providers without the runtime method; the
                // gateway is the real error surface. The registry is only
                // consulted here, to find that gateway: a provider on an
                // unregistered chain that serves the method itself is fine.
                let spec = self
                    .registry
                    .get_chain(chain_id)
                    .ok_or_else(|| Error::KeyFetch {
                        chain_id,
                        gateway: "<no known gateway>".to_string(),
                        reason: format!(
                            "provider probe failed ({probe_err}) and the chain is not in the confidential chain registry"
                        ),
                    })?;
                tracing::debug!(
                    chain_id,
                    error = %probe_err,
                    gateway = spec.default_gateway,
                    "provider cannot serve the calldata public key, trying gateway"
                );
                fetch_from_gateway(spec.default_gateway)
                    .await
                    .map_err(|e| Error::KeyFetch {
                        chain_id,
                        gateway: spec.default_gateway.to_string(),
                        reason: e.to_string(),
                    })?
            }
        };

        let key = response.into_key(chain_id)?;
        if let Some(previous) = slot.as_ref() {
            if previous.chain_id == chain_id && key.epoch < previous.epoch {
                tracing::warn!(
                    chain_id,
                    previous_epoch = previous.epoch,
                    epoch = key.epoch,
                    "runtime calldata key epoch went backwards"
                );
            }
        }
        tracing::debug!(chain_id, epoch = key.epoch, "fetched runtime calldata public key");
        *slot = Some(key.clone());
        Ok(key)
    }

    /// Compose [`KeyFetcher::fetch`] with an ephemeral session cipher.
    pub async fn cipher<T: KeyTransport + ?Sized>(
        &self,
        transport: &T,
        chain_id: u64,
    ) -> Result<Cipher> {
        let key = self.fetch(transport, chain_id).await?;
        Ok(Cipher::ephemeral_x25519_deoxysii(&key.public_key))
    }
}

impl Default for KeyFetcher {
    fn default() -> Self {
        Self::new()
    }
}
