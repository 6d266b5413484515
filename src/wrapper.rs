// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Confidential Provider Middleware
//!
//! [`ConfidentialMiddleware`] slots into an `ethers` middleware stack and
//! transparently envelopes outbound calldata for `eth_call`,
//! `eth_estimateGas` and `eth_sendTransaction`, then unwraps call results
//! on the way back. Callers keep using the plain `Middleware` interface.
//!
//! Calldata that already parses as a call envelope is forwarded untouched,
//! so stacking this middleware twice (or over a dapp that envelopes its
//! own calldata) never double-encrypts. Empty calldata is also forwarded
//! untouched; a bare balance transfer has nothing to hide.
//!
//! With a signer attached, `eth_call` is upgraded to a leashed signed
//! query so the runtime can authenticate `msg.sender` during simulation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::providers::{Middleware, MiddlewareError, PendingTransaction};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, BlockId, Bytes, TransactionRequest, U256};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::calldata_key::KeyFetcher;
use crate::cipher::Cipher;
use crate::envelope;
use crate::error::Error as ConfidentialError;
use crate::signed_calls::{LeashOverrides, SignedCallDataPack};

/// Errors surfaced by [`ConfidentialMiddleware`].
#[derive(Debug, Error)]
pub enum ConfidentialMiddlewareError<M: Middleware> {
    /// Error bubbled up from the wrapped middleware stack.
    #[error(transparent)]
    Inner(M::Error),
    /// Error raised by the confidential layer itself.
    #[error(transparent)]
    Confidential(#[from] ConfidentialError),
}

impl<M: Middleware> MiddlewareError for ConfidentialMiddlewareError<M> {
    type Inner = M::Error;

    fn from_err(err: M::Error) -> Self {
        ConfidentialMiddlewareError::Inner(err)
    }

    fn as_inner(&self) -> Option<&M::Error> {
        match self {
            ConfidentialMiddlewareError::Inner(err) => Some(err),
            ConfidentialMiddlewareError::Confidential(_) => None,
        }
    }
}

/// Middleware that envelopes calldata before it leaves the process.
///
/// One AEAD session is kept per runtime key epoch: the cipher is created
/// on first use and replaced when the fetched key reports a new epoch, so
/// request latency within an epoch is one cache lookup, not a key
/// agreement.
#[derive(Debug)]
pub struct ConfidentialMiddleware<M, S = LocalWallet> {
    inner: M,
    chain_id: u64,
    fetcher: Arc<KeyFetcher>,
    session: Mutex<Option<(u64, Cipher)>>,
    signer: Option<S>,
}

impl<M: Middleware> ConfidentialMiddleware<M> {
    /// Wrap `inner` for the given confidential chain, without a signer.
    ///
    /// Calls go out unsigned; the runtime sees them as coming from the
    /// zero address during simulation.
    pub fn new(inner: M, chain_id: u64) -> Self {
        ConfidentialMiddleware {
            inner,
            chain_id,
            fetcher: Arc::new(KeyFetcher::new()),
            session: Mutex::new(None),
            signer: None,
        }
    }
}

impl<M: Middleware, S: Signer> ConfidentialMiddleware<M, S> {
    /// Attach a signer; `eth_call` becomes a leashed signed query.
    ///
    /// The middleware is retargeted to `signer.chain_id()`: signed
    /// queries must be domain-bound to the signer's chain, so it
    /// replaces any chain ID given at construction and steers the key
    /// fetch from here on.
    pub fn with_signer<S2: Signer>(self, signer: S2) -> ConfidentialMiddleware<M, S2> {
        ConfidentialMiddleware {
            inner: self.inner,
            chain_id: signer.chain_id(),
            fetcher: self.fetcher,
            session: Mutex::new(None),
            signer: Some(signer),
        }
    }

    /// Replace the runtime key cache TTL.
    pub fn with_key_ttl(mut self, ttl: Duration) -> Self {
        self.fetcher = Arc::new(KeyFetcher::with_ttl(ttl));
        self
    }

    /// Cipher for the current runtime key epoch, creating one on demand.
    async fn session_cipher(&self) -> Result<Cipher, ConfidentialError> {
        let key = self.fetcher.fetch(self.inner.provider(), self.chain_id).await?;
        let mut session = self.session.lock().await;
        match session.as_ref() {
            Some((epoch, cipher)) if *epoch == key.epoch => Ok(cipher.clone()),
            _ => {
                let cipher = Cipher::ephemeral_x25519_deoxysii(&key.public_key);
                *session = Some((key.epoch, cipher.clone()));
                Ok(cipher)
            }
        }
    }

    /// Calldata that needs enveloping, or `None` for passthrough.
    fn calldata_to_seal(tx: &TypedTransaction) -> Option<Bytes> {
        match tx.data() {
            Some(data) if !data.is_empty() && !envelope::envelope_format_ok(data) => {
                Some(data.clone())
            }
            _ => None,
        }
    }

    fn decrypt_result(&self, cipher: &Cipher, raw: &Bytes) -> Result<Bytes, ConfidentialError> {
        match cipher.decrypt_call_result(raw) {
            Ok(plain) => Ok(Bytes::from(plain)),
            // Non-confidential receivers answer with raw ABI bytes.
            Err(ConfidentialError::MalformedEnvelope { .. }) => Ok(raw.clone()),
            Err(err) => Err(err),
        }
    }
}

fn seal_calldata(cipher: &Cipher, data: &[u8]) -> Result<Vec<u8>, ConfidentialError> {
    match cipher.encrypt_envelope(data)? {
        Some(env) => envelope::to_vec(&env),
        None => Ok(Vec::new()),
    }
}

/// Flatten a typed transaction into the request shape the signed-query
/// builder consumes, substituting the signer's address when `from` is
/// absent.
fn signed_call_request(
    tx: &TypedTransaction,
    signer_address: Address,
    data: Bytes,
) -> TransactionRequest {
    let mut request = TransactionRequest::new()
        .from(tx.from().copied().unwrap_or(signer_address))
        .data(data);
    request.to = tx.to().cloned();
    request.gas = tx.gas().copied();
    request.gas_price = tx.gas_price();
    request.value = tx.value().copied();
    request
}

#[async_trait]
impl<M: Middleware, S: Signer + 'static> Middleware for ConfidentialMiddleware<M, S> {
    type Error = ConfidentialMiddlewareError<M>;
    type Provider = M::Provider;
    type Inner = M;

    fn inner(&self) -> &M {
        &self.inner
    }

    async fn call(
        &self,
        tx: &TypedTransaction,
        block: Option<BlockId>,
    ) -> Result<Bytes, Self::Error> {
        let data = match Self::calldata_to_seal(tx) {
            Some(data) => data,
            None => {
                return self
                    .inner
                    .call(tx, block)
                    .await
                    .map_err(ConfidentialMiddlewareError::Inner)
            }
        };

        let cipher = self.session_cipher().await?;
        let sealed = Bytes::from(seal_calldata(&cipher, &data)?);

        let response = match &self.signer {
            Some(signer) => {
                let request = signed_call_request(tx, signer.address(), sealed);
                let pack = SignedCallDataPack::make(
                    &request,
                    &self.inner,
                    signer,
                    LeashOverrides::default(),
                )
                .await?;
                let mut tx = tx.clone();
                tx.set_data(Bytes::from(pack.encode()?));
                self.inner
                    .call(&tx, block)
                    .await
                    .map_err(ConfidentialMiddlewareError::Inner)?
            }
            None => {
                let mut tx = tx.clone();
                tx.set_data(sealed);
                self.inner
                    .call(&tx, block)
                    .await
                    .map_err(ConfidentialMiddlewareError::Inner)?
            }
        };

        Ok(self.decrypt_result(&cipher, &response)?)
    }

    async fn estimate_gas(
        &self,
        tx: &TypedTransaction,
        block: Option<BlockId>,
    ) -> Result<U256, Self::Error> {
        let mut tx = tx.clone();
        if let Some(data) = Self::calldata_to_seal(&tx) {
            let cipher = self.session_cipher().await?;
            tx.set_data(Bytes::from(seal_calldata(&cipher, &data)?));
        }
        self.inner
            .estimate_gas(&tx, block)
            .await
            .map_err(ConfidentialMiddlewareError::Inner)
    }

    async fn send_transaction<T: Into<TypedTransaction> + Send + Sync>(
        &self,
        tx: T,
        block: Option<BlockId>,
    ) -> Result<PendingTransaction<'_, Self::Provider>, Self::Error> {
        let mut tx = tx.into();
        if let Some(data) = Self::calldata_to_seal(&tx) {
            let cipher = self.session_cipher().await?;
            tx.set_data(Bytes::from(seal_calldata(&cipher, &data)?));
        }
        self.inner
            .send_transaction(tx, block)
            .await
            .map_err(ConfidentialMiddlewareError::Inner)
    }
}
