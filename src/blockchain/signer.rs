//! Nonce-managed signer that routes every call through a proxy chain.
//!
//! # Responsibilities
//! - Seed the nonce counter from chain state once, at construction
//! - Hand out strictly sequential nonces in call order
//! - Wrap, sign and submit calls
//! - Report submission failures as a logged outcome instead of a panic or `Err`
//!
//! Nonce allocation happens synchronously inside [`ProxyChainSigner::sign_and_send`]
//! before the returned future is first polled, so calls issued back-to-back
//! get consecutive nonces in the order they were made.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, B256};
use tokio::time::Instant;

use crate::blockchain::confirmation::{ConfirmationTracker, DEFAULT_CONFIRMATION_TIMEOUT};
use crate::blockchain::extrinsic::SignedExtrinsic;
use crate::blockchain::proxy_chain::ProxyChain;
use crate::blockchain::transport::{ChainTransport, ModuleErrorResolver, StatusSubscription};
use crate::blockchain::types::{BlockchainError, BlockchainResult, Call};
use crate::blockchain::wallet::Wallet;
use crate::observability::metrics;

/// A submitted extrinsic whose outcome has not been observed yet.
///
/// Dropping it releases the status subscription without waiting.
#[derive(Debug)]
pub struct PendingTx {
    pub nonce: u64,
    pub tx_hash: B256,
    pub submitted_at: Instant,
    subscription: StatusSubscription,
}

impl PendingTx {
    /// Wait for the outcome; the tracker's deadline counts from submission.
    pub async fn wait<R>(self, tracker: ConfirmationTracker<'_, R>) -> BlockchainResult<B256>
    where
        R: ModuleErrorResolver + ?Sized,
    {
        tracker.wait_since(self.subscription, self.submitted_at).await
    }
}

/// Result of a fire-and-forget submission.
#[must_use]
#[derive(Debug)]
pub enum SubmitOutcome {
    Submitted(PendingTx),
    /// Signing or submission failed. Already logged.
    Failed { nonce: u64, error: BlockchainError },
}

impl SubmitOutcome {
    pub fn nonce(&self) -> u64 {
        match self {
            SubmitOutcome::Submitted(pending) => pending.nonce,
            SubmitOutcome::Failed { nonce, .. } => *nonce,
        }
    }

    pub fn is_submitted(&self) -> bool {
        matches!(self, SubmitOutcome::Submitted(_))
    }

    /// Turn a failed submission back into an error for callers that want to propagate it.
    pub fn into_result(self) -> BlockchainResult<PendingTx> {
        match self {
            SubmitOutcome::Submitted(pending) => Ok(pending),
            SubmitOutcome::Failed { error, .. } => Err(error),
        }
    }
}

/// Signer owning the nonce counter for one account.
pub struct ProxyChainSigner<T: ?Sized> {
    transport: Arc<T>,
    wallet: Wallet,
    chain: ProxyChain,
    /// Next nonce to hand out.
    nonce: AtomicU64,
    confirmation_timeout: Duration,
}

impl<T> ProxyChainSigner<T>
where
    T: ChainTransport + ?Sized,
{
    /// Build a signer once the account's on-chain nonce is known.
    pub async fn new(
        transport: Arc<T>,
        wallet: Wallet,
        chain: ProxyChain,
    ) -> BlockchainResult<Self> {
        if wallet.chain_id() != transport.chain_id() {
            return Err(BlockchainError::Configuration(format!(
                "Wallet chain id {} does not match transport chain id {}",
                wallet.chain_id(),
                transport.chain_id()
            )));
        }

        let nonce = transport.account_nonce(wallet.address()).await?;

        tracing::info!(
            signer = %wallet.address(),
            real = %chain.effective_account(wallet.address()),
            hops = chain.len(),
            nonce,
            "Proxy chain signer ready"
        );

        Ok(Self {
            transport,
            wallet,
            chain,
            nonce: AtomicU64::new(nonce),
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
        })
    }

    /// Parse `proxy_chain` (`"addr[:type],..."`) and build the signer.
    pub async fn from_config(
        transport: Arc<T>,
        wallet: Wallet,
        proxy_chain: &str,
    ) -> BlockchainResult<Self> {
        let chain = ProxyChain::parse(proxy_chain)?;
        Self::new(transport, wallet, chain).await
    }

    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    /// The signing account.
    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    /// The account calls act as after proxy wrapping.
    pub fn real_account(&self) -> Address {
        self.chain.effective_account(self.wallet.address())
    }

    pub fn proxy_chain(&self) -> &ProxyChain {
        &self.chain
    }

    /// Nonce the next automatic allocation will use.
    pub fn current_nonce(&self) -> u64 {
        self.nonce.load(Ordering::SeqCst)
    }

    /// Tracker using this signer's transport and confirmation timeout.
    pub fn tracker(&self) -> ConfirmationTracker<'_, T> {
        ConfirmationTracker::new(self.transport.as_ref()).with_timeout(self.confirmation_timeout)
    }

    /// Take the next nonce. `u64::MAX` is never handed out: the counter cannot move past it.
    fn allocate_nonce(&self) -> BlockchainResult<u64> {
        self.nonce
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |next| next.checked_add(1))
            .map_err(|_| nonce_exhausted())
    }

    /// Make sure automatic allocation never hands out `nonce`. Returns true if the counter moved.
    fn reserve_nonce(&self, nonce: u64) -> BlockchainResult<bool> {
        let next = nonce.checked_add(1).ok_or_else(nonce_exhausted)?;
        let previous = self.nonce.fetch_max(next, Ordering::SeqCst);
        Ok(previous <= nonce)
    }

    /// Wrap `call` in the proxy chain and sign it at `nonce`.
    pub async fn sign(
        &self,
        call: Call,
        nonce: u64,
        tip: Option<u128>,
    ) -> BlockchainResult<SignedExtrinsic> {
        SignedExtrinsic::sign(&self.wallet, self.chain.wrap(call), nonce, tip).await
    }

    /// Allocate the next nonce, then wrap, sign and submit `call`.
    pub fn sign_and_send(
        &self,
        call: Call,
        tip: Option<u128>,
    ) -> impl Future<Output = SubmitOutcome> + Send + '_ {
        let allocated = self.allocate_nonce();
        async move {
            match allocated {
                Ok(nonce) => self.submit(call, nonce, tip).await,
                Err(error) => self.failed(self.current_nonce(), error),
            }
        }
    }

    /// Submit at an explicit nonce.
    ///
    /// A nonce at or above the counter moves the counter past it. A lower
    /// nonce (replacing or backfilling a transaction) leaves the counter alone.
    pub fn sign_and_send_with_nonce(
        &self,
        call: Call,
        nonce: u64,
        tip: Option<u128>,
    ) -> impl Future<Output = SubmitOutcome> + Send + '_ {
        let reserved = self.reserve_nonce(nonce);
        if let Ok(raised) = reserved {
            metrics::record_nonce_override(raised);
            tracing::debug!(nonce, raised, next = self.current_nonce(), "Manual nonce override");
        }
        async move {
            match reserved {
                Ok(_) => self.submit(call, nonce, tip).await,
                Err(error) => self.failed(nonce, error),
            }
        }
    }

    /// Allocate, submit and wait for inclusion.
    pub fn sign_and_wait(
        &self,
        call: Call,
        tip: Option<u128>,
    ) -> impl Future<Output = BlockchainResult<B256>> + Send + '_ {
        self.sign_and_wait_with(call, tip, self.tracker())
    }

    /// Like [`sign_and_wait`](Self::sign_and_wait) but driven by a caller-built
    /// tracker, e.g. one carrying an [`on_status`](ConfirmationTracker::on_status) observer.
    pub fn sign_and_wait_with<'a>(
        &'a self,
        call: Call,
        tip: Option<u128>,
        tracker: ConfirmationTracker<'a, T>,
    ) -> impl Future<Output = BlockchainResult<B256>> + Send + 'a {
        let allocated = self.allocate_nonce();
        async move {
            let nonce = allocated?;
            let extrinsic = self.sign(call, nonce, tip).await?;
            tracker
                .submit_and_wait(self.transport.as_ref(), extrinsic)
                .await
        }
    }

    async fn submit(&self, call: Call, nonce: u64, tip: Option<u128>) -> SubmitOutcome {
        let extrinsic = match self.sign(call, nonce, tip).await {
            Ok(extrinsic) => extrinsic,
            Err(error) => return self.failed(nonce, error),
        };
        let tx_hash = extrinsic.hash();
        let submitted_at = Instant::now();

        match self.transport.submit_and_watch(extrinsic).await {
            Ok(subscription) => {
                tracing::debug!(nonce, tx_hash = %tx_hash, "Extrinsic submitted");
                metrics::record_submission("submitted");
                SubmitOutcome::Submitted(PendingTx {
                    nonce,
                    tx_hash,
                    submitted_at,
                    subscription,
                })
            }
            Err(error) => self.failed(nonce, error),
        }
    }

    fn failed(&self, nonce: u64, error: BlockchainError) -> SubmitOutcome {
        tracing::error!(
            signer = %self.wallet.address(),
            nonce,
            error = %error,
            "Failed to submit extrinsic"
        );
        metrics::record_submission("failed");
        SubmitOutcome::Failed { nonce, error }
    }
}

fn nonce_exhausted() -> BlockchainError {
    BlockchainError::Configuration("Nonce space exhausted at u64::MAX".to_string())
}

impl<T: ?Sized> std::fmt::Debug for ProxyChainSigner<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyChainSigner")
            .field("address", &self.wallet.address())
            .field("proxy_chain", &self.chain.to_string())
            .field("nonce", &self.nonce.load(Ordering::SeqCst))
            .finish()
    }
}
