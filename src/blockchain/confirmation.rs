//! Confirmation tracking for submitted extrinsics.
//!
//! # State machine
//! ```text
//! Submitted --(node rejects submission)----------> TransportFailed
//! Submitted --(InBlock, no dispatch error)-------> Confirmed(block hash)
//! Submitted --(InBlock, dispatch error)----------> DispatchFailed(block hash, pallet.error)
//! Submitted --(Dropped/Invalid/Usurped/closed)---> TransportFailed
//! Submitted --(deadline)-------------------------> TimedOut
//! ```
//!
//! The deadline starts when submission starts. The subscription is released
//! exactly once on every exit path, and is consumed by the tracker so late
//! notifications go nowhere.

use std::time::Duration;

use alloy::primitives::B256;
use tokio::time::{sleep_until, timeout_at, Instant};

use crate::blockchain::extrinsic::SignedExtrinsic;
use crate::blockchain::transport::{
    ChainTransport, ExtrinsicSubmitter, ModuleErrorResolver, StatusSubscription,
};
use crate::blockchain::types::{BlockchainError, BlockchainResult, TxStatus, TxStatusUpdate};
use crate::observability::metrics;

/// Default time to wait for inclusion.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_millis(120_000);

/// Callback invoked with every status update up to and including the terminal one.
pub type StatusObserver<'a> = Box<dyn FnMut(&TxStatusUpdate) + Send + 'a>;

/// Drives one status subscription to a terminal outcome.
pub struct ConfirmationTracker<'a, R: ?Sized> {
    resolver: &'a R,
    timeout: Duration,
    observer: Option<StatusObserver<'a>>,
}

impl<'a, R> ConfirmationTracker<'a, R>
where
    R: ModuleErrorResolver + ?Sized,
{
    pub fn new(resolver: &'a R) -> Self {
        Self {
            resolver,
            timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            observer: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn on_status<F>(mut self, observer: F) -> Self
    where
        F: FnMut(&TxStatusUpdate) + Send + 'a,
    {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Submit `extrinsic` through `submitter` and wait for the outcome.
    pub async fn submit_and_wait<S>(
        self,
        submitter: &S,
        extrinsic: SignedExtrinsic,
    ) -> BlockchainResult<B256>
    where
        S: ExtrinsicSubmitter + ?Sized,
    {
        let deadline = Instant::now() + self.timeout;
        let tx_hash = extrinsic.hash();
        let nonce = extrinsic.nonce;

        let subscription = match timeout_at(deadline, submitter.submit_and_watch(extrinsic)).await
        {
            Ok(Ok(subscription)) => subscription,
            Ok(Err(e)) => {
                tracing::error!(tx_hash = %tx_hash, nonce, error = %e, "Submission rejected");
                metrics::record_confirmation("transport_failed");
                return Err(e);
            }
            Err(_) => {
                tracing::warn!(
                    tx_hash = %tx_hash,
                    nonce,
                    "Submission did not complete before deadline"
                );
                metrics::record_confirmation("timed_out");
                return Err(self.timeout_error());
            }
        };

        tracing::debug!(
            tx_hash = %tx_hash,
            nonce,
            subscription_id = subscription.id(),
            "Watching extrinsic"
        );
        self.drive(subscription, deadline).await
    }

    /// Wait on a subscription obtained elsewhere. The deadline starts now.
    pub async fn wait(self, subscription: StatusSubscription) -> BlockchainResult<B256> {
        self.wait_since(subscription, Instant::now()).await
    }

    /// Wait on a subscription for an extrinsic submitted at `submitted_at`.
    pub async fn wait_since(
        self,
        subscription: StatusSubscription,
        submitted_at: Instant,
    ) -> BlockchainResult<B256> {
        let deadline = submitted_at + self.timeout;
        self.drive(subscription, deadline).await
    }

    async fn drive(
        mut self,
        mut subscription: StatusSubscription,
        deadline: Instant,
    ) -> BlockchainResult<B256> {
        let timer = sleep_until(deadline);
        tokio::pin!(timer);

        let outcome = loop {
            tokio::select! {
                biased;
                update = subscription.next() => {
                    let Some(update) = update else {
                        break Err(BlockchainError::Transport(
                            "Status stream closed before inclusion".to_string(),
                        ));
                    };
                    if let Some(observer) = self.observer.as_mut() {
                        observer(&update);
                    }
                    if let Some(outcome) = self.classify(&update) {
                        break outcome;
                    }
                }
                _ = &mut timer => break Err(self.timeout_error()),
            }
        };

        subscription.unsubscribe();

        match &outcome {
            Ok(block_hash) => {
                tracing::info!(block_hash = %block_hash, "Extrinsic included");
                metrics::record_confirmation("confirmed");
            }
            Err(e @ BlockchainError::Dispatch { .. }) => {
                tracing::warn!(error = %e, "Extrinsic included but dispatch failed");
                metrics::record_confirmation("dispatch_failed");
            }
            Err(e @ BlockchainError::Timeout { .. }) => {
                tracing::warn!(error = %e, "Extrinsic fate unknown at deadline");
                metrics::record_confirmation("timed_out");
            }
            Err(e) => {
                tracing::error!(error = %e, "Extrinsic failed before inclusion");
                metrics::record_confirmation("transport_failed");
            }
        }

        outcome
    }

    /// Terminal outcome for an update, `None` if still pending.
    fn classify(&self, update: &TxStatusUpdate) -> Option<BlockchainResult<B256>> {
        if let Some(internal) = &update.internal_error {
            return Some(Err(BlockchainError::Transport(internal.clone())));
        }

        if let Some(block_hash) = update.status.included_in() {
            return Some(match update.dispatch_error {
                None => Ok(block_hash),
                Some(raw) => Err(BlockchainError::Dispatch {
                    block_hash,
                    module_error: self.resolver.resolve(raw),
                }),
            });
        }

        match update.status {
            TxStatus::Dropped => Some(Err(BlockchainError::Transport(
                "Extrinsic dropped from the pool".to_string(),
            ))),
            TxStatus::Invalid => Some(Err(BlockchainError::Transport(
                "Extrinsic is invalid".to_string(),
            ))),
            TxStatus::Usurped(by) => Some(Err(BlockchainError::Transport(format!(
                "Extrinsic usurped by {}",
                by
            )))),
            status => {
                tracing::debug!(?status, "Extrinsic pending");
                None
            }
        }
    }

    fn timeout_error(&self) -> BlockchainError {
        BlockchainError::Timeout {
            timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Submit `extrinsic` and resolve to the hash of the block that included it.
///
/// `timeout` defaults to [`DEFAULT_CONFIRMATION_TIMEOUT`].
pub async fn wait_tx_done<T>(
    transport: &T,
    extrinsic: SignedExtrinsic,
    timeout: Option<Duration>,
) -> BlockchainResult<B256>
where
    T: ChainTransport + ?Sized,
{
    ConfirmationTracker::new(transport)
        .with_timeout(timeout.unwrap_or(DEFAULT_CONFIRMATION_TIMEOUT))
        .submit_and_wait(transport, extrinsic)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::types::{Call, DispatchError, ModuleError};
    use crate::blockchain::wallet::Wallet;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    const TEST_PRIVATE_KEY: &str =
        "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    /// Hands out one subscription whose updates the test scripts by hand.
    #[derive(Default)]
    struct ScriptedSubmitter {
        reject: Option<String>,
        /// Never answer the submission call.
        hang: bool,
        sender: Mutex<Option<mpsc::UnboundedSender<TxStatusUpdate>>>,
        unsubscribed: Arc<AtomicUsize>,
    }

    impl ScriptedSubmitter {
        fn sender(&self) -> mpsc::UnboundedSender<TxStatusUpdate> {
            self.sender.lock().unwrap().clone().unwrap()
        }
    }

    #[async_trait]
    impl ExtrinsicSubmitter for ScriptedSubmitter {
        async fn submit_and_watch(
            &self,
            _extrinsic: SignedExtrinsic,
        ) -> BlockchainResult<StatusSubscription> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            if let Some(reason) = &self.reject {
                return Err(BlockchainError::Transport(reason.clone()));
            }
            let (tx, rx) = mpsc::unbounded_channel();
            *self.sender.lock().unwrap() = Some(tx);
            let counter = self.unsubscribed.clone();
            Ok(StatusSubscription::new(7, rx, move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
        }
    }

    struct Registry;

    impl ModuleErrorResolver for Registry {
        fn resolve_module_error(&self, module_index: u8, error_index: u8) -> Option<ModuleError> {
            (module_index == 3 && error_index == 2).then(|| ModuleError {
                pallet: "Balances".into(),
                error: "InsufficientBalance".into(),
            })
        }
    }

    async fn extrinsic() -> SignedExtrinsic {
        let wallet = Wallet::from_private_key(TEST_PRIVATE_KEY, 1281).unwrap();
        SignedExtrinsic::sign(&wallet, Call::remark("tracked"), 0, None)
            .await
            .unwrap()
    }

    /// Spawn the tracker, then push `updates` once it has subscribed.
    async fn run_with_updates(
        submitter: Arc<ScriptedSubmitter>,
        timeout: Duration,
        updates: Vec<TxStatusUpdate>,
    ) -> BlockchainResult<B256> {
        let xt = extrinsic().await;
        let sub = submitter.clone();
        let handle = tokio::spawn(async move {
            ConfirmationTracker::new(&Registry)
                .with_timeout(timeout)
                .submit_and_wait(sub.as_ref(), xt)
                .await
        });
        while submitter.sender.lock().unwrap().is_none() {
            tokio::task::yield_now().await;
        }
        let sender = submitter.sender();
        for update in updates {
            let _ = sender.send(update);
        }
        let outcome = handle.await.unwrap();
        drop(sender);
        outcome
    }

    #[tokio::test]
    async fn test_in_block_resolves_with_block_hash() {
        let submitter = Arc::new(ScriptedSubmitter::default());
        let block = B256::repeat_byte(0xab);

        let outcome = run_with_updates(
            submitter.clone(),
            DEFAULT_CONFIRMATION_TIMEOUT,
            vec![
                TxStatusUpdate::new(TxStatus::Ready),
                TxStatusUpdate::new(TxStatus::InBlock(block)),
            ],
        )
        .await;

        assert_eq!(outcome.unwrap(), block);
        assert_eq!(submitter.unsubscribed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dispatch_error_is_resolved_and_keeps_block_hash() {
        let submitter = Arc::new(ScriptedSubmitter::default());
        let block = B256::repeat_byte(0x11);

        let outcome = run_with_updates(
            submitter.clone(),
            DEFAULT_CONFIRMATION_TIMEOUT,
            vec![TxStatusUpdate::new(TxStatus::InBlock(block)).with_dispatch_error(
                DispatchError {
                    module_index: 3,
                    error_index: 2,
                },
            )],
        )
        .await;

        match outcome.unwrap_err() {
            BlockchainError::Dispatch {
                block_hash,
                module_error,
            } => {
                assert_eq!(block_hash, block);
                assert_eq!(module_error.pallet, "Balances");
                assert_eq!(module_error.error, "InsufficientBalance");
            }
            other => panic!("expected dispatch error, got {:?}", other),
        }
        assert_eq!(submitter.unsubscribed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_unsubscribes_once() {
        let submitter = Arc::new(ScriptedSubmitter::default());

        let outcome = run_with_updates(
            submitter.clone(),
            Duration::from_millis(500),
            vec![TxStatusUpdate::new(TxStatus::Ready)],
        )
        .await;

        let err = outcome.unwrap_err();
        assert!(matches!(err, BlockchainError::Timeout { timeout_ms: 500 }));
        assert!(err.is_ambiguous());
        assert_eq!(submitter.unsubscribed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_submission_rejection_is_transport_error() {
        let submitter = ScriptedSubmitter {
            reject: Some("1010: Invalid Transaction: Stale".into()),
            ..Default::default()
        };

        let outcome = ConfirmationTracker::new(&Registry)
            .submit_and_wait(&submitter, extrinsic().await)
            .await;

        assert!(matches!(outcome, Err(BlockchainError::Transport(ref m)) if m.contains("Stale")));
        assert_eq!(submitter.unsubscribed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_submission_times_out_at_deadline() {
        let submitter = ScriptedSubmitter {
            hang: true,
            ..Default::default()
        };
        let xt = extrinsic().await;

        let started = Instant::now();
        let outcome = ConfirmationTracker::new(&Registry)
            .with_timeout(Duration::from_millis(750))
            .submit_and_wait(&submitter, xt)
            .await;

        assert!(matches!(outcome, Err(BlockchainError::Timeout { timeout_ms: 750 })));
        assert!(started.elapsed() >= Duration::from_millis(750));
        // No subscription was ever handed out, so there is nothing to release.
        assert!(submitter.sender.lock().unwrap().is_none());
        assert_eq!(submitter.unsubscribed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_timeout_error_saturates_milliseconds() {
        let tracker = ConfirmationTracker::new(&Registry).with_timeout(Duration::MAX);
        assert!(matches!(
            tracker.timeout_error(),
            BlockchainError::Timeout { timeout_ms: u64::MAX }
        ));
    }

    #[tokio::test]
    async fn test_internal_error_and_dropped_are_transport_failures() {
        for update in [
            TxStatusUpdate::internal("connection reset"),
            TxStatusUpdate::new(TxStatus::Dropped),
            TxStatusUpdate::new(TxStatus::Usurped(B256::ZERO)),
        ] {
            let submitter = Arc::new(ScriptedSubmitter::default());
            let outcome =
                run_with_updates(submitter.clone(), DEFAULT_CONFIRMATION_TIMEOUT, vec![update])
                    .await;
            assert!(matches!(outcome, Err(BlockchainError::Transport(_))));
            assert_eq!(submitter.unsubscribed.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn test_closed_stream_is_transport_failure() {
        let submitter = Arc::new(ScriptedSubmitter::default());
        let xt = extrinsic().await;
        let sub = submitter.clone();
        let handle = tokio::spawn(async move {
            ConfirmationTracker::new(&Registry)
                .submit_and_wait(sub.as_ref(), xt)
                .await
        });
        while submitter.sender.lock().unwrap().is_none() {
            tokio::task::yield_now().await;
        }
        submitter.sender.lock().unwrap().take();

        let outcome = handle.await.unwrap();
        assert!(matches!(outcome, Err(BlockchainError::Transport(_))));
        assert_eq!(submitter.unsubscribed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_late_updates_after_terminal_are_ignored() {
        let (status_tx, rx) = mpsc::unbounded_channel();
        let unsubscribed = Arc::new(AtomicUsize::new(0));
        let counter = unsubscribed.clone();
        let subscription = StatusSubscription::new(9, rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let first = B256::repeat_byte(1);
        status_tx
            .send(TxStatusUpdate::new(TxStatus::InBlock(first)))
            .unwrap();
        status_tx
            .send(
                TxStatusUpdate::new(TxStatus::InBlock(B256::repeat_byte(2))).with_dispatch_error(
                    DispatchError {
                        module_index: 3,
                        error_index: 2,
                    },
                ),
            )
            .unwrap();

        let seen = Arc::new(AtomicUsize::new(0));
        let observed = seen.clone();
        let outcome = ConfirmationTracker::new(&Registry)
            .on_status(move |_| {
                observed.fetch_add(1, Ordering::SeqCst);
            })
            .wait(subscription)
            .await;

        assert_eq!(outcome.unwrap(), first);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(unsubscribed.load(Ordering::SeqCst), 1);

        // The receiver is gone, so nothing can be delivered any more.
        assert!(status_tx
            .send(TxStatusUpdate::new(TxStatus::Finalized(first)))
            .is_err());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(unsubscribed.load(Ordering::SeqCst), 1);
    }
}
