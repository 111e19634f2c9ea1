//! Batch submission with a bounded number of unconfirmed extrinsics.
//!
//! Nonces are allocated in input order as each slot frees up. A failed
//! submission leaves a nonce gap: later extrinsics of the batch stay queued
//! on chain and will surface as timeouts unless the gap is backfilled with
//! [`ProxyChainSigner::sign_and_send_with_nonce`].

use alloy::primitives::B256;
use futures_util::stream::{self, StreamExt};

use crate::blockchain::signer::{ProxyChainSigner, SubmitOutcome};
use crate::blockchain::transport::ChainTransport;
use crate::blockchain::types::{BlockchainError, BlockchainResult, Call};

/// Batch tuning.
#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    /// Maximum submitted but unresolved extrinsics. Zero is treated as one.
    pub max_in_flight: usize,
    pub tip: Option<u128>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_in_flight: 16,
            tip: None,
        }
    }
}

/// Outcome of one call of the batch.
#[derive(Debug)]
pub struct BatchItemResult {
    /// Position in the input.
    pub index: usize,
    pub nonce: u64,
    pub outcome: BlockchainResult<B256>,
}

/// Outcome counts for a finished batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub confirmed: usize,
    pub dispatch_failed: usize,
    pub transport_failed: usize,
    pub timed_out: usize,
}

impl BatchSummary {
    pub fn from_results(results: &[BatchItemResult]) -> Self {
        let mut summary = Self::default();
        for result in results {
            match &result.outcome {
                Ok(_) => summary.confirmed += 1,
                Err(BlockchainError::Dispatch { .. }) => summary.dispatch_failed += 1,
                Err(BlockchainError::Timeout { .. }) => summary.timed_out += 1,
                Err(_) => summary.transport_failed += 1,
            }
        }
        summary
    }

    pub fn all_confirmed(&self) -> bool {
        self.dispatch_failed == 0 && self.transport_failed == 0 && self.timed_out == 0
    }
}

/// Submit every call through `signer` and wait for each outcome.
///
/// Results are returned in input order. Failures are collected, not short-circuited.
pub async fn send_all_and_wait<T>(
    signer: &ProxyChainSigner<T>,
    calls: Vec<Call>,
    options: BatchOptions,
) -> Vec<BatchItemResult>
where
    T: ChainTransport + ?Sized,
{
    let total = calls.len();
    let max_in_flight = options.max_in_flight.max(1);
    tracing::info!(total, max_in_flight, first_nonce = signer.current_nonce(), "Submitting batch");

    let mut results: Vec<BatchItemResult> = stream::iter(calls.into_iter().enumerate())
        .map(|(index, call)| {
            let submission = signer.sign_and_send(call, options.tip);
            async move {
                match submission.await {
                    SubmitOutcome::Submitted(pending) => {
                        let nonce = pending.nonce;
                        let outcome = pending.wait(signer.tracker()).await;
                        BatchItemResult {
                            index,
                            nonce,
                            outcome,
                        }
                    }
                    SubmitOutcome::Failed { nonce, error } => BatchItemResult {
                        index,
                        nonce,
                        outcome: Err(error),
                    },
                }
            }
        })
        .buffer_unordered(max_in_flight)
        .collect()
        .await;

    results.sort_by_key(|r| r.index);

    let summary = BatchSummary::from_results(&results);
    tracing::info!(
        total,
        confirmed = summary.confirmed,
        dispatch_failed = summary.dispatch_failed,
        transport_failed = summary.transport_failed,
        timed_out = summary.timed_out,
        "Batch finished"
    );

    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(index: usize, outcome: BlockchainResult<B256>) -> BatchItemResult {
        BatchItemResult {
            index,
            nonce: index as u64,
            outcome,
        }
    }

    #[test]
    fn test_summary_counts_each_kind() {
        let results = vec![
            result(0, Ok(B256::ZERO)),
            result(1, Ok(B256::ZERO)),
            result(
                2,
                Err(BlockchainError::Dispatch {
                    block_hash: B256::ZERO,
                    module_error: crate::blockchain::types::ModuleError {
                        pallet: "Proxy".into(),
                        error: "NotProxy".into(),
                    },
                }),
            ),
            result(3, Err(BlockchainError::Timeout { timeout_ms: 10 })),
            result(4, Err(BlockchainError::Transport("closed".into()))),
        ];

        let summary = BatchSummary::from_results(&results);
        assert_eq!(
            summary,
            BatchSummary {
                confirmed: 2,
                dispatch_failed: 1,
                transport_failed: 1,
                timed_out: 1,
            }
        );
        assert!(!summary.all_confirmed());
        assert!(BatchSummary::from_results(&results[..2]).all_confirmed());
    }
}
