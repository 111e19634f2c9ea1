//! Collaborator interfaces consumed by the signer and the confirmation tracker.
//!
//! # Responsibilities
//! - Query the account nonce once at signer construction
//! - Submit a signed extrinsic and push its status updates to a subscription
//! - Resolve raw dispatch errors through the chain metadata
//!
//! A connection is shared (`Arc`) by every signer and tracker using it.

use std::fmt;

use alloy::primitives::Address;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::blockchain::extrinsic::SignedExtrinsic;
use crate::blockchain::types::{BlockchainResult, DispatchError, ModuleError, TxStatusUpdate};

/// Account state lookups.
#[async_trait]
pub trait AccountQuery: Send + Sync {
    /// Next nonce the chain expects from `address`.
    async fn account_nonce(&self, address: Address) -> BlockchainResult<u64>;
}

/// Submit-and-watch primitive.
#[async_trait]
pub trait ExtrinsicSubmitter: Send + Sync {
    /// Submit and subscribe to status updates.
    ///
    /// An `Err` means the node rejected the extrinsic outright.
    async fn submit_and_watch(&self, extrinsic: SignedExtrinsic)
        -> BlockchainResult<StatusSubscription>;
}

/// Metadata lookup for `{module_index, error_index}` pairs.
pub trait ModuleErrorResolver: Send + Sync {
    fn resolve_module_error(&self, module_index: u8, error_index: u8) -> Option<ModuleError>;

    /// Resolve, falling back to the raw indices.
    fn resolve(&self, raw: DispatchError) -> ModuleError {
        self.resolve_module_error(raw.module_index, raw.error_index)
            .unwrap_or_else(|| ModuleError::unresolved(raw))
    }
}

/// Everything a signer needs from a chain connection.
pub trait ChainTransport: AccountQuery + ExtrinsicSubmitter + ModuleErrorResolver {
    fn chain_id(&self) -> u64;
}

type UnsubscribeFn = Box<dyn FnOnce() + Send>;

/// Live status stream for one submitted extrinsic.
///
/// The unsubscribe callback runs exactly once: on the first call to
/// [`StatusSubscription::unsubscribe`], or on drop if it was never called.
pub struct StatusSubscription {
    id: u64,
    updates: mpsc::UnboundedReceiver<TxStatusUpdate>,
    unsubscribe: Option<UnsubscribeFn>,
}

impl StatusSubscription {
    pub fn new<F>(id: u64, updates: mpsc::UnboundedReceiver<TxStatusUpdate>, unsubscribe: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            id,
            updates,
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next status update, or `None` once the transport closed the stream.
    pub async fn next(&mut self) -> Option<TxStatusUpdate> {
        if self.unsubscribe.is_none() {
            return None;
        }
        self.updates.recv().await
    }

    pub fn is_active(&self) -> bool {
        self.unsubscribe.is_some()
    }

    /// Stop receiving updates. Calling this more than once is a no-op.
    pub fn unsubscribe(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            self.updates.close();
            unsubscribe();
            tracing::trace!(subscription_id = self.id, "Status subscription released");
        }
    }
}

impl Drop for StatusSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for StatusSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusSubscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
