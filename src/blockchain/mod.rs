//! Extrinsic submission subsystem.
//!
//! # Data Flow
//! ```text
//! proxy chain string ("addr[:type],...")
//!     → proxy_chain.rs (parse, outer-to-inner wrapping)
//!     → signer.rs (nonce allocation, wrap, sign, submit)
//!     → transport.rs (submit-and-watch, status subscription)
//!     → confirmation.rs (status stream + deadline → terminal outcome)
//! ```
//!
//! # Constraints
//! - One signer owns the nonce counter of one account
//! - Nonce allocation never suspends
//! - Every status subscription is released exactly once
//! - Private keys are never logged

pub mod batch;
pub mod confirmation;
pub mod dev_chain;
pub mod extrinsic;
pub mod metadata;
pub mod proxy_chain;
pub mod signer;
pub mod transport;
pub mod types;
pub mod wallet;

pub use confirmation::{wait_tx_done, ConfirmationTracker, DEFAULT_CONFIRMATION_TIMEOUT};
pub use dev_chain::DevChain;
pub use extrinsic::SignedExtrinsic;
pub use proxy_chain::{ProxyChain, ProxyHop};
pub use signer::{PendingTx, ProxyChainSigner, SubmitOutcome};
pub use transport::{ChainTransport, StatusSubscription};
pub use types::{BlockchainError, BlockchainResult, Call, ProxyType};
pub use wallet::Wallet;
