//! Proxy-chain extrinsic signer.
//!
//! Shared submission core for chain maintenance scripts: proxy-chain call
//! wrapping, ordered nonce allocation, and subscription-based confirmation
//! tracking.

pub mod blockchain;
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use blockchain::{
    wait_tx_done, BlockchainError, BlockchainResult, Call, ConfirmationTracker, ProxyChain,
    ProxyChainSigner, SubmitOutcome, Wallet,
};
pub use config::ToolConfig;
