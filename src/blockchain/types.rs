//! Chain-specific types and error definitions.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Capability class restricting what a proxy may do on behalf of the real account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProxyType {
    Any,
    NonTransfer,
    Governance,
    Staking,
    CancelProxy,
    Balances,
    AuthorMapping,
    IdentityJudgement,
}

impl ProxyType {
    pub const ALL: [ProxyType; 8] = [
        ProxyType::Any,
        ProxyType::NonTransfer,
        ProxyType::Governance,
        ProxyType::Staking,
        ProxyType::CancelProxy,
        ProxyType::Balances,
        ProxyType::AuthorMapping,
        ProxyType::IdentityJudgement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyType::Any => "Any",
            ProxyType::NonTransfer => "NonTransfer",
            ProxyType::Governance => "Governance",
            ProxyType::Staking => "Staking",
            ProxyType::CancelProxy => "CancelProxy",
            ProxyType::Balances => "Balances",
            ProxyType::AuthorMapping => "AuthorMapping",
            ProxyType::IdentityJudgement => "IdentityJudgement",
        }
    }

    /// Whether a delegation registered with `self` satisfies a call forcing `requested`.
    pub fn permits(&self, requested: Option<ProxyType>) -> bool {
        match requested {
            None => true,
            Some(requested) => *self == ProxyType::Any || *self == requested,
        }
    }
}

impl fmt::Display for ProxyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProxyType {
    type Err = BlockchainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProxyType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| BlockchainError::Configuration(format!("Unknown proxy type '{}'", s)))
    }
}

/// A runtime call, either opaque or wrapped in a proxy authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Call {
    /// `proxy.proxy(real, force_proxy_type, call)`.
    Proxy {
        real: Address,
        force_proxy_type: Option<ProxyType>,
        call: Box<Call>,
    },
    /// Any other runtime call. Arguments are kept opaque.
    Runtime {
        pallet: String,
        method: String,
        #[serde(default)]
        args: serde_json::Value,
    },
}

impl Call {
    pub fn runtime(
        pallet: impl Into<String>,
        method: impl Into<String>,
        args: serde_json::Value,
    ) -> Self {
        Call::Runtime {
            pallet: pallet.into(),
            method: method.into(),
            args,
        }
    }

    /// `system.remark(message)`.
    pub fn remark(message: impl Into<String>) -> Self {
        Call::runtime("System", "remark", serde_json::json!({ "remark": message.into() }))
    }

    pub fn proxy(real: Address, force_proxy_type: Option<ProxyType>, call: Call) -> Self {
        Call::Proxy {
            real,
            force_proxy_type,
            call: Box::new(call),
        }
    }

    /// Number of proxy wrappers around the innermost call.
    pub fn proxy_depth(&self) -> usize {
        match self {
            Call::Proxy { call, .. } => 1 + call.proxy_depth(),
            Call::Runtime { .. } => 0,
        }
    }
}

/// Raw dispatch error as reported by the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DispatchError {
    pub module_index: u8,
    pub error_index: u8,
}

/// Dispatch error resolved against the metadata registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleError {
    pub pallet: String,
    pub error: String,
}

impl ModuleError {
    /// Fallback when the registry has no entry for the indices.
    pub fn unresolved(raw: DispatchError) -> Self {
        Self {
            pallet: format!("Module({})", raw.module_index),
            error: format!("Error({})", raw.error_index),
        }
    }
}

impl fmt::Display for ModuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.pallet, self.error)
    }
}

/// Lifecycle status pushed by the transport for a watched extrinsic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    /// Queued behind a nonce gap.
    Future,
    /// In the pool, ready for inclusion.
    Ready,
    Broadcast,
    InBlock(B256),
    /// The including block was reorganised away.
    Retracted(B256),
    Finalized(B256),
    /// Another extrinsic with the same nonce was included.
    Usurped(B256),
    Dropped,
    Invalid,
}

impl TxStatus {
    /// Block hash for statuses that mean the extrinsic is part of a block.
    pub fn included_in(&self) -> Option<B256> {
        match self {
            TxStatus::InBlock(hash) | TxStatus::Finalized(hash) => Some(*hash),
            _ => None,
        }
    }
}

/// One status notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxStatusUpdate {
    pub status: TxStatus,
    pub dispatch_error: Option<DispatchError>,
    pub internal_error: Option<String>,
}

impl TxStatusUpdate {
    pub fn new(status: TxStatus) -> Self {
        Self {
            status,
            dispatch_error: None,
            internal_error: None,
        }
    }

    pub fn with_dispatch_error(mut self, error: DispatchError) -> Self {
        self.dispatch_error = Some(error);
        self
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: TxStatus::Invalid,
            dispatch_error: None,
            internal_error: Some(message.into()),
        }
    }
}

/// Errors that can occur while building, submitting or confirming extrinsics.
#[derive(Debug, Error)]
pub enum BlockchainError {
    /// Malformed configuration (e.g. a proxy chain string).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Submission rejected by the node or network before inclusion.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Included in a block but the call failed. The fee was still paid.
    #[error("Dispatch failed in block {block_hash}: {module_error}")]
    Dispatch {
        block_hash: B256,
        module_error: ModuleError,
    },

    /// No terminal status before the deadline. The extrinsic may still land.
    #[error("Transaction not confirmed within {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    /// Invalid private key format or signing failure.
    #[error("Wallet error: {0}")]
    Wallet(String),
}

impl BlockchainError {
    /// True when the extrinsic's fate is unknown and chain state must be re-queried.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, BlockchainError::Timeout { .. })
    }

    /// True when the extrinsic was included and its fee spent.
    pub fn fee_spent(&self) -> bool {
        matches!(self, BlockchainError::Dispatch { .. })
    }
}

/// Result type for blockchain operations.
pub type BlockchainResult<T> = Result<T, BlockchainError>;

/// Account info as stored by the chain, in either historical layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AccountRecord {
    Current {
        nonce: u64,
        consumers: u32,
        providers: u32,
        sufficients: u32,
        #[serde(default)]
        free: u128,
    },
    Legacy {
        nonce: u64,
        refcount: u32,
        #[serde(default)]
        free: u128,
    },
}

/// Normalized account state used by everything past the decode boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccountState {
    pub nonce: u64,
    pub consumers: u32,
    pub providers: u32,
    pub free: u128,
}

impl From<AccountRecord> for AccountState {
    fn from(record: AccountRecord) -> Self {
        match record {
            AccountRecord::Current {
                nonce,
                consumers,
                providers,
                free,
                ..
            } => Self {
                nonce,
                consumers,
                providers,
                free,
            },
            // Legacy layout only tracked a single reference count.
            AccountRecord::Legacy {
                nonce,
                refcount,
                free,
            } => Self {
                nonce,
                consumers: refcount,
                providers: 1,
                free,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_type_parse_is_case_insensitive() {
        assert_eq!("staking".parse::<ProxyType>().unwrap(), ProxyType::Staking);
        assert_eq!("Any".parse::<ProxyType>().unwrap(), ProxyType::Any);
        assert_eq!(
            "NONTRANSFER".parse::<ProxyType>().unwrap(),
            ProxyType::NonTransfer
        );
        assert!("Root".parse::<ProxyType>().is_err());
    }

    #[test]
    fn test_proxy_type_permits() {
        assert!(ProxyType::Any.permits(Some(ProxyType::Staking)));
        assert!(ProxyType::Staking.permits(Some(ProxyType::Staking)));
        assert!(ProxyType::Staking.permits(None));
        assert!(!ProxyType::Staking.permits(Some(ProxyType::Governance)));
    }

    #[test]
    fn test_call_proxy_depth() {
        let inner = Call::remark("hi");
        let wrapped = Call::proxy(Address::ZERO, None, Call::proxy(Address::ZERO, None, inner));
        assert_eq!(wrapped.proxy_depth(), 2);
    }

    #[test]
    fn test_error_display() {
        let err = BlockchainError::Timeout { timeout_ms: 120_000 };
        assert_eq!(err.to_string(), "Transaction not confirmed within 120000 ms");
        assert!(err.is_ambiguous());

        let err = BlockchainError::Dispatch {
            block_hash: B256::ZERO,
            module_error: ModuleError {
                pallet: "Balances".into(),
                error: "InsufficientBalance".into(),
            },
        };
        assert!(err.to_string().contains("Balances.InsufficientBalance"));
        assert!(err.fee_spent());
        assert!(!err.is_ambiguous());
    }

    #[test]
    fn test_unresolved_module_error_keeps_indices() {
        let err = ModuleError::unresolved(DispatchError {
            module_index: 3,
            error_index: 2,
        });
        assert_eq!(err.to_string(), "Module(3).Error(2)");
    }

    #[test]
    fn test_account_record_versions_normalize() {
        let current: AccountRecord = serde_json::from_value(serde_json::json!({
            "nonce": 7, "consumers": 1, "providers": 2, "sufficients": 0
        }))
        .unwrap();
        let legacy: AccountRecord =
            serde_json::from_value(serde_json::json!({ "nonce": 4, "refcount": 3 })).unwrap();

        assert!(matches!(current, AccountRecord::Current { .. }));
        assert!(matches!(legacy, AccountRecord::Legacy { .. }));

        let current = AccountState::from(current);
        assert_eq!((current.nonce, current.consumers, current.providers), (7, 1, 2));

        let legacy = AccountState::from(legacy);
        assert_eq!((legacy.nonce, legacy.consumers, legacy.providers), (4, 3, 1));
    }
}
