//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML files and
//! every section has defaults, so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::blockchain::types::AccountRecord;
use crate::blockchain::wallet::PRIVATE_KEY_ENV_VAR;

/// Moonbase-style development chain id.
pub const DEFAULT_CHAIN_ID: u64 = 1281;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ToolConfig {
    /// Signing identity and proxy chain.
    pub signer: SignerConfig,

    /// Batch submission limits.
    pub batch: BatchConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// In-process development chain.
    pub dev_chain: DevChainConfig,
}

/// Signer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SignerConfig {
    /// Proxy chain, `"addr[:type][,addr[:type]...]"`, outermost hop first.
    pub proxy_chain: String,

    /// Environment variable holding the hex private key.
    pub private_key_env: String,

    /// Chain id the signatures commit to.
    pub chain_id: u64,

    /// Tip added to every submission.
    pub tip: u64,

    /// Time to wait for inclusion before reporting a timeout.
    pub confirmation_timeout_ms: u64,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            proxy_chain: String::new(),
            private_key_env: PRIVATE_KEY_ENV_VAR.to_string(),
            chain_id: DEFAULT_CHAIN_ID,
            tip: 0,
            confirmation_timeout_ms: 120_000,
        }
    }
}

/// Batch submission configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum number of submitted but unconfirmed extrinsics.
    pub max_in_flight: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { max_in_flight: 16 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Development chain configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DevChainConfig {
    /// Interval between sealed blocks in milliseconds.
    pub block_time_ms: u64,

    /// Deliver notifications within a block in random order.
    pub shuffle_notifications: bool,

    /// Genesis account state.
    pub accounts: Vec<GenesisAccount>,

    /// Registered proxy delegations.
    pub proxies: Vec<ProxyDefinitionConfig>,

    /// Calls that fail at dispatch.
    pub failures: Vec<FailureRule>,
}

impl Default for DevChainConfig {
    fn default() -> Self {
        Self {
            block_time_ms: 500,
            shuffle_notifications: false,
            accounts: Vec::new(),
            proxies: Vec::new(),
            failures: Vec::new(),
        }
    }
}

/// Genesis entry; the account record may use either historical layout.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenesisAccount {
    pub address: String,

    #[serde(flatten)]
    pub record: AccountRecord,
}

/// `delegate` may act for `real` with calls of `proxy_type`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProxyDefinitionConfig {
    pub real: String,
    pub delegate: String,
    #[serde(default = "default_proxy_type")]
    pub proxy_type: String,
}

fn default_proxy_type() -> String {
    "Any".to_string()
}

/// Dispatch of `pallet.method` fails with the given module error.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FailureRule {
    pub pallet: String,
    pub method: String,
    pub module_index: u8,
    pub error_index: u8,
}
