//! Shared utilities for integration tests.

use alloy::primitives::Address;
use proxy_signer::blockchain::dev_chain::{DevChain, ProxyDefinition};
use proxy_signer::blockchain::{ProxyType, Wallet};

pub const CHAIN_ID: u64 = 1281;

// Well-known development key (first Anvil account).
pub const TEST_PRIVATE_KEY: &str =
    "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

pub fn wallet() -> Wallet {
    Wallet::from_private_key(TEST_PRIVATE_KEY, CHAIN_ID).unwrap()
}

pub fn account(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

/// Dev chain where the test wallet proxies for `0x22..`, which proxies (Staking) for `0x33..`.
#[allow(dead_code)]
pub fn two_hop_chain() -> DevChain {
    DevChain::new(CHAIN_ID)
        .with_proxy(ProxyDefinition {
            real: account(0x22),
            delegate: wallet().address(),
            proxy_type: ProxyType::Any,
        })
        .with_proxy(ProxyDefinition {
            real: account(0x33),
            delegate: account(0x22),
            proxy_type: ProxyType::Staking,
        })
}

/// Seal blocks until `count` extrinsics have been included, yielding in between.
#[allow(dead_code)]
pub async fn seal_until_included(chain: &DevChain, count: usize) {
    let mut included = 0;
    while included < count {
        tokio::task::yield_now().await;
        included += chain.seal_block().extrinsics.len();
    }
}
