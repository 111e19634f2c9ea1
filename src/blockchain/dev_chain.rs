//! In-process development chain.
//!
//! Implements the transport traits against local state so signers and
//! trackers can run without a node:
//! - stale nonces and bad signatures are rejected at submission
//! - future nonces wait in the pool until the gap is filled
//! - proxy calls are checked hop by hop against registered delegations
//! - configured calls fail at dispatch with a module error
//!
//! Blocks are sealed on demand ([`DevChain::seal_block`]) or on an interval
//! ([`DevChain::spawn_block_production`]).

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use alloy::primitives::{keccak256, Address, B256};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::blockchain::extrinsic::SignedExtrinsic;
use crate::blockchain::metadata::ModuleErrorRegistry;
use crate::blockchain::transport::{
    AccountQuery, ChainTransport, ExtrinsicSubmitter, ModuleErrorResolver, StatusSubscription,
};
use crate::blockchain::types::{
    AccountState, BlockchainError, BlockchainResult, Call, DispatchError, ModuleError, ProxyType,
    TxStatus, TxStatusUpdate,
};
use crate::config::schema::{DevChainConfig, FailureRule};
use crate::lifecycle::Shutdown;

/// A registered delegation: `delegate` may act for `real`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyDefinition {
    pub real: Address,
    pub delegate: Address,
    pub proxy_type: ProxyType,
}

/// One extrinsic as included in a sealed block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludedExtrinsic {
    pub hash: B256,
    pub signer: Address,
    pub nonce: u64,
    pub dispatch_error: Option<DispatchError>,
}

/// Summary of a sealed block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBlock {
    pub number: u64,
    pub hash: B256,
    pub extrinsics: Vec<IncludedExtrinsic>,
}

struct PoolEntry {
    extrinsic: SignedExtrinsic,
    hash: B256,
    watcher: u64,
}

#[derive(Default)]
struct ChainState {
    accounts: HashMap<Address, AccountState>,
    /// Keyed by `(signer, nonce)` so each signer's entries iterate in nonce order.
    pool: BTreeMap<(Address, u64), PoolEntry>,
    watchers: HashMap<u64, mpsc::UnboundedSender<TxStatusUpdate>>,
    next_watcher: u64,
    block_number: u64,
    parent_hash: B256,
}

impl ChainState {
    fn nonce_of(&self, who: &Address) -> u64 {
        self.accounts.get(who).map(|a| a.nonce).unwrap_or_default()
    }

    /// Nonce that would be ready next for `who`, counting contiguous pool entries.
    fn ready_nonce(&self, who: &Address) -> u64 {
        let mut next = self.nonce_of(who);
        while self.pool.contains_key(&(*who, next)) {
            next += 1;
        }
        next
    }

    fn notify(&self, watcher: u64, update: TxStatusUpdate) {
        if let Some(sender) = self.watchers.get(&watcher) {
            let _ = sender.send(update);
        }
    }
}

/// Development chain implementing [`ChainTransport`].
pub struct DevChain {
    chain_id: u64,
    state: Arc<Mutex<ChainState>>,
    proxies: Vec<ProxyDefinition>,
    failures: Vec<FailureRule>,
    registry: ModuleErrorRegistry,
    shuffle_notifications: bool,
}

impl DevChain {
    /// Empty chain with the dev metadata registry.
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            state: Arc::new(Mutex::new(ChainState::default())),
            proxies: Vec::new(),
            failures: Vec::new(),
            registry: ModuleErrorRegistry::dev(),
            shuffle_notifications: false,
        }
    }

    /// Build from configuration. Addresses and proxy types are parsed here.
    pub fn from_config(config: &DevChainConfig, chain_id: u64) -> BlockchainResult<Self> {
        let mut chain =
            Self::new(chain_id).with_shuffled_notifications(config.shuffle_notifications);

        for account in &config.accounts {
            let address = parse_address(&account.address)?;
            chain = chain.with_account(address, AccountState::from(account.record.clone()));
        }

        for proxy in &config.proxies {
            chain = chain.with_proxy(ProxyDefinition {
                real: parse_address(&proxy.real)?,
                delegate: parse_address(&proxy.delegate)?,
                proxy_type: proxy.proxy_type.parse()?,
            });
        }

        for rule in &config.failures {
            chain = chain.with_failure(rule.clone());
        }

        Ok(chain)
    }

    pub fn with_account(self, address: Address, state: AccountState) -> Self {
        self.lock().accounts.insert(address, state);
        self
    }

    pub fn with_proxy(mut self, definition: ProxyDefinition) -> Self {
        self.proxies.push(definition);
        self
    }

    pub fn with_failure(mut self, rule: FailureRule) -> Self {
        self.failures.push(rule);
        self
    }

    pub fn with_shuffled_notifications(mut self, shuffle: bool) -> Self {
        self.shuffle_notifications = shuffle;
        self
    }

    fn lock(&self) -> MutexGuard<'_, ChainState> {
        // A panic while holding the lock leaves plain data behind; keep using it.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn account(&self, address: Address) -> AccountState {
        self.lock().accounts.get(&address).copied().unwrap_or_default()
    }

    pub fn block_number(&self) -> u64 {
        self.lock().block_number
    }

    pub fn pool_len(&self) -> usize {
        self.lock().pool.len()
    }

    /// Number of status subscriptions not yet released.
    pub fn active_watchers(&self) -> usize {
        self.lock().watchers.len()
    }

    /// Include every ready extrinsic in a new block and notify watchers.
    pub fn seal_block(&self) -> SealedBlock {
        let mut state = self.lock();

        let mut included = Vec::new();
        let keys: Vec<(Address, u64)> = state.pool.keys().copied().collect();
        for key in keys {
            let (signer, nonce) = key;
            if nonce != state.nonce_of(&signer) {
                continue;
            }
            let Some(entry) = state.pool.remove(&key) else {
                continue;
            };
            state.accounts.entry(signer).or_default().nonce = nonce + 1;

            let dispatch_error = self.dispatch(signer, &entry.extrinsic.call).err();
            included.push((entry, dispatch_error));
        }

        state.block_number += 1;
        let number = state.block_number;
        let mut preimage = Vec::with_capacity(40 + included.len() * 32);
        preimage.extend_from_slice(state.parent_hash.as_slice());
        preimage.extend_from_slice(&number.to_be_bytes());
        for (entry, _) in &included {
            preimage.extend_from_slice(entry.hash.as_slice());
        }
        let hash = keccak256(preimage);
        state.parent_hash = hash;

        let mut notifications: Vec<(u64, Option<DispatchError>)> = included
            .iter()
            .map(|(entry, dispatch_error)| (entry.watcher, *dispatch_error))
            .collect();
        if self.shuffle_notifications {
            notifications.shuffle(&mut rand::thread_rng());
        }
        for (watcher, dispatch_error) in &notifications {
            let mut update = TxStatusUpdate::new(TxStatus::InBlock(hash));
            update.dispatch_error = *dispatch_error;
            state.notify(*watcher, update);
        }
        for (watcher, dispatch_error) in notifications {
            let mut update = TxStatusUpdate::new(TxStatus::Finalized(hash));
            update.dispatch_error = dispatch_error;
            state.notify(watcher, update);
        }

        let extrinsics: Vec<IncludedExtrinsic> = included
            .into_iter()
            .map(|(entry, dispatch_error)| IncludedExtrinsic {
                hash: entry.hash,
                signer: entry.extrinsic.signer,
                nonce: entry.extrinsic.nonce,
                dispatch_error,
            })
            .collect();

        tracing::debug!(
            block_number = number,
            block_hash = %hash,
            extrinsics = extrinsics.len(),
            pending = state.pool.len(),
            "Sealed block"
        );

        SealedBlock {
            number,
            hash,
            extrinsics,
        }
    }

    /// Seal a block every `block_time` until `shutdown` is triggered.
    pub fn spawn_block_production(
        self: &Arc<Self>,
        block_time: Duration,
        shutdown: &Shutdown,
    ) -> JoinHandle<()> {
        let chain = Arc::clone(self);
        let mut shutdown = shutdown.listen();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(block_time);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        chain.seal_block();
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!("Block production stopped");
                        break;
                    }
                }
            }
        })
    }

    /// Apply `call` as `origin`.
    fn dispatch(&self, origin: Address, call: &Call) -> Result<(), DispatchError> {
        match call {
            Call::Proxy {
                real,
                force_proxy_type,
                call,
            } => {
                let allowed = self.proxies.iter().any(|p| {
                    p.real == *real
                        && p.delegate == origin
                        && p.proxy_type.permits(*force_proxy_type)
                });
                if !allowed {
                    return Err(self.named_error("Proxy", "NotProxy"));
                }
                self.dispatch(*real, call)
            }
            Call::Runtime { pallet, method, .. } => match self
                .failures
                .iter()
                .find(|rule| &rule.pallet == pallet && &rule.method == method)
            {
                Some(rule) => Err(DispatchError {
                    module_index: rule.module_index,
                    error_index: rule.error_index,
                }),
                None => Ok(()),
            },
        }
    }

    fn named_error(&self, pallet: &str, error: &str) -> DispatchError {
        let (module_index, error_index) = self.registry.lookup(pallet, error).unwrap_or((0, 0));
        DispatchError {
            module_index,
            error_index,
        }
    }
}

fn parse_address(value: &str) -> BlockchainResult<Address> {
    value
        .parse()
        .map_err(|e| BlockchainError::Configuration(format!("Invalid address '{}': {}", value, e)))
}

fn release_watcher(state: &Weak<Mutex<ChainState>>, id: u64) {
    if let Some(state) = state.upgrade() {
        let mut state = state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        state.watchers.remove(&id);
    }
}

#[async_trait]
impl AccountQuery for DevChain {
    async fn account_nonce(&self, address: Address) -> BlockchainResult<u64> {
        Ok(self.lock().nonce_of(&address))
    }
}

#[async_trait]
impl ExtrinsicSubmitter for DevChain {
    async fn submit_and_watch(
        &self,
        extrinsic: SignedExtrinsic,
    ) -> BlockchainResult<StatusSubscription> {
        if extrinsic.chain_id != self.chain_id {
            return Err(BlockchainError::Transport(format!(
                "1010: Invalid Transaction: wrong chain id {}",
                extrinsic.chain_id
            )));
        }
        extrinsic.verify()?;

        let hash = extrinsic.hash();
        let key = (extrinsic.signer, extrinsic.nonce);
        let mut state = self.lock();

        if extrinsic.nonce < state.nonce_of(&extrinsic.signer) {
            return Err(BlockchainError::Transport(
                "1010: Invalid Transaction: Transaction is outdated".to_string(),
            ));
        }
        // The account nonce after inclusion must still fit.
        if extrinsic.nonce == u64::MAX {
            return Err(BlockchainError::Transport(
                "1010: Invalid Transaction: Nonce out of range".to_string(),
            ));
        }

        if let Some(existing) = state.pool.get(&key) {
            if extrinsic.tip <= existing.extrinsic.tip {
                return Err(BlockchainError::Transport(
                    "1014: Priority is too low".to_string(),
                ));
            }
        }

        let id = state.next_watcher;
        state.next_watcher += 1;
        let (sender, receiver) = mpsc::unbounded_channel();
        state.watchers.insert(id, sender);

        let status = if extrinsic.nonce <= state.ready_nonce(&extrinsic.signer) {
            TxStatus::Ready
        } else {
            TxStatus::Future
        };

        if let Some(replaced) = state.pool.insert(
            key,
            PoolEntry {
                extrinsic,
                hash,
                watcher: id,
            },
        ) {
            tracing::debug!(
                replaced = %replaced.hash,
                by = %hash,
                "Pool entry replaced by higher tip"
            );
            state.notify(replaced.watcher, TxStatusUpdate::new(TxStatus::Usurped(hash)));
        }
        state.notify(id, TxStatusUpdate::new(status));

        tracing::debug!(
            tx_hash = %hash,
            signer = %key.0,
            nonce = key.1,
            ?status,
            "Extrinsic accepted into pool"
        );

        let weak = Arc::downgrade(&self.state);
        Ok(StatusSubscription::new(id, receiver, move || {
            release_watcher(&weak, id)
        }))
    }
}

impl ModuleErrorResolver for DevChain {
    fn resolve_module_error(&self, module_index: u8, error_index: u8) -> Option<ModuleError> {
        self.registry.resolve_module_error(module_index, error_index)
    }
}

impl ChainTransport for DevChain {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }
}
