//! Pallet error registry decoded from chain metadata.

use std::collections::HashMap;

use crate::blockchain::transport::ModuleErrorResolver;
use crate::blockchain::types::ModuleError;

/// Error names of one pallet, in index order.
#[derive(Debug, Clone)]
pub struct PalletErrors {
    pub index: u8,
    pub name: String,
    pub errors: Vec<String>,
}

impl PalletErrors {
    pub fn new(index: u8, name: &str, errors: &[&str]) -> Self {
        Self {
            index,
            name: name.to_string(),
            errors: errors.iter().map(|e| e.to_string()).collect(),
        }
    }
}

/// Lookup table from `module_index` to pallet error names.
#[derive(Debug, Clone, Default)]
pub struct ModuleErrorRegistry {
    pallets: HashMap<u8, PalletErrors>,
}

impl ModuleErrorRegistry {
    pub fn new(pallets: impl IntoIterator<Item = PalletErrors>) -> Self {
        Self {
            pallets: pallets.into_iter().map(|p| (p.index, p)).collect(),
        }
    }

    /// Registry for the pallets the dev chain dispatches.
    pub fn dev() -> Self {
        Self::new([
            PalletErrors::new(
                0,
                "System",
                &[
                    "InvalidSpecName",
                    "SpecVersionNeedsToIncrease",
                    "FailedToExtractRuntimeVersion",
                    "NonDefaultComposite",
                    "NonZeroRefCount",
                    "CallFiltered",
                ],
            ),
            PalletErrors::new(
                3,
                "Balances",
                &[
                    "VestingBalance",
                    "LiquidityRestrictions",
                    "InsufficientBalance",
                    "ExistentialDeposit",
                    "Expendability",
                    "ExistingVestingSchedule",
                    "DeadAccount",
                    "TooManyReserves",
                ],
            ),
            PalletErrors::new(
                22,
                "Proxy",
                &[
                    "TooMany",
                    "NotFound",
                    "NotProxy",
                    "Unproxyable",
                    "Duplicate",
                    "NoPermission",
                    "Unannounced",
                    "NoSelfProxy",
                ],
            ),
        ])
    }

    /// Index pair for a named error, the inverse of resolution.
    pub fn lookup(&self, pallet: &str, error: &str) -> Option<(u8, u8)> {
        self.pallets.values().find(|p| p.name == pallet).and_then(|p| {
            p.errors
                .iter()
                .position(|e| e == error)
                .and_then(|i| u8::try_from(i).ok())
                .map(|i| (p.index, i))
        })
    }
}

impl ModuleErrorResolver for ModuleErrorRegistry {
    fn resolve_module_error(&self, module_index: u8, error_index: u8) -> Option<ModuleError> {
        let pallet = self.pallets.get(&module_index)?;
        let error = pallet.errors.get(error_index as usize)?;
        Some(ModuleError {
            pallet: pallet.name.clone(),
            error: error.clone(),
        })
    }
}
