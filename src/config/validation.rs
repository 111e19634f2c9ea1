//! Configuration validation.
//!
//! Serde handles syntax; this module checks values: timeouts and limits are
//! non-zero, the proxy chain parses, and every address and proxy type in the
//! dev chain section is well formed. All problems are reported, not just the
//! first.

use std::fmt;

use alloy::primitives::Address;

use crate::blockchain::proxy_chain::ProxyChain;
use crate::blockchain::types::ProxyType;
use crate::config::schema::ToolConfig;

/// One semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: String, value: &str) {
    if let Err(e) = value.parse::<Address>() {
        errors.push(ValidationError::new(field, format!("invalid address '{}': {}", value, e)));
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ToolConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.signer.confirmation_timeout_ms == 0 {
        errors.push(ValidationError::new(
            "signer.confirmation_timeout_ms",
            "must be greater than zero",
        ));
    }

    if let Err(e) = ProxyChain::parse(&config.signer.proxy_chain) {
        errors.push(ValidationError::new("signer.proxy_chain", e.to_string()));
    }

    if config.signer.private_key_env.trim().is_empty() {
        errors.push(ValidationError::new("signer.private_key_env", "must not be empty"));
    }

    if config.batch.max_in_flight == 0 {
        errors.push(ValidationError::new("batch.max_in_flight", "must be greater than zero"));
    }

    if config.dev_chain.block_time_ms == 0 {
        errors.push(ValidationError::new("dev_chain.block_time_ms", "must be greater than zero"));
    }

    for (i, account) in config.dev_chain.accounts.iter().enumerate() {
        check_address(&mut errors, format!("dev_chain.accounts[{}].address", i), &account.address);
    }

    for (i, proxy) in config.dev_chain.proxies.iter().enumerate() {
        check_address(&mut errors, format!("dev_chain.proxies[{}].real", i), &proxy.real);
        check_address(&mut errors, format!("dev_chain.proxies[{}].delegate", i), &proxy.delegate);
        if let Err(e) = proxy.proxy_type.parse::<ProxyType>() {
            errors.push(ValidationError::new(
                format!("dev_chain.proxies[{}].proxy_type", i),
                e.to_string(),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
