//! Multi-hop proxy delegation.
//!
//! A chain is declared outer-to-inner: `"P1[:type],P2[:type],...,Pn[:type]"`.
//! The signer is a proxy of `P1`, `P1` is a proxy of `P2`, and so on; `Pn` is
//! the real account whose funds and permissions the inner call uses.
//!
//! ```text
//! wrap([P1..Pn], C) = proxy(P1, proxy(P2, ... proxy(Pn, C)))
//! ```

use std::fmt;
use std::str::FromStr;

use alloy::primitives::Address;
use serde::Serialize;

use crate::blockchain::types::{BlockchainError, BlockchainResult, Call, ProxyType};

/// One delegation hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProxyHop {
    pub address: Address,
    /// `None` means no type restriction.
    pub proxy_type: Option<ProxyType>,
}

impl ProxyHop {
    pub fn new(address: Address, proxy_type: Option<ProxyType>) -> Self {
        Self {
            address,
            proxy_type,
        }
    }
}

impl FromStr for ProxyHop {
    type Err = BlockchainError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let token = token.trim();
        if token.is_empty() {
            return Err(BlockchainError::Configuration(
                "Empty proxy hop in proxy chain".to_string(),
            ));
        }

        let mut parts = token.split(':');
        let address_part = parts.next().unwrap_or_default().trim();
        let type_part = parts.next().map(str::trim);
        if parts.next().is_some() {
            return Err(BlockchainError::Configuration(format!(
                "Proxy hop '{}' must be 'address[:type]'",
                token
            )));
        }

        let address: Address = address_part.parse().map_err(|e| {
            BlockchainError::Configuration(format!(
                "Invalid proxy address '{}': {}",
                address_part, e
            ))
        })?;

        let proxy_type = match type_part {
            None => None,
            Some("") => {
                return Err(BlockchainError::Configuration(format!(
                    "Proxy hop '{}' has an empty type",
                    token
                )))
            }
            Some(name) => Some(name.parse()?),
        };

        Ok(Self {
            address,
            proxy_type,
        })
    }
}

impl fmt::Display for ProxyHop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.proxy_type {
            Some(proxy_type) => write!(f, "{}:{}", self.address, proxy_type),
            None => write!(f, "{}", self.address),
        }
    }
}

/// Ordered, immutable list of proxy hops.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProxyChain {
    hops: Vec<ProxyHop>,
}

impl ProxyChain {
    pub fn new(hops: Vec<ProxyHop>) -> Self {
        Self { hops }
    }

    /// Parse `"addr[:type][,addr[:type]...]"`. An empty string is the empty chain.
    pub fn parse(config: &str) -> BlockchainResult<Self> {
        if config.trim().is_empty() {
            return Ok(Self::default());
        }

        let hops = config
            .split(',')
            .map(ProxyHop::from_str)
            .collect::<BlockchainResult<Vec<_>>>()?;

        Ok(Self { hops })
    }

    pub fn hops(&self) -> &[ProxyHop] {
        &self.hops
    }

    pub fn len(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    /// Account the wrapped call acts as.
    pub fn effective_account(&self, signer: Address) -> Address {
        self.hops.last().map(|hop| hop.address).unwrap_or(signer)
    }

    /// Nest `call` so the first hop is the outermost wrapper.
    pub fn wrap(&self, call: Call) -> Call {
        self.hops
            .iter()
            .rev()
            .fold(call, |inner, hop| Call::proxy(hop.address, hop.proxy_type, inner))
    }
}

impl FromStr for ProxyChain {
    type Err = BlockchainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ProxyChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, hop) in self.hops.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", hop)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    const P1: Address = address!("1111111111111111111111111111111111111111");
    const P2: Address = address!("2222222222222222222222222222222222222222");
    const P3: Address = address!("3333333333333333333333333333333333333333");
    const SIGNER: Address = address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266");

    fn config() -> String {
        format!("{}:Any,{}:Staking,{}", P1, P2, P3)
    }

    #[test]
    fn test_parse_preserves_declared_order() {
        let chain = ProxyChain::parse(&config()).unwrap();
        assert_eq!(
            chain.hops(),
            &[
                ProxyHop::new(P1, Some(ProxyType::Any)),
                ProxyHop::new(P2, Some(ProxyType::Staking)),
                ProxyHop::new(P3, None),
            ]
        );
    }

    #[test]
    fn test_wrap_first_hop_is_outermost() {
        let chain = ProxyChain::parse(&config()).unwrap();
        let call = Call::remark("inner");

        let expected = Call::proxy(
            P1,
            Some(ProxyType::Any),
            Call::proxy(P2, Some(ProxyType::Staking), Call::proxy(P3, None, call.clone())),
        );
        assert_eq!(chain.wrap(call), expected);
    }

    #[test]
    fn test_empty_chain_does_not_wrap() {
        let chain = ProxyChain::parse("").unwrap();
        assert!(chain.is_empty());

        let call = Call::remark("inner");
        assert_eq!(chain.wrap(call.clone()), call);
        assert_eq!(ProxyChain::parse("   ").unwrap(), ProxyChain::default());
    }

    #[test]
    fn test_effective_account() {
        let chain = ProxyChain::parse(&config()).unwrap();
        assert_eq!(chain.effective_account(SIGNER), P3);
        assert_eq!(ProxyChain::default().effective_account(SIGNER), SIGNER);
    }

    #[test]
    fn test_whitespace_around_tokens_is_ignored() {
        let chain = ProxyChain::parse(&format!(" {} : governance , {} ", P1, P2)).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.hops()[0].proxy_type, Some(ProxyType::Governance));
        assert_eq!(chain.hops()[1].proxy_type, None);
    }

    #[test]
    fn test_malformed_chains_are_configuration_errors() {
        let cases = [
            format!("{},,{}", P1, P2),
            format!("{}:Any:Staking", P1),
            format!("{}:", P1),
            format!("{}:Root", P1),
            "0x1234".to_string(),
            "not-an-address:Any".to_string(),
        ];

        for case in cases {
            let err = ProxyChain::parse(&case).unwrap_err();
            assert!(
                matches!(err, BlockchainError::Configuration(_)),
                "expected configuration error for {:?}, got {:?}",
                case,
                err
            );
        }
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        let chain = ProxyChain::parse(&config()).unwrap();
        let reparsed: ProxyChain = chain.to_string().parse().unwrap();
        assert_eq!(chain, reparsed);
    }
}
