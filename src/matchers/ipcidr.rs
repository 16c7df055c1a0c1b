//! IP address and CIDR block targets (`S@10.0.0.0/24`, `S@10.0.0.5`).
//!
//! A minion matches when its `ipv4` (or `ipv6`) grain lists an address
//! equal to the target address or inside the target network.

use std::net::IpAddr;
use std::str::FromStr;

use serde_json::Value;

use crate::error::TargetError;

/// A parsed IP target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpTarget {
    Address(IpAddr),
    Network { base: IpAddr, prefix: u8 },
}

impl IpTarget {
    /// The grain holding addresses of this target's family.
    pub fn grain_key(&self) -> &'static str {
        let addr = match self {
            IpTarget::Address(addr) => addr,
            IpTarget::Network { base, .. } => base,
        };
        match addr {
            IpAddr::V4(_) => "ipv4",
            IpAddr::V6(_) => "ipv6",
        }
    }

    pub fn contains(&self, candidate: &IpAddr) -> bool {
        match self {
            IpTarget::Address(addr) => addr == candidate,
            IpTarget::Network { base, prefix } => match (base, candidate) {
                (IpAddr::V4(base), IpAddr::V4(candidate)) => {
                    let mask = prefix_mask(*prefix, 32) as u32;
                    u32::from(*base) & mask == u32::from(*candidate) & mask
                }
                (IpAddr::V6(base), IpAddr::V6(candidate)) => {
                    let mask = prefix_mask(*prefix, 128);
                    u128::from(*base) & mask == u128::from(*candidate) & mask
                }
                _ => false,
            },
        }
    }

    /// Whether any address listed in the grains document falls in this
    /// target. Unparseable entries are skipped.
    pub fn matches_grains(&self, grains: &Value) -> bool {
        let Some(addrs) = grains.get(self.grain_key()).and_then(Value::as_array) else {
            return false;
        };
        addrs
            .iter()
            .filter_map(Value::as_str)
            .filter_map(|addr| IpAddr::from_str(addr.trim()).ok())
            .any(|addr| self.contains(&addr))
    }
}

impl FromStr for IpTarget {
    type Err = TargetError;

    /// Networks must not have host bits set (`10.0.0.1/24` is rejected).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(addr) = IpAddr::from_str(s) {
            return Ok(IpTarget::Address(addr));
        }

        let invalid = || TargetError::InvalidIpTarget(s.to_string());
        let (base, prefix) = s.split_once('/').ok_or_else(invalid)?;
        let base = IpAddr::from_str(base).map_err(|_| invalid())?;
        let prefix: u8 = prefix.parse().map_err(|_| invalid())?;

        let host_bits_clear = match base {
            IpAddr::V4(v4) if prefix <= 32 => {
                u32::from(v4) & !(prefix_mask(prefix, 32) as u32) == 0
            }
            IpAddr::V6(v6) if prefix <= 128 => u128::from(v6) & !prefix_mask(prefix, 128) == 0,
            _ => return Err(invalid()),
        };
        if !host_bits_clear {
            return Err(invalid());
        }
        Ok(IpTarget::Network { base, prefix })
    }
}

fn prefix_mask(prefix: u8, width: u32) -> u128 {
    let prefix = u32::from(prefix).min(width);
    if prefix == 0 {
        return 0;
    }
    let ones = u128::MAX << (128 - prefix);
    ones >> (128 - width)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use yare::parameterized;

    fn grains() -> Value {
        json!({
            "ipv4": ["127.0.0.1", "10.1.2.3", "garbage"],
            "ipv6": ["::1", "fe80::1"],
        })
    }

    #[parameterized(
        exact_address = { "10.1.2.3", true },
        other_address = { "10.1.2.4", false },
        network = { "10.1.0.0/16", true },
        narrow_network = { "10.1.3.0/24", false },
        host_route = { "10.1.2.3/32", true },
        everything = { "0.0.0.0/0", true },
        v6_address = { "fe80::1", true },
        v6_network = { "fe80::/10", true },
        v6_miss = { "2001:db8::/32", false },
    )]
    fn test_matches_grains(target: &str, expected: bool) {
        let target: IpTarget = target.parse().unwrap();
        assert_eq!(target.matches_grains(&grains()), expected);
    }

    #[parameterized(
        host_bits = { "10.0.0.1/24" },
        prefix_too_long = { "10.0.0.0/33" },
        v6_prefix_too_long = { "::/129" },
        not_an_address = { "web1" },
        empty_prefix = { "10.0.0.0/" },
    )]
    fn test_invalid_targets(target: &str) {
        assert!(matches!(
            target.parse::<IpTarget>(),
            Err(TargetError::InvalidIpTarget(_))
        ));
    }

    #[test]
    fn test_missing_family_grain() {
        let target: IpTarget = "fe80::1".parse().unwrap();
        assert!(!target.matches_grains(&json!({"ipv4": ["10.0.0.1"]})));
    }

    #[test]
    fn test_families_do_not_mix() {
        let target: IpTarget = "0.0.0.0/0".parse().unwrap();
        assert!(!target.contains(&"::1".parse().unwrap()));
        assert_eq!(target.grain_key(), "ipv4");
    }
}
