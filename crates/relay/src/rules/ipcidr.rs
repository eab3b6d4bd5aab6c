//! IP-CIDR rule, matched against `metadata.dst_ip` via `ipnet::IpNet`,
//! the same network-containment primitive the CEL `cidr()` function uses.

use std::str::FromStr;

use ipnet::IpNet;

use super::{Rule, RuleError, RuleType};
use crate::types::Metadata;

pub struct IpCidrRule {
	adapter: String,
	payload: String,
	net: IpNet,
	no_resolve: bool,
}

impl IpCidrRule {
	pub fn new(payload: &str, adapter: impl Into<String>, no_resolve: bool) -> Result<Self, RuleError> {
		let net = IpNet::from_str(payload).map_err(|_| RuleError::InvalidPayload(payload.to_string()))?;
		Ok(IpCidrRule { adapter: adapter.into(), payload: payload.to_string(), net, no_resolve })
	}
}

impl Rule for IpCidrRule {
	fn rule_type(&self) -> RuleType {
		RuleType::IpCidr
	}

	fn payload(&self) -> &str {
		&self.payload
	}

	fn adapter(&self) -> &str {
		&self.adapter
	}

	fn should_resolve_ip(&self) -> bool {
		!self.no_resolve
	}

	fn matches(&self, metadata: &Metadata) -> bool {
		metadata.dst_ip.is_some_and(|ip| self.net.contains(&ip))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::{Metadata, Network};

	fn metadata_with_ip(ip: &str) -> Metadata {
		let mut m = Metadata::new(Network::Tcp, "127.0.0.1:1".parse().unwrap(), "test");
		m.dst_ip = Some(ip.parse().unwrap());
		m
	}

	#[test]
	fn contains_checks_the_network() {
		let rule = IpCidrRule::new("10.0.0.0/8", "proxy", false).unwrap();
		assert!(rule.matches(&metadata_with_ip("10.1.2.3")));
		assert!(!rule.matches(&metadata_with_ip("11.1.2.3")));
	}

	#[test]
	fn unresolved_destination_never_matches() {
		let rule = IpCidrRule::new("10.0.0.0/8", "proxy", false).unwrap();
		let m = Metadata::new(Network::Tcp, "127.0.0.1:1".parse().unwrap(), "test");
		assert!(!rule.matches(&m));
	}

	#[test]
	fn no_resolve_flag_suppresses_should_resolve_ip() {
		assert!(IpCidrRule::new("10.0.0.0/8", "proxy", false).unwrap().should_resolve_ip());
		assert!(!IpCidrRule::new("10.0.0.0/8", "proxy", true).unwrap().should_resolve_ip());
	}
}
