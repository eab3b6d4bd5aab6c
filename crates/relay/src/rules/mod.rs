//! The rule engine: an ordered list of match predicates, each naming the
//! adapter a flow should use when it fires. Evaluation is first-match-wins
//! with an implicit `MATCH` fallback (§4.4).

pub mod domain;
pub mod geoip;
pub mod ipcidr;
pub mod match_all;
pub mod port;
pub mod process;
pub mod ruleset;

use std::sync::Arc;

use crate::types::Metadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleType {
	Domain,
	DomainSuffix,
	DomainKeyword,
	IpCidr,
	GeoIp,
	SrcPort,
	DstPort,
	InboundPort,
	Process,
	RuleSet,
	Match,
}

#[derive(thiserror::Error, Debug)]
pub enum RuleError {
	#[error("invalid rule payload: {0}")]
	InvalidPayload(String),
	#[error("too many ports, maximum support 28")]
	TooManyPorts,
	#[error(transparent)]
	Geoip(#[from] geoip::GeoIpError),
	#[error(transparent)]
	RuleSet(#[from] ruleset::RuleSetError),
}

/// A single routing predicate. Implementors are immutable after
/// construction; a config reload builds a fresh rule list rather than
/// mutating these in place.
pub trait Rule: Send + Sync {
	fn rule_type(&self) -> RuleType;
	fn payload(&self) -> &str;
	fn adapter(&self) -> &str;
	/// If true, the dispatcher must resolve `metadata.host` to `dst_ip`
	/// before this rule's `matches` can be trusted.
	fn should_resolve_ip(&self) -> bool;
	fn matches(&self, metadata: &Metadata) -> bool;
}

/// Scans `rules` in declaration order and returns the first match, mirroring
/// the upstream `first match wins` evaluator. Callers are responsible for
/// resolving `metadata.dst_ip` ahead of any rule whose `should_resolve_ip`
/// is true (the dispatcher does this per §4.8, not this function, since DNS
/// resolution is async and this scan is not).
pub fn first_match<'a>(rules: &'a [Arc<dyn Rule>], metadata: &Metadata) -> Option<&'a Arc<dyn Rule>> {
	rules.iter().find(|rule| rule.matches(metadata))
}

#[cfg(test)]
mod tests {
	use std::net::SocketAddr;

	use super::*;
	use crate::rules::match_all::MatchAllRule;
	use crate::rules::port::{PortRule, PortType};
	use crate::types::{Network, Metadata};

	#[test]
	fn first_match_wins_over_terminal_match_all() {
		let src: SocketAddr = "127.0.0.1:1111".parse().unwrap();
		let port_rule: Arc<dyn Rule> = Arc::new(PortRule::new("1111", "port-adapter", PortType::Src).unwrap());
		let match_all: Arc<dyn Rule> = Arc::new(MatchAllRule::new("match-adapter"));
		let rules = vec![port_rule, match_all];

		let mut metadata = Metadata::new(Network::Tcp, src, "test");
		metadata.dst_port = 443;

		let hit = first_match(&rules, &metadata).expect("one rule always matches");
		assert_eq!(hit.adapter(), "port-adapter");
	}
}
