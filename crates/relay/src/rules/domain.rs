//! Domain, domain-suffix, and domain-keyword rules, matched against
//! `metadata.host`. Unresolved hostnames never need a DNS lookup to test
//! against these, so `should_resolve_ip` is always false.

use super::{Rule, RuleType};
use crate::types::Metadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainKind {
	Exact,
	Suffix,
	Keyword,
}

pub struct DomainRule {
	adapter: String,
	payload: String,
	kind: DomainKind,
}

impl DomainRule {
	pub fn new(payload: impl Into<String>, adapter: impl Into<String>, kind: DomainKind) -> Self {
		DomainRule { adapter: adapter.into(), payload: payload.into().to_lowercase(), kind }
	}
}

impl Rule for DomainRule {
	fn rule_type(&self) -> RuleType {
		match self.kind {
			DomainKind::Exact => RuleType::Domain,
			DomainKind::Suffix => RuleType::DomainSuffix,
			DomainKind::Keyword => RuleType::DomainKeyword,
		}
	}

	fn payload(&self) -> &str {
		&self.payload
	}

	fn adapter(&self) -> &str {
		&self.adapter
	}

	fn should_resolve_ip(&self) -> bool {
		false
	}

	fn matches(&self, metadata: &Metadata) -> bool {
		let Some(host) = &metadata.host else { return false };
		let host = host.to_lowercase();
		match self.kind {
			DomainKind::Exact => host == self.payload,
			DomainKind::Suffix => host == self.payload || host.ends_with(&format!(".{}", self.payload)),
			DomainKind::Keyword => host.contains(&self.payload),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::{Metadata, Network};

	fn metadata_with_host(host: &str) -> Metadata {
		let mut m = Metadata::new(Network::Tcp, "127.0.0.1:1".parse().unwrap(), "test");
		m.host = Some(host.into());
		m
	}

	#[test]
	fn exact_requires_full_match() {
		let rule = DomainRule::new("example.com", "proxy", DomainKind::Exact);
		assert!(rule.matches(&metadata_with_host("example.com")));
		assert!(!rule.matches(&metadata_with_host("www.example.com")));
	}

	#[test]
	fn suffix_matches_subdomains_and_apex() {
		let rule = DomainRule::new("example.com", "proxy", DomainKind::Suffix);
		assert!(rule.matches(&metadata_with_host("example.com")));
		assert!(rule.matches(&metadata_with_host("api.example.com")));
		assert!(!rule.matches(&metadata_with_host("notexample.com")));
	}

	#[test]
	fn keyword_matches_anywhere() {
		let rule = DomainRule::new("ads", "reject", DomainKind::Keyword);
		assert!(rule.matches(&metadata_with_host("tracker.ads.example.com")));
		assert!(!rule.matches(&metadata_with_host("example.com")));
	}

	#[test]
	fn unresolved_host_never_matches() {
		let rule = DomainRule::new("example.com", "proxy", DomainKind::Exact);
		let m = Metadata::new(Network::Tcp, "127.0.0.1:1".parse().unwrap(), "test");
		assert!(!rule.matches(&m));
	}
}
