//! `RULE-SET` rule: the matched-against criteria live in a separately
//! fetched payload (reusing the same `Vehicle` a proxy provider uses)
//! rather than being declared inline, so the list can be hot-reloaded on
//! its own schedule. A classical-behavior set supports only the
//! domain/keyword/suffix/CIDR criteria, not nested `RULE-SET`/`MATCH`
//! entries — recursive rule-sets are out of scope here.

use std::str::FromStr;
use std::sync::Arc;

use arc_swap::ArcSwap;
use ipnet::IpNet;

use super::domain::DomainKind;
use super::{Rule, RuleType};
use crate::provider::{Vehicle, VehicleError};
use crate::types::Metadata;

#[derive(thiserror::Error, Debug)]
pub enum RuleSetError {
	#[error(transparent)]
	Vehicle(#[from] VehicleError),
	#[error("decode rule-set body: {0}")]
	Decode(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleSetBehavior {
	Domain,
	IpCidr,
	Classical,
}

enum MatchEntry {
	Domain { kind: DomainKind, pattern: String },
	IpCidr(IpNet),
}

impl MatchEntry {
	fn matches(&self, metadata: &Metadata) -> bool {
		match self {
			MatchEntry::Domain { kind, pattern } => {
				let Some(host) = &metadata.host else { return false };
				let host = host.to_lowercase();
				match kind {
					DomainKind::Exact => &host == pattern,
					DomainKind::Suffix => &host == pattern || host.ends_with(&format!(".{pattern}")),
					DomainKind::Keyword => host.contains(pattern.as_str()),
				}
			},
			MatchEntry::IpCidr(net) => metadata.dst_ip.is_some_and(|ip| net.contains(&ip)),
		}
	}
}

fn parse_domain_line(line: &str) -> MatchEntry {
	if let Some(suffix) = line.strip_prefix("+.") {
		MatchEntry::Domain { kind: DomainKind::Suffix, pattern: suffix.to_lowercase() }
	} else {
		MatchEntry::Domain { kind: DomainKind::Exact, pattern: line.to_lowercase() }
	}
}

fn parse_classical_line(line: &str) -> Option<MatchEntry> {
	let mut parts = line.splitn(2, ',');
	let kind = parts.next()?.trim();
	let payload = parts.next()?.trim();
	match kind {
		"DOMAIN" => Some(MatchEntry::Domain { kind: DomainKind::Exact, pattern: payload.to_lowercase() }),
		"DOMAIN-SUFFIX" => Some(MatchEntry::Domain { kind: DomainKind::Suffix, pattern: payload.to_lowercase() }),
		"DOMAIN-KEYWORD" => Some(MatchEntry::Domain { kind: DomainKind::Keyword, pattern: payload.to_lowercase() }),
		"IP-CIDR" | "IP-CIDR6" => IpNet::from_str(payload).ok().map(MatchEntry::IpCidr),
		_ => None,
	}
}

pub struct RuleSetProvider {
	name: String,
	vehicle: Vehicle,
	behavior: RuleSetBehavior,
	entries: ArcSwap<Vec<MatchEntry>>,
}

impl RuleSetProvider {
	pub fn new(name: impl Into<String>, vehicle: Vehicle, behavior: RuleSetBehavior) -> Self {
		RuleSetProvider { name: name.into(), vehicle, behavior, entries: ArcSwap::from_pointee(Vec::new()) }
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub async fn update(&self, client: &reqwest::Client) -> Result<(), RuleSetError> {
		let bytes = self.vehicle.fetch(client).await?;
		let doc: serde_yaml::Value = serde_yaml::from_slice(&bytes)?;
		let lines = doc.get("payload").and_then(|v| v.as_sequence()).cloned().unwrap_or_default();

		let mut entries = Vec::with_capacity(lines.len());
		for line in &lines {
			let Some(s) = line.as_str() else { continue };
			let entry = match self.behavior {
				RuleSetBehavior::Domain => Some(parse_domain_line(s)),
				RuleSetBehavior::IpCidr => IpNet::from_str(s).ok().map(MatchEntry::IpCidr),
				RuleSetBehavior::Classical => parse_classical_line(s),
			};
			entries.extend(entry);
		}

		self.entries.store(Arc::new(entries));
		Ok(())
	}

	fn matches(&self, metadata: &Metadata) -> bool {
		self.entries.load().iter().any(|e| e.matches(metadata))
	}
}

pub struct RuleSetRule {
	name: String,
	adapter: String,
	no_resolve: bool,
	provider: Arc<RuleSetProvider>,
}

impl RuleSetRule {
	pub fn new(adapter: impl Into<String>, no_resolve: bool, provider: Arc<RuleSetProvider>) -> Self {
		RuleSetRule { name: provider.name().to_string(), adapter: adapter.into(), no_resolve, provider }
	}
}

impl Rule for RuleSetRule {
	fn rule_type(&self) -> RuleType {
		RuleType::RuleSet
	}

	fn payload(&self) -> &str {
		&self.name
	}

	fn adapter(&self) -> &str {
		&self.adapter
	}

	fn should_resolve_ip(&self) -> bool {
		!self.no_resolve && self.provider.behavior != RuleSetBehavior::Domain
	}

	fn matches(&self, metadata: &Metadata) -> bool {
		self.provider.matches(metadata)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::{Metadata, Network};

	#[tokio::test]
	async fn domain_behavior_parses_wildcard_and_exact_lines() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("set.yaml");
		tokio::fs::write(&path, b"payload:\n  - '+.example.com'\n  - blocked.net\n").await.unwrap();

		let provider = RuleSetProvider::new("ads", Vehicle::File { path }, RuleSetBehavior::Domain);
		provider.update(&reqwest::Client::new()).await.unwrap();

		let mut m = Metadata::new(Network::Tcp, "127.0.0.1:1".parse().unwrap(), "test");
		m.host = Some("api.example.com".into());
		assert!(provider.matches(&m));

		m.host = Some("blocked.net".into());
		assert!(provider.matches(&m));

		m.host = Some("other.com".into());
		assert!(!provider.matches(&m));
	}

	#[tokio::test]
	async fn rule_set_rule_resolve_ip_depends_on_behavior() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("set.yaml");
		tokio::fs::write(&path, b"payload: []").await.unwrap();

		let domain_provider = Arc::new(RuleSetProvider::new("d", Vehicle::File { path: path.clone() }, RuleSetBehavior::Domain));
		let domain_rule = RuleSetRule::new("proxy", false, domain_provider);
		assert!(!domain_rule.should_resolve_ip());

		let cidr_provider = Arc::new(RuleSetProvider::new("c", Vehicle::File { path }, RuleSetBehavior::IpCidr));
		let cidr_rule = RuleSetRule::new("proxy", false, cidr_provider);
		assert!(cidr_rule.should_resolve_ip());
	}
}
