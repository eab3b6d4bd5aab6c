//! Process-name rule, matched against the best-effort
//! `metadata.process_name` the inbound listener resolved via the local
//! process table. Never available on every platform, so a `None` never
//! matches rather than panicking.

use super::{Rule, RuleType};
use crate::types::Metadata;

pub struct ProcessRule {
	adapter: String,
	payload: String,
}

impl ProcessRule {
	pub fn new(payload: impl Into<String>, adapter: impl Into<String>) -> Self {
		ProcessRule { adapter: adapter.into(), payload: payload.into() }
	}
}

impl Rule for ProcessRule {
	fn rule_type(&self) -> RuleType {
		RuleType::Process
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
		metadata.process_name.as_deref().is_some_and(|name| name.eq_ignore_ascii_case(&self.payload))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::{Metadata, Network};

	#[test]
	fn matches_case_insensitively() {
		let rule = ProcessRule::new("curl", "proxy");
		let mut m = Metadata::new(Network::Tcp, "127.0.0.1:1".parse().unwrap(), "test");
		m.process_name = Some("CURL".into());
		assert!(rule.matches(&m));
	}

	#[test]
	fn unknown_process_never_matches() {
		let rule = ProcessRule::new("curl", "proxy");
		let m = Metadata::new(Network::Tcp, "127.0.0.1:1".parse().unwrap(), "test");
		assert!(!rule.matches(&m));
	}
}
