//! The terminal `MATCH` rule: always fires, used as the last entry in a
//! rule list so every flow resolves to some adapter.

use super::{Rule, RuleType};
use crate::types::Metadata;

pub struct MatchAllRule {
	adapter: String,
}

impl MatchAllRule {
	pub fn new(adapter: impl Into<String>) -> Self {
		MatchAllRule { adapter: adapter.into() }
	}
}

impl Rule for MatchAllRule {
	fn rule_type(&self) -> RuleType {
		RuleType::Match
	}

	fn payload(&self) -> &str {
		""
	}

	fn adapter(&self) -> &str {
		&self.adapter
	}

	fn should_resolve_ip(&self) -> bool {
		false
	}

	fn matches(&self, _metadata: &Metadata) -> bool {
		true
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::{Metadata, Network};

	#[test]
	fn always_matches() {
		let rule = MatchAllRule::new("direct");
		let m = Metadata::new(Network::Tcp, "127.0.0.1:1".parse().unwrap(), "test");
		assert!(rule.matches(&m));
	}
}
