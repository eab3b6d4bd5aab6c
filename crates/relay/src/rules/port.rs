//! Port rule: payload `"a,b-c,.../..."` split on `/`, each segment on `-`.
//! `end == -1` denotes a singleton port rather than a range.

use super::{Rule, RuleError, RuleType};
use crate::types::Metadata;

const MAX_SEGMENTS: usize = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortType {
	Src,
	Dst,
	Inbound,
}

#[derive(Debug, Clone, Copy)]
struct PortRange {
	start: u16,
	end: i32,
}

pub struct PortRule {
	adapter: String,
	payload: String,
	port_type: PortType,
	ranges: Vec<PortRange>,
}

impl PortRule {
	/// Mirrors the upstream `NewPort`: empty segments are skipped, reversed
	/// ranges are normalized rather than rejected, and port values are not
	/// range-checked beyond the `u16` parse (the origin never validated a
	/// lower bound either).
	pub fn new(payload: &str, adapter: impl Into<String>, port_type: PortType) -> Result<Self, RuleError> {
		let segments: Vec<&str> = payload.split('/').collect();
		if segments.len() > MAX_SEGMENTS {
			return Err(RuleError::TooManyPorts);
		}

		let mut ranges = Vec::new();
		for segment in segments {
			if segment.is_empty() {
				continue;
			}
			let parts: Vec<&str> = segment.split('-').collect();
			if parts.len() > 2 {
				return Err(RuleError::InvalidPayload(payload.to_string()));
			}

			let start: u16 = parts[0]
				.trim_matches(|c: char| c == '[' || c == ']' || c.is_whitespace())
				.parse()
				.map_err(|_| RuleError::InvalidPayload(payload.to_string()))?;

			match parts.len() {
				1 => ranges.push(PortRange { start, end: -1 }),
				2 => {
					let end: u16 = parts[1]
						.trim_matches(|c: char| c == '[' || c == ']' || c.is_whitespace())
						.parse()
						.map_err(|_| RuleError::InvalidPayload(payload.to_string()))?;
					if start > end {
						ranges.push(PortRange { start: end, end: start as i32 });
					} else {
						ranges.push(PortRange { start, end: end as i32 });
					}
				},
				_ => unreachable!("split('-') bounded to at most 2 parts above"),
			}
		}

		if ranges.is_empty() {
			return Err(RuleError::InvalidPayload(payload.to_string()));
		}

		Ok(PortRule { adapter: adapter.into(), payload: payload.to_string(), port_type, ranges })
	}

	fn matches_port(&self, port: u16) -> bool {
		self.ranges.iter().any(|r| if r.end == -1 { port == r.start } else { (r.start..=r.end as u16).contains(&port) })
	}
}

impl Rule for PortRule {
	fn rule_type(&self) -> RuleType {
		match self.port_type {
			PortType::Src => RuleType::SrcPort,
			PortType::Dst => RuleType::DstPort,
			PortType::Inbound => RuleType::InboundPort,
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
		let port = match self.port_type {
			PortType::Src => metadata.src_addr.port(),
			PortType::Dst => metadata.dst_port,
			PortType::Inbound => metadata.origin_dst.map(|a| a.port()).unwrap_or(0),
		};
		self.matches_port(port)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::Network;

	#[test]
	fn singleton_and_range_match() {
		let rule = PortRule::new("80/443/8000-8100", "proxy", PortType::Dst).unwrap();
		assert!(rule.matches_port(80));
		assert!(rule.matches_port(443));
		assert!(rule.matches_port(8050));
		assert!(!rule.matches_port(8101));
	}

	#[test]
	fn reversed_range_is_normalized() {
		let rule = PortRule::new("100-50", "proxy", PortType::Dst).unwrap();
		assert!(rule.matches_port(75));
		assert!(rule.matches_port(50));
		assert!(rule.matches_port(100));
	}

	#[test]
	fn more_than_28_segments_is_rejected() {
		let payload = (0..29).map(|i| i.to_string()).collect::<Vec<_>>().join("/");
		let err = PortRule::new(&payload, "proxy", PortType::Dst).unwrap_err();
		assert!(matches!(err, RuleError::TooManyPorts));
	}

	#[test]
	fn matches_against_the_field_named_by_port_type() {
		let src: std::net::SocketAddr = "10.0.0.1:5000".parse().unwrap();
		let mut metadata = Metadata::new(Network::Tcp, src, "test");
		metadata.dst_port = 443;

		let src_rule = PortRule::new("5000", "proxy", PortType::Src).unwrap();
		assert!(src_rule.matches(&metadata));

		let dst_rule = PortRule::new("443", "proxy", PortType::Dst).unwrap();
		assert!(dst_rule.matches(&metadata));
		assert!(!dst_rule.matches(&{
			let mut m = metadata.clone();
			m.dst_port = 80;
			m
		}));
	}
}
