//! Tunnel dispatcher (C9): turns an accepted connection's `Metadata` into
//! a chosen adapter and splices bytes between the two ends. Per accepted
//! connection: resolve what the matching rule needs, walk the rule list,
//! dial, splice, close on either side's EOF/error (§4.8).

mod registry;

pub use registry::AdapterRegistry;

use std::sync::Arc;

use relay_core::copy::{self, ConnectionResult};

use crate::adapter::{AdapterError, Conn, PacketConn, ProxyAdapter};
use crate::dns::resolver::{DnsError, Resolver};
use crate::rules::Rule;
use crate::rules::domain::DomainRule;
use crate::types::{Metadata, Network};

#[derive(thiserror::Error, Debug)]
pub enum DispatchError {
	#[error("proxy adapter {0} not found")]
	ProxyNotFound(String),
	#[error("udp not supported by adapter {0}")]
	UdpNotSupported(String),
	#[error(transparent)]
	Dns(#[from] DnsError),
	#[error(transparent)]
	Adapter(#[from] AdapterError),
	#[error(transparent)]
	Copy(#[from] copy::CopyError),
}

/// Default adapter name used when no rule matches, mirroring the
/// upstream fallback of routing unmatched flows direct rather than
/// failing the connection outright.
const DIRECT_FALLBACK: &str = "DIRECT";

pub enum UdpOutcome {
	Conn(Box<dyn PacketConn>),
	/// The matched adapter lacks UDP support and wasn't covered by
	/// `udp_fallback_match`; the caller should redispatch via `handle_tcp`
	/// with this rewritten metadata instead.
	RewrittenToTcp(Metadata),
}

pub struct Dispatcher {
	rules: Vec<Arc<dyn Rule>>,
	registry: Arc<AdapterRegistry>,
	resolver: Arc<Resolver>,
	/// Hosts matching one of these force a UDP request to fail outright
	/// when the chosen adapter lacks UDP support, instead of silently
	/// retrying over TCP.
	udp_fallback_match: Vec<DomainRule>,
}

impl Dispatcher {
	pub fn new(rules: Vec<Arc<dyn Rule>>, registry: Arc<AdapterRegistry>, resolver: Arc<Resolver>, udp_fallback_match: Vec<DomainRule>) -> Self {
		Dispatcher { rules, registry, resolver, udp_fallback_match }
	}

	/// Resolves `metadata.dst_ip` when the matching rule (or the adapter it
	/// names) needs an IP, then returns that rule's adapter name. Mirrors
	/// step 2-3 of §4.8: resolution happens lazily, rule by rule, rather
	/// than once up front, since only rules before the eventual match can
	/// ever need it.
	async fn select_adapter(&self, metadata: &mut Metadata) -> Result<Arc<dyn ProxyAdapter>, DispatchError> {
		for rule in &self.rules {
			if rule.should_resolve_ip() && metadata.dst_ip.is_none() {
				if let Some(host) = metadata.host.clone() {
					match self.resolver.resolve_host(&host, metadata).await {
						Ok(ip) => metadata.dst_ip = Some(ip),
						Err(e) => tracing::debug!(target: "relay::dispatcher", %host, error = %e, "pre-match resolve failed"),
					}
				}
			}
			if rule.matches(metadata) {
				return self.resolve_adapter(rule.adapter(), metadata).await;
			}
		}
		self.resolve_adapter(DIRECT_FALLBACK, metadata).await
	}

	async fn resolve_adapter(&self, name: &str, metadata: &mut Metadata) -> Result<Arc<dyn ProxyAdapter>, DispatchError> {
		let adapter = self.registry.find(name).ok_or_else(|| DispatchError::ProxyNotFound(name.to_string()))?;
		if !adapter.disable_dns_resolve() && metadata.dst_ip.is_none() {
			if let Some(host) = metadata.host.clone() {
				let ip = self.resolver.resolve_host(&host, metadata).await?;
				metadata.dst_ip = Some(ip);
			}
		}
		Ok(adapter)
	}

	/// Dials the matched adapter and splices `inbound` against it until
	/// either side closes.
	pub async fn handle_tcp(&self, mut metadata: Metadata, inbound: Conn) -> Result<ConnectionResult, DispatchError> {
		let adapter = self.select_adapter(&mut metadata).await?;
		tracing::debug!(target: "relay::dispatcher", adapter = adapter.name(), remote = %metadata, "dialing");
		let outbound = adapter.dial_tcp(&metadata).await?;
		let result = copy::copy_bidirectional(inbound, outbound).await?;
		tracing::debug!(
			target: "relay::dispatcher",
			adapter = adapter.name(),
			remote = %metadata,
			sent = result.client_to_upstream,
			received = result.upstream_to_client,
			"closed"
		);
		Ok(result)
	}

	/// Step 4 of §4.8: when the chosen adapter can't carry UDP, either fail
	/// outright (`udp_fallback_match` matched) or rewrite the flow to TCP
	/// and hand it back for the caller to redispatch as `handle_tcp`.
	pub async fn handle_udp(&self, mut metadata: Metadata) -> Result<UdpOutcome, DispatchError> {
		let adapter = self.select_adapter(&mut metadata).await?;
		if !adapter.supports_udp() {
			if self.udp_fallback_match.iter().any(|r| r.matches(&metadata)) {
				return Err(DispatchError::UdpNotSupported(adapter.name().to_string()));
			}
			metadata.network = Network::Tcp;
			return Ok(UdpOutcome::RewrittenToTcp(metadata));
		}
		Ok(UdpOutcome::Conn(adapter.listen_udp(&metadata).await?))
	}
}

#[cfg(test)]
mod tests {
	use std::net::SocketAddr;

	use crate::adapter::direct::DirectAdapter;
	use crate::dns::resolver::ResolverConfig;
	use crate::rules::match_all::MatchAllRule;

	use super::*;

	fn empty_resolver() -> Arc<Resolver> {
		Arc::new(Resolver::new(ResolverConfig {
			main: Vec::new(),
			fallback: Vec::new(),
			fallback_filter_db: None,
			fallback_filter_country: None,
			ipv4_disabled: false,
			ipv6_disabled: false,
			fake_ip: None,
		}))
	}

	#[tokio::test]
	async fn unmatched_flow_falls_back_to_direct() {
		let registry = Arc::new(AdapterRegistry::new(vec![Arc::new(DirectAdapter::new(DIRECT_FALLBACK, None, None))], Vec::new()));
		let dispatcher = Dispatcher::new(Vec::new(), registry, empty_resolver(), Vec::new());

		let src: SocketAddr = "127.0.0.1:1".parse().unwrap();
		let mut metadata = Metadata::new(Network::Tcp, src, "test");
		metadata.dst_ip = Some("1.2.3.4".parse().unwrap());
		metadata.dst_port = 80;

		let adapter = dispatcher.select_adapter(&mut metadata).await.unwrap();
		assert_eq!(adapter.name(), DIRECT_FALLBACK);
	}

	#[tokio::test]
	async fn matching_rule_wins_over_default() {
		let registry = Arc::new(AdapterRegistry::new(
			vec![Arc::new(DirectAdapter::new(DIRECT_FALLBACK, None, None)), Arc::new(DirectAdapter::new("proxy", None, None))],
			Vec::new(),
		));
		let rules: Vec<Arc<dyn Rule>> = vec![Arc::new(MatchAllRule::new("proxy"))];
		let dispatcher = Dispatcher::new(rules, registry, empty_resolver(), Vec::new());

		let src: SocketAddr = "127.0.0.1:1".parse().unwrap();
		let mut metadata = Metadata::new(Network::Tcp, src, "test");
		metadata.dst_ip = Some("1.2.3.4".parse().unwrap());
		metadata.dst_port = 80;

		let adapter = dispatcher.select_adapter(&mut metadata).await.unwrap();
		assert_eq!(adapter.name(), "proxy");
	}
}
