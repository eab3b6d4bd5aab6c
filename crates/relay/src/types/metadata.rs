//! The per-flow classification record routed through the dispatcher.
//! Created at accept time, mutated by the DNS stage (which may fill
//! `dst_ip`), and consumed by adapters.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use relay_core::Strng;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
	Tcp,
	Udp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DnsMode {
	/// Resolve locally before dialing; the adapter always receives an IP.
	#[default]
	Normal,
	/// Let the remote adapter's proxy server resolve the hostname.
	Remote,
	/// Serve a synthetic address from the fake-IP pool.
	FakeIp,
}

/// Per-flow metadata. Invariant: at least one of `host`/`dst_ip` is set
/// before an adapter's `dial_tcp`/`listen_udp` is invoked — the
/// dispatcher enforces this in `dispatcher::Dispatcher::handle`.
#[derive(Debug, Clone)]
pub struct Metadata {
	pub network: Network,
	pub src_addr: SocketAddr,
	/// Unresolved hostname, when known. May coexist with `dst_ip` once the
	/// DNS stage has filled it in — adapters with `disable_dns_resolve()`
	/// true prefer `host`, others prefer `dst_ip`.
	pub host: Option<Strng>,
	pub dst_ip: Option<IpAddr>,
	pub dst_port: u16,
	/// Original destination before any transparent-proxy redirection; for
	/// rules matching on `OriginDst.Port`.
	pub origin_dst: Option<SocketAddr>,
	pub inbound_type: Strng,
	pub process_name: Option<Strng>,
	pub dns_mode: DnsMode,
}

impl Metadata {
	pub fn new(network: Network, src_addr: SocketAddr, inbound_type: impl Into<Strng>) -> Self {
		Metadata {
			network,
			src_addr,
			host: None,
			dst_ip: None,
			dst_port: 0,
			origin_dst: None,
			inbound_type: inbound_type.into(),
			process_name: None,
			dns_mode: DnsMode::default(),
		}
	}

	/// The string clash-family rules and the reject counter key on:
	/// `host-or-ip:port`.
	pub fn remote_address(&self) -> String {
		match (&self.host, self.dst_ip) {
			(Some(h), _) => format!("{h}:{}", self.dst_port),
			(None, Some(ip)) => format!("{ip}:{}", self.dst_port),
			(None, None) => format!(":{}", self.dst_port),
		}
	}

	pub fn resolvable(&self) -> bool {
		self.host.is_some() || self.dst_ip.is_some()
	}
}

impl fmt::Display for Metadata {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.remote_address())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn remote_address_prefers_host() {
		let mut m = Metadata::new(Network::Tcp, "127.0.0.1:1".parse().unwrap(), "http");
		m.dst_port = 443;
		m.dst_ip = Some("1.2.3.4".parse().unwrap());
		assert_eq!(m.remote_address(), "1.2.3.4:443");
		m.host = Some("example.com".into());
		assert_eq!(m.remote_address(), "example.com:443");
	}
}
