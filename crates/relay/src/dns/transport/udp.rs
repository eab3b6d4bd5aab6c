//! Plain UDP DNS transport: one datagram, 5 s read timeout, falls back to
//! a paired TCP transport when the response comes back truncated.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::op::Message;
use tokio::net::UdpSocket;

use super::{AdapterLookup, DnsTransport, TransportError, require_adapter};
use crate::types::{Metadata, Network};

const READ_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_UDP_MSG: usize = 4096;

pub struct UdpTransport {
	server: SocketAddr,
	proxy_adapter: Option<String>,
	adapter_lookup: Option<Arc<dyn AdapterLookup>>,
	tcp_fallback: Option<Arc<dyn DnsTransport>>,
}

impl UdpTransport {
	pub fn new(server: SocketAddr) -> Self {
		UdpTransport { server, proxy_adapter: None, adapter_lookup: None, tcp_fallback: None }
	}

	pub fn with_proxy_adapter(mut self, name: impl Into<String>, lookup: Arc<dyn AdapterLookup>) -> Self {
		self.proxy_adapter = Some(name.into());
		self.adapter_lookup = Some(lookup);
		self
	}

	pub fn with_tcp_fallback(mut self, tcp: Arc<dyn DnsTransport>) -> Self {
		self.tcp_fallback = Some(tcp);
		self
	}

	async fn exchange_direct(&self, wire: &[u8]) -> Result<Vec<u8>, TransportError> {
		let socket = UdpSocket::bind("0.0.0.0:0").await?;
		socket.connect(self.server).await?;
		socket.send(wire).await?;
		let mut buf = vec![0u8; MAX_UDP_MSG];
		let n = tokio::time::timeout(READ_TIMEOUT, socket.recv(&mut buf)).await.map_err(|_| std::io::Error::from(std::io::ErrorKind::TimedOut))??;
		buf.truncate(n);
		Ok(buf)
	}

	async fn exchange_via_proxy(&self, name: &str, wire: &[u8]) -> Result<Vec<u8>, TransportError> {
		let lookup = self.adapter_lookup.as_ref().expect("proxy_adapter implies adapter_lookup");
		let adapter = require_adapter(lookup.as_ref(), name)?;
		if !adapter.supports_udp() {
			return Err(TransportError::UdpUnsupported(name.to_string()));
		}
		let metadata = Metadata::new(Network::Udp, "0.0.0.0:0".parse().unwrap(), "dns");
		let conn = adapter.listen_udp(&metadata).await?;
		conn.send_to(wire, self.server).await?;
		let mut buf = vec![0u8; MAX_UDP_MSG];
		let (n, _from) = tokio::time::timeout(READ_TIMEOUT, conn.recv_from(&mut buf))
			.await
			.map_err(|_| std::io::Error::from(std::io::ErrorKind::TimedOut))??;
		buf.truncate(n);
		Ok(buf)
	}
}

#[async_trait]
impl DnsTransport for UdpTransport {
	async fn exchange(&self, query: &Message) -> Result<Message, TransportError> {
		let wire = query.to_vec()?;
		let response_bytes = match &self.proxy_adapter {
			Some(name) => self.exchange_via_proxy(name, &wire).await?,
			None => self.exchange_direct(&wire).await?,
		};
		let response = Message::from_vec(&response_bytes)?;
		if response.header().truncated() {
			if let Some(tcp) = &self.tcp_fallback {
				return tcp.exchange(query).await;
			}
		}
		Ok(response)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn constructs_with_defaults() {
		let t = UdpTransport::new("8.8.8.8:53".parse().unwrap());
		assert!(t.proxy_adapter.is_none());
	}
}
