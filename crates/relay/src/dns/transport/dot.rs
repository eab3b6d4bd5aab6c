//! DNS-over-TLS: the same 2-byte length-prefixed framing as plain TCP,
//! over a `rustls` handshake against a configured SNI. Built directly on
//! `TcpTransport` rather than duplicating the framing logic.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use hickory_proto::op::Message;
use tokio_rustls::rustls::ClientConfig;

use super::tcp::TcpTransport;
use super::{AdapterLookup, DnsTransport, TransportError};

pub struct DotTransport {
	inner: TcpTransport,
}

impl DotTransport {
	pub fn new(server: SocketAddr, sni: impl Into<String>, config: Arc<ClientConfig>) -> Self {
		DotTransport { inner: TcpTransport::new(server).with_tls(sni, config) }
	}

	pub fn with_proxy_adapter(mut self, name: impl Into<String>, lookup: Arc<dyn AdapterLookup>) -> Self {
		self.inner = self.inner.with_proxy_adapter(name, lookup);
		self
	}
}

#[async_trait]
impl DnsTransport for DotTransport {
	async fn exchange(&self, query: &Message) -> Result<Message, TransportError> {
		self.inner.exchange(query).await
	}
}
