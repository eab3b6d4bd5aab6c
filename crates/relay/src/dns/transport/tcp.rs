//! TCP/TLS DNS transport: 2-byte big-endian length prefix around the wire
//! message, matching RFC 1035 §4.2.2. TLS is layered on with a configured
//! SNI, making this the same type DoT builds on.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use hickory_proto::op::Message;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::ClientConfig;
use tokio_rustls::rustls::pki_types::ServerName;

use super::{AdapterLookup, DnsTransport, TransportError, require_adapter};
use crate::adapter::Conn;
use crate::types::{Metadata, Network};

pub struct TcpTransport {
	server: SocketAddr,
	tls: Option<(String, Arc<ClientConfig>)>,
	proxy_adapter: Option<String>,
	adapter_lookup: Option<Arc<dyn AdapterLookup>>,
}

impl TcpTransport {
	pub fn new(server: SocketAddr) -> Self {
		TcpTransport { server, tls: None, proxy_adapter: None, adapter_lookup: None }
	}

	pub fn with_tls(mut self, sni: impl Into<String>, config: Arc<ClientConfig>) -> Self {
		self.tls = Some((sni.into(), config));
		self
	}

	pub fn with_proxy_adapter(mut self, name: impl Into<String>, lookup: Arc<dyn AdapterLookup>) -> Self {
		self.proxy_adapter = Some(name.into());
		self.adapter_lookup = Some(lookup);
		self
	}

	async fn dial(&self) -> Result<Conn, TransportError> {
		if let Some(name) = &self.proxy_adapter {
			let lookup = self.adapter_lookup.as_ref().expect("proxy_adapter implies adapter_lookup");
			let adapter = require_adapter(lookup.as_ref(), name)?;
			let metadata = Metadata::new(Network::Tcp, "0.0.0.0:0".parse().unwrap(), "dns");
			return Ok(adapter.dial_tcp(&metadata).await?);
		}
		Ok(Box::new(TcpStream::connect(self.server).await?))
	}

	async fn exchange_framed<S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin>(stream: &mut S, wire: &[u8]) -> Result<Vec<u8>, TransportError> {
		let len = u16::try_from(wire.len()).map_err(|_| std::io::Error::other("dns message too large for tcp framing"))?;
		stream.write_all(&len.to_be_bytes()).await?;
		stream.write_all(wire).await?;

		let mut len_buf = [0u8; 2];
		stream.read_exact(&mut len_buf).await?;
		let resp_len = u16::from_be_bytes(len_buf) as usize;
		let mut resp = vec![0u8; resp_len];
		stream.read_exact(&mut resp).await?;
		Ok(resp)
	}
}

#[async_trait]
impl DnsTransport for TcpTransport {
	async fn exchange(&self, query: &Message) -> Result<Message, TransportError> {
		let wire = query.to_vec()?;
		let mut conn = self.dial().await?;

		let response_bytes = if let Some((sni, config)) = &self.tls {
			let connector = TlsConnector::from(config.clone());
			let server_name = ServerName::try_from(sni.clone()).map_err(|e| std::io::Error::other(e.to_string()))?;
			let mut tls_stream = connector.connect(server_name, &mut conn).await?;
			Self::exchange_framed(&mut tls_stream, &wire).await?
		} else {
			Self::exchange_framed(&mut conn, &wire).await?
		};

		Ok(Message::from_vec(&response_bytes)?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn plain_constructor_has_no_tls() {
		let t = TcpTransport::new("1.1.1.1:53".parse().unwrap());
		assert!(t.tls.is_none());
	}
}
