//! Trojan adapter: TLS handshake to the server, then the hashed-password
//! request header from `transport::trojan` as the first payload.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::ClientConfig;
use tokio_rustls::rustls::pki_types::ServerName;

use super::{AdapterError, AdapterKind, Conn, PacketConn, ProxyAdapter, enable_tcp_keepalive};
use crate::transport::trojan::build_request_header;
use crate::types::Metadata;

pub struct TrojanAdapter {
	name: String,
	server: String,
	port: u16,
	password: String,
	sni: Option<String>,
	tls_config: Arc<ClientConfig>,
}

impl TrojanAdapter {
	pub fn new(name: impl Into<String>, server: impl Into<String>, port: u16, password: impl Into<String>, sni: Option<String>, tls_config: Arc<ClientConfig>) -> Self {
		TrojanAdapter {
			name: name.into(),
			server: server.into(),
			port,
			password: password.into(),
			sni,
			tls_config,
		}
	}
}

#[async_trait]
impl ProxyAdapter for TrojanAdapter {
	async fn dial_tcp(&self, metadata: &Metadata) -> Result<Conn, AdapterError> {
		let proxy_addr = format!("{}:{}", self.server, self.port);
		let stream = TcpStream::connect(&proxy_addr)
			.await
			.map_err(|e| AdapterError::Dial(proxy_addr.clone(), e))?;
		enable_tcp_keepalive(&stream).map_err(|e| AdapterError::Dial(proxy_addr.clone(), e))?;

		let connector = TlsConnector::from(self.tls_config.clone());
		let sni = self.sni.clone().unwrap_or_else(|| self.server.clone());
		let server_name = ServerName::try_from(sni)
			.map_err(|_| AdapterError::Dial(proxy_addr.clone(), std::io::Error::other("invalid sni")))?;
		let mut tls_stream = connector
			.connect(server_name, stream)
			.await
			.map_err(|e| AdapterError::Dial(proxy_addr.clone(), e))?;

		let header = build_request_header(&self.password, metadata);
		tls_stream
			.write_all(&header)
			.await
			.map_err(|e| AdapterError::Dial(proxy_addr.clone(), e))?;
		Ok(Box::new(tls_stream))
	}

	async fn listen_udp(&self, _metadata: &Metadata) -> Result<Box<dyn PacketConn>, AdapterError> {
		Err(AdapterError::UdpUnsupported(self.name.clone()))
	}

	fn supports_udp(&self) -> bool {
		false
	}

	fn name(&self) -> &str {
		&self.name
	}

	fn kind(&self) -> AdapterKind {
		AdapterKind::Trojan
	}
}
