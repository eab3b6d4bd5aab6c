//! DNS-over-QUIC (RFC 9250): ALPN `"doq"`, one dedicated bidirectional
//! stream per query, 2-byte length-prefixed message, write side
//! half-closed immediately after the request is flushed. The connection
//! is kept warm across queries and only re-dialed once its context is
//! done; a single retry is permitted if that re-dial itself fails.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use hickory_proto::op::Message;
use quinn::{ClientConfig as QuinnClientConfig, Connection, Endpoint};
use tokio::sync::Mutex;
use tokio_rustls::rustls::ClientConfig as RustlsClientConfig;

use super::{DnsTransport, TransportError};

const ALPN_DOQ: &[u8] = b"doq";
const MAX_RESPONSE: usize = 64 * 1024;

fn quic_error(e: impl std::fmt::Display) -> TransportError {
	TransportError::Quic(e.to_string())
}

pub struct DoqTransport {
	server: SocketAddr,
	sni: String,
	client_config: QuinnClientConfig,
	connection: Mutex<Option<Connection>>,
}

impl DoqTransport {
	pub fn new(server: SocketAddr, sni: impl Into<String>, mut tls_config: RustlsClientConfig) -> Result<Self, TransportError> {
		tls_config.alpn_protocols = vec![ALPN_DOQ.to_vec()];
		let quic_crypto = quinn::crypto::rustls::QuicClientConfig::try_from(tls_config).map_err(quic_error)?;
		let client_config = QuinnClientConfig::new(Arc::new(quic_crypto));
		Ok(DoqTransport { server, sni: sni.into(), client_config, connection: Mutex::new(None) })
	}

	async fn dial(&self) -> Result<Connection, TransportError> {
		let mut endpoint = Endpoint::client("0.0.0.0:0".parse().unwrap()).map_err(quic_error)?;
		endpoint.set_default_client_config(self.client_config.clone());
		let connecting = endpoint.connect(self.server, &self.sni).map_err(quic_error)?;
		connecting.await.map_err(quic_error)
	}

	async fn connection(&self) -> Result<Connection, TransportError> {
		let mut guard = self.connection.lock().await;
		if let Some(conn) = guard.as_ref() {
			if conn.close_reason().is_none() {
				return Ok(conn.clone());
			}
		}
		let fresh = match self.dial().await {
			Ok(c) => c,
			Err(_) => self.dial().await?,
		};
		*guard = Some(fresh.clone());
		Ok(fresh)
	}
}

#[async_trait]
impl DnsTransport for DoqTransport {
	async fn exchange(&self, query: &Message) -> Result<Message, TransportError> {
		let wire = query.to_vec()?;
		let conn = self.connection().await?;

		let (mut send, mut recv) = conn.open_bi().await.map_err(quic_error)?;
		let len = u16::try_from(wire.len()).map_err(|_| std::io::Error::other("dns message too large for doq framing"))?;
		send.write_all(&len.to_be_bytes()).await.map_err(quic_error)?;
		send.write_all(&wire).await.map_err(quic_error)?;
		send.finish().map_err(quic_error)?;

		let body = recv.read_to_end(MAX_RESPONSE).await.map_err(quic_error)?;
		if body.len() < 2 {
			return Err(TransportError::Quic("doq response shorter than length prefix".to_string()));
		}
		let resp_len = u16::from_be_bytes([body[0], body[1]]) as usize;
		let payload = body.get(2..2 + resp_len).ok_or_else(|| TransportError::Quic("doq response truncated".to_string()))?;
		Ok(Message::from_vec(payload)?)
	}
}
