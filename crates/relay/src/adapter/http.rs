//! HTTP CONNECT tunnel adapter: dial the proxy, optionally TLS-wrap it,
//! issue `CONNECT host:port HTTP/1.1`, and hand back the raw stream once
//! the proxy answers `200`.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::ClientConfig;
use tokio_rustls::rustls::pki_types::ServerName;

use super::{AdapterError, AdapterKind, Conn, PacketConn, ProxyAdapter, enable_tcp_keepalive};
use crate::types::Metadata;

pub struct HttpAdapter {
	name: String,
	server: String,
	port: u16,
	username: Option<String>,
	password: Option<String>,
	tls: bool,
	sni: Option<String>,
	tls_config: Option<Arc<ClientConfig>>,
}

impl HttpAdapter {
	pub fn new(
		name: impl Into<String>,
		server: impl Into<String>,
		port: u16,
		username: Option<String>,
		password: Option<String>,
		tls: bool,
		sni: Option<String>,
		tls_config: Option<Arc<ClientConfig>>,
	) -> Self {
		HttpAdapter {
			name: name.into(),
			server: server.into(),
			port,
			username,
			password,
			tls,
			sni,
			tls_config,
		}
	}

	fn proxy_authorization(&self) -> Option<String> {
		let (user, pass) = (self.username.as_deref()?, self.password.as_deref().unwrap_or(""));
		let token = BASE64.encode(format!("{user}:{pass}"));
		Some(format!("Proxy-Authorization: Basic {token}\r\n"))
	}
}

#[async_trait]
impl ProxyAdapter for HttpAdapter {
	async fn dial_tcp(&self, metadata: &Metadata) -> Result<Conn, AdapterError> {
		let proxy_addr = format!("{}:{}", self.server, self.port);
		let stream = TcpStream::connect(&proxy_addr)
			.await
			.map_err(|e| AdapterError::Dial(proxy_addr.clone(), e))?;
		enable_tcp_keepalive(&stream).map_err(|e| AdapterError::Dial(proxy_addr.clone(), e))?;

		let target = metadata.remote_address();
		let mut request = format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n");
		if let Some(auth) = self.proxy_authorization() {
			request.push_str(&auth);
		}
		request.push_str("\r\n");

		if self.tls {
			let config = self
				.tls_config
				.clone()
				.ok_or_else(|| AdapterError::Dial(proxy_addr.clone(), io::Error::other("missing tls config")))?;
			let connector = TlsConnector::from(config);
			let sni = self.sni.clone().unwrap_or_else(|| self.server.clone());
			let server_name = ServerName::try_from(sni)
				.map_err(|_| AdapterError::Dial(proxy_addr.clone(), io::Error::other("invalid sni")))?;
			let mut tls_stream = connector
				.connect(server_name, stream)
				.await
				.map_err(|e| AdapterError::Dial(proxy_addr.clone(), e))?;
			tls_stream
				.write_all(request.as_bytes())
				.await
				.map_err(|e| AdapterError::Dial(proxy_addr.clone(), e))?;
			read_connect_response(&mut tls_stream, &proxy_addr).await?;
			Ok(Box::new(tls_stream))
		} else {
			let mut stream = stream;
			stream
				.write_all(request.as_bytes())
				.await
				.map_err(|e| AdapterError::Dial(proxy_addr.clone(), e))?;
			read_connect_response(&mut stream, &proxy_addr).await?;
			Ok(Box::new(stream))
		}
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
		AdapterKind::Http
	}
}

/// Reads the CONNECT status line and header block byte-for-byte (no
/// read-ahead past the blank line), so the caller's stream is left
/// positioned exactly at the start of the tunneled bytes.
async fn read_connect_response<S: tokio::io::AsyncRead + Unpin>(stream: &mut S, proxy_addr: &str) -> Result<(), AdapterError> {
	let mut reader = BufReader::with_capacity(1, stream);
	let mut status_line = String::new();
	reader
		.read_line(&mut status_line)
		.await
		.map_err(|e| AdapterError::Dial(proxy_addr.to_string(), e))?;
	if !status_line.contains(" 200 ") && !status_line.trim_end().ends_with(" 200") {
		return Err(AdapterError::Dial(
			proxy_addr.to_string(),
			io::Error::other(format!("CONNECT rejected: {}", status_line.trim())),
		));
	}
	loop {
		let mut line = String::new();
		let n = reader
			.read_line(&mut line)
			.await
			.map_err(|e| AdapterError::Dial(proxy_addr.to_string(), e))?;
		if n == 0 || line == "\r\n" || line == "\n" {
			break;
		}
	}
	Ok(())
}
