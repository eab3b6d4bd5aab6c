//! Snell adapter: an AEAD-wrapped stream similar in spirit to
//! Shadowsocks, but with its own request header (version, command, host,
//! port, empty extra-headers terminator) instead of a bare SOCKS address.

use async_trait::async_trait;
use rand::RngCore;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use super::{AdapterError, AdapterKind, Conn, PacketConn, ProxyAdapter, enable_tcp_keepalive};
use crate::transport::buf::BufferWriter;
use crate::transport::shadowsocks::{AeadKind, aead_seal, derive_session_key};
use crate::types::Metadata;

const VERSION: u8 = 1;
const CMD_CONNECT: u8 = 1;
const SALT_LEN: usize = 16;

pub struct SnellAdapter {
	name: String,
	server: String,
	port: u16,
	psk: String,
}

impl SnellAdapter {
	pub fn new(name: impl Into<String>, server: impl Into<String>, port: u16, psk: impl Into<String>) -> Self {
		SnellAdapter {
			name: name.into(),
			server: server.into(),
			port,
			psk: psk.into(),
		}
	}
}

fn build_header(metadata: &Metadata) -> Vec<u8> {
	let mut w = BufferWriter::new();
	w.put_u8(VERSION);
	w.put_u8(CMD_CONNECT);
	let host = metadata
		.host
		.as_deref()
		.map(str::to_string)
		.unwrap_or_else(|| metadata.dst_ip.map(|ip| ip.to_string()).unwrap_or_default());
	w.put_u8(host.len() as u8);
	w.put_slice(host.as_bytes());
	w.put_u16_be(metadata.dst_port);
	w.put_u8(0x00); // no extra headers
	w.into_vec()
}

#[async_trait]
impl ProxyAdapter for SnellAdapter {
	async fn dial_tcp(&self, metadata: &Metadata) -> Result<Conn, AdapterError> {
		let proxy_addr = format!("{}:{}", self.server, self.port);
		let mut stream = TcpStream::connect(&proxy_addr)
			.await
			.map_err(|e| AdapterError::Dial(proxy_addr.clone(), e))?;
		enable_tcp_keepalive(&stream).map_err(|e| AdapterError::Dial(proxy_addr.clone(), e))?;

		let mut salt = vec![0u8; SALT_LEN];
		rand::rng().fill_bytes(&mut salt);
		let session_key = derive_session_key(self.psk.as_bytes(), &salt);
		let header = build_header(metadata);
		let sealed = aead_seal(AeadKind::Aes128Gcm, &session_key, &[0u8; 12], &header);

		let mut out = Vec::with_capacity(salt.len() + sealed.len());
		out.extend_from_slice(&salt);
		out.extend_from_slice(&sealed);
		stream
			.write_all(&out)
			.await
			.map_err(|e| AdapterError::Dial(proxy_addr.clone(), e))?;
		Ok(Box::new(stream))
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
		AdapterKind::Snell
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::Network;

	#[test]
	fn header_encodes_host_and_port() {
		let mut m = Metadata::new(Network::Tcp, "127.0.0.1:1".parse().unwrap(), "test");
		m.host = Some("example.com".into());
		m.dst_port = 443;
		let header = build_header(&m);
		assert_eq!(header[0], VERSION);
		assert_eq!(header[1], CMD_CONNECT);
		assert_eq!(header[2], 11);
		assert_eq!(&header[3..14], b"example.com");
		assert_eq!(&header[14..16], &443u16.to_be_bytes());
		assert_eq!(header[16], 0x00);
	}
}
