//! VLESS adapter: a lighter sibling of VMess with a plaintext request
//! header (version byte, UUID, empty addons, command, address) and no
//! per-chunk AEAD framing by default -- the stream carries application
//! bytes transparently once the header is sent.

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use uuid::Uuid;

use super::{AdapterError, AdapterKind, Conn, PacketConn, ProxyAdapter, enable_tcp_keepalive};
use crate::transport::buf::BufferWriter;
use crate::transport::socks_addr;
use crate::types::{Metadata, Network};

const VERSION: u8 = 0x00;
const CMD_TCP: u8 = 0x01;
const CMD_UDP: u8 = 0x02;

pub struct VlessAdapter {
	name: String,
	server: String,
	port: u16,
	uuid: Uuid,
}

impl VlessAdapter {
	pub fn new(name: impl Into<String>, server: impl Into<String>, port: u16, uuid: Uuid) -> Self {
		VlessAdapter {
			name: name.into(),
			server: server.into(),
			port,
			uuid,
		}
	}
}

fn build_request_header(uuid: &Uuid, metadata: &Metadata) -> Vec<u8> {
	let mut w = BufferWriter::new();
	w.put_u8(VERSION);
	w.put_slice(uuid.as_bytes());
	w.put_u8(0x00); // no addons
	w.put_u8(match metadata.network {
		Network::Tcp => CMD_TCP,
		Network::Udp => CMD_UDP,
	});
	w.put_slice(&socks_addr::encode(metadata));
	w.into_vec()
}

#[async_trait]
impl ProxyAdapter for VlessAdapter {
	async fn dial_tcp(&self, metadata: &Metadata) -> Result<Conn, AdapterError> {
		let proxy_addr = format!("{}:{}", self.server, self.port);
		let mut stream = TcpStream::connect(&proxy_addr)
			.await
			.map_err(|e| AdapterError::Dial(proxy_addr.clone(), e))?;
		enable_tcp_keepalive(&stream).map_err(|e| AdapterError::Dial(proxy_addr.clone(), e))?;

		let header = build_request_header(&self.uuid, metadata);
		stream
			.write_all(&header)
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
		AdapterKind::Vless
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn header_starts_with_version_and_uuid() {
		let uuid = Uuid::nil();
		let mut m = Metadata::new(Network::Tcp, "127.0.0.1:1".parse().unwrap(), "test");
		m.host = Some("example.com".into());
		m.dst_port = 443;
		let header = build_request_header(&uuid, &m);
		assert_eq!(header[0], VERSION);
		assert_eq!(&header[1..17], uuid.as_bytes());
		assert_eq!(header[17], 0x00);
		assert_eq!(header[18], CMD_TCP);
	}
}
