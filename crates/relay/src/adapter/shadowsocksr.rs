//! ShadowsocksR adapter: dials, then defers all of the
//! `protocol(cipher(obfs(...)))` layering to `transport::shadowsocksr`.

use std::net::SocketAddr;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};

use super::{AdapterError, AdapterKind, Conn, PacketConn, ProxyAdapter, enable_tcp_keepalive};
use crate::transport::shadowsocksr::{Options, ShadowSocksR, SsrError};
use crate::transport::socks_addr;
use crate::types::{Metadata, Network};

pub struct ShadowsocksRAdapter {
	name: String,
	server: String,
	port: u16,
	options: Options,
}

impl ShadowsocksRAdapter {
	pub fn new(name: impl Into<String>, options: Options) -> Self {
		ShadowsocksRAdapter {
			name: name.into(),
			server: options.server.clone(),
			port: options.port,
			options,
		}
	}
}

#[async_trait]
impl ProxyAdapter for ShadowsocksRAdapter {
	async fn dial_tcp(&self, metadata: &Metadata) -> Result<Conn, AdapterError> {
		let proxy_addr = format!("{}:{}", self.server, self.port);
		let mut stream = TcpStream::connect(&proxy_addr)
			.await
			.map_err(|e| AdapterError::Dial(proxy_addr.clone(), e))?;
		enable_tcp_keepalive(&stream).map_err(|e| AdapterError::Dial(proxy_addr.clone(), e))?;

		let mut ssr = ShadowSocksR::new(self.options.clone()).map_err(|e| match e {
			SsrError::InvalidConnectionType => AdapterError::InvalidConnectionType,
			other => AdapterError::Dial(proxy_addr.clone(), std::io::Error::other(other.to_string())),
		})?;
		let header = ssr.stream_request_header(metadata);
		stream
			.write_all(&header)
			.await
			.map_err(|e| AdapterError::Dial(proxy_addr.clone(), e))?;
		Ok(Box::new(stream))
	}

	async fn listen_udp(&self, _metadata: &Metadata) -> Result<Box<dyn PacketConn>, AdapterError> {
		let proxy_addr = format!("{}:{}", self.server, self.port);
		let remote: SocketAddr = tokio::net::lookup_host(&proxy_addr)
			.await
			.map_err(|e| AdapterError::Dial(proxy_addr.clone(), e))?
			.next()
			.ok_or_else(|| AdapterError::Dial(proxy_addr.clone(), std::io::Error::other("no address resolved")))?;
		let ssr = ShadowSocksR::new(self.options.clone()).map_err(|e| match e {
			SsrError::InvalidConnectionType => AdapterError::InvalidConnectionType,
			other => AdapterError::Dial(proxy_addr.clone(), std::io::Error::other(other.to_string())),
		})?;
		let socket = UdpSocket::bind("0.0.0.0:0").await.map_err(|e| AdapterError::Dial(proxy_addr.clone(), e))?;
		Ok(Box::new(ShadowsocksRPacketConn {
			socket,
			remote,
			ssr: Mutex::new(ssr),
		}))
	}

	fn supports_udp(&self) -> bool {
		true
	}

	fn name(&self) -> &str {
		&self.name
	}

	fn kind(&self) -> AdapterKind {
		AdapterKind::ShadowsocksR
	}
}

/// Only cipher+protocol apply to UDP datagrams -- no obfs layer, matching
/// `ShadowSocksR::encode_packet`/`decode_packet`. Every datagram is framed
/// and sent to the fixed proxy address resolved at `listen_udp` time; the
/// caller's `target` becomes the SOCKS address header inside the payload
/// rather than the UDP wire destination.
struct ShadowsocksRPacketConn {
	socket: UdpSocket,
	remote: SocketAddr,
	ssr: Mutex<ShadowSocksR>,
}

#[async_trait]
impl PacketConn for ShadowsocksRPacketConn {
	async fn send_to(&self, buf: &[u8], target: SocketAddr) -> std::io::Result<usize> {
		let mut metadata = Metadata::new(Network::Udp, self.remote, "shadowsocksr");
		metadata.dst_ip = Some(target.ip());
		metadata.dst_port = target.port();
		let framed = self.ssr.lock().encode_packet(&metadata, buf);
		self.socket.send_to(&framed, self.remote).await?;
		Ok(buf.len())
	}

	async fn recv_from(&self, buf: &mut [u8]) -> std::io::Result<(usize, SocketAddr)> {
		let mut raw = vec![0u8; 65536];
		loop {
			let (n, from) = self.socket.recv_from(&mut raw).await?;
			if from != self.remote {
				continue;
			}
			let Some(plaintext) = self.ssr.lock().decode_packet(&raw[..n]) else {
				continue;
			};
			let Some((addr, consumed)) = socks_addr::decode(&plaintext) else {
				continue;
			};
			let payload = &plaintext[consumed..];
			let copy = payload.len().min(buf.len());
			buf[..copy].copy_from_slice(&payload[..copy]);
			return Ok((copy, addr));
		}
	}
}
