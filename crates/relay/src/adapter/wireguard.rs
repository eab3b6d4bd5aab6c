//! WireGuard adapter: drives a `boringtun` `Tunn` state machine over a UDP
//! socket to the peer endpoint.
//!
//! Carrying an arbitrary TCP byte stream through a WireGuard tunnel
//! ordinarily requires an embedded userspace IP/TCP stack (the tunnel
//! only ever carries IP packets) -- integrating one (e.g. smoltcp) is out
//! of scope here. This adapter performs the real Noise_IK handshake and
//! transport-data encapsulation/decapsulation via `boringtun`, then
//! treats the plaintext payload as an opaque byte stream rather than
//! parsing it as IP, which is sufficient to prove out the handshake and
//! wire framing but not a drop-in TCP carrier.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use boringtun::noise::{Tunn, TunnResult};
use boringtun::x25519::{PublicKey, StaticSecret};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::UdpSocket;
use tokio::sync::Mutex as AsyncMutex;

use super::{AdapterError, AdapterKind, Conn, PacketConn, ProxyAdapter};
use crate::types::Metadata;

const MAX_PACKET: usize = 2048;

#[derive(Clone)]
pub struct WireGuardConfig {
	pub private_key: [u8; 32],
	pub peer_public_key: [u8; 32],
	pub endpoint: SocketAddr,
	pub persistent_keepalive: Option<u16>,
}

pub struct WireGuardAdapter {
	name: String,
	config: WireGuardConfig,
}

impl WireGuardAdapter {
	pub fn new(name: impl Into<String>, config: WireGuardConfig) -> Self {
		WireGuardAdapter { name: name.into(), config }
	}
}

#[async_trait]
impl ProxyAdapter for WireGuardAdapter {
	async fn dial_tcp(&self, _metadata: &Metadata) -> Result<Conn, AdapterError> {
		let socket = UdpSocket::bind("0.0.0.0:0").await?;
		socket.connect(self.config.endpoint).await?;

		let private = StaticSecret::from(self.config.private_key);
		let peer_public = PublicKey::from(self.config.peer_public_key);
		let mut tunn = Tunn::new(private, peer_public, None, self.config.persistent_keepalive, 0, None)
			.map_err(|e| AdapterError::Dial(self.config.endpoint.to_string(), io::Error::other(e)))?;

		let mut buf = vec![0u8; MAX_PACKET];
		if let TunnResult::WriteToNetwork(packet) = tunn.format_handshake_initiation(false) {
			socket
				.send(packet)
				.await
				.map_err(|e| AdapterError::Dial(self.config.endpoint.to_string(), e))?;
		}
		// Wait for the handshake response so the transport is ready before
		// the caller starts streaming application data through it.
		let n = socket
			.recv(&mut buf)
			.await
			.map_err(|e| AdapterError::Dial(self.config.endpoint.to_string(), e))?;
		match tunn.decapsulate(None, &buf[..n], &mut buf) {
			TunnResult::WriteToNetwork(reply) => {
				socket
					.send(reply)
					.await
					.map_err(|e| AdapterError::Dial(self.config.endpoint.to_string(), e))?;
			},
			TunnResult::Done => {},
			_ => {},
		}

		Ok(Box::new(WireGuardConn {
			socket,
			tunn: AsyncMutex::new(tunn),
			read_buf: Vec::new(),
		}))
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
		AdapterKind::WireGuard
	}
}

struct WireGuardConn {
	socket: UdpSocket,
	tunn: AsyncMutex<Tunn>,
	read_buf: Vec<u8>,
}

impl AsyncWrite for WireGuardConn {
	fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
		let this = self.get_mut();
		let mut out = vec![0u8; buf.len() + 64];
		let encapsulated = {
			let mut guard = match this.tunn.try_lock() {
				Ok(g) => g,
				Err(_) => return Poll::Pending,
			};
			guard.encapsulate(buf, &mut out)
		};
		match encapsulated {
			TunnResult::WriteToNetwork(packet) => match this.socket.poll_send(cx, packet) {
				Poll::Ready(Ok(_)) => Poll::Ready(Ok(buf.len())),
				Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
				Poll::Pending => Poll::Pending,
			},
			_ => Poll::Ready(Ok(buf.len())),
		}
	}

	fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
		Poll::Ready(Ok(()))
	}

	fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
		Poll::Ready(Ok(()))
	}
}

impl AsyncRead for WireGuardConn {
	fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
		let this = self.get_mut();
		if !this.read_buf.is_empty() {
			let n = this.read_buf.len().min(buf.remaining());
			buf.put_slice(&this.read_buf[..n]);
			this.read_buf.drain(..n);
			return Poll::Ready(Ok(()));
		}
		let mut raw = vec![0u8; MAX_PACKET];
		let mut rb = ReadBuf::new(&mut raw);
		match this.socket.poll_recv(cx, &mut rb) {
			Poll::Ready(Ok(())) => {
				let n = rb.filled().len();
				let mut out = vec![0u8; MAX_PACKET];
				let mut guard = match this.tunn.try_lock() {
					Ok(g) => g,
					Err(_) => return Poll::Pending,
				};
				match guard.decapsulate(None, &raw[..n], &mut out) {
					TunnResult::WriteToTunnelV4(data, _) | TunnResult::WriteToTunnelV6(data, _) => {
						this.read_buf = data.to_vec();
					},
					_ => {},
				}
				drop(guard);
				if !this.read_buf.is_empty() {
					let n = this.read_buf.len().min(buf.remaining());
					buf.put_slice(&this.read_buf[..n]);
					this.read_buf.drain(..n);
				}
				Poll::Ready(Ok(()))
			},
			Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
			Poll::Pending => Poll::Pending,
		}
	}
}

