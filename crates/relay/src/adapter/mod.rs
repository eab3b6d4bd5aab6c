//! `ProxyAdapter`: the polymorphic outbound used by the dispatcher (C9)
//! to dial or listen once a rule has picked a proxy. Closed set of
//! variants, invoked per-connection, so a trait object is cheap relative
//! to the network cost it wraps.

pub mod direct;
pub mod http;
pub mod reject;
pub mod shadowsocks;
pub mod shadowsocksr;
pub mod snell;
pub mod socks5;
pub mod trojan;
pub mod vless;
pub mod vmess;
pub mod wireguard;

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::types::Metadata;

pub trait AsyncReadWrite: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncReadWrite for T {}

pub type Conn = Box<dyn AsyncReadWrite>;

#[async_trait]
pub trait PacketConn: Send + Sync {
	async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize>;
	async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterKind {
	Direct,
	Reject,
	Http,
	Socks5,
	Shadowsocks,
	ShadowsocksR,
	Vmess,
	Vless,
	Trojan,
	Snell,
	WireGuard,
}

#[derive(thiserror::Error, Debug)]
pub enum AdapterError {
	#[error("{0} connect error: {1}")]
	Dial(String, #[source] io::Error),
	#[error("invalid connection type")]
	InvalidConnectionType,
	#[error(transparent)]
	Ssr(#[from] crate::transport::shadowsocksr::SsrError),
	#[error("{0} does not support udp")]
	UdpUnsupported(String),
	#[error(transparent)]
	Io(#[from] io::Error),
}

/// A dialed/streamed outbound. `dial_tcp` MUST close the underlying
/// socket before returning an error (no half-open leaks); `stream_conn`
/// is the protocol-specific wrapping step and is idempotent only for
/// `Direct`.
#[async_trait]
pub trait ProxyAdapter: Send + Sync {
	async fn dial_tcp(&self, metadata: &Metadata) -> Result<Conn, AdapterError>;
	async fn listen_udp(&self, metadata: &Metadata) -> Result<Box<dyn PacketConn>, AdapterError>;
	fn supports_udp(&self) -> bool;
	fn name(&self) -> &str;
	fn kind(&self) -> AdapterKind;
	/// True if the adapter's own DNS resolution should be used instead of
	/// the dispatcher's (Reject skips resolution entirely; most tunneling
	/// adapters pass the hostname through to let the remote resolve it).
	fn disable_dns_resolve(&self) -> bool {
		false
	}
}

/// Enables TCP keepalive on a freshly dialed socket. Adapters that dial
/// via `tokio::net::TcpStream::connect` call this before handing the
/// stream off to protocol wrapping, matching the upstream dialer's
/// default.
pub(crate) fn enable_tcp_keepalive(stream: &tokio::net::TcpStream) -> io::Result<()> {
	let sock = socket2::SockRef::from(stream);
	sock.set_keepalive(true)
}
