//! Rejects every dial. Abusive callers (more than 50 dials to the same
//! remote within a 15 s window) are slowed down with a piped connection
//! that goes dead after 35 s rather than failing fast, so a scanning
//! client pays a stall instead of an instant retry signal.
//!
//! The counter is an explicit handle (`RejectCounter`) owned by whoever
//! builds the adapter pool, not a process-wide global — the upstream's
//! package-level map makes initialization order a hazard this avoids.

use std::future::Future;
use std::io;
use std::num::NonZeroUsize;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::time::Sleep;

use super::{AdapterError, AdapterKind, Conn, PacketConn, ProxyAdapter};
use crate::types::Metadata;

const WINDOW: Duration = Duration::from_secs(15);
const THRESHOLD: u32 = 50;
const STALL: Duration = Duration::from_secs(35);
const MAX_KEYS: usize = 512;

struct CounterEntry {
	count: u32,
	inserted: Instant,
}

/// LRU-bounded, TTL-expiring dial counter keyed by `remote_address()`.
pub struct RejectCounter {
	inner: Mutex<LruCache<String, CounterEntry>>,
}

impl RejectCounter {
	pub fn new() -> Self {
		RejectCounter {
			inner: Mutex::new(LruCache::new(NonZeroUsize::new(MAX_KEYS).expect("512 > 0"))),
		}
	}

	/// Increments the key's count, resetting it if the prior entry aged
	/// out of the 15 s window. Returns the post-increment count.
	fn bump(&self, key: &str) -> u32 {
		let mut cache = self.inner.lock();
		let now = Instant::now();
		match cache.get_mut(key) {
			Some(entry) if now.duration_since(entry.inserted) < WINDOW => {
				entry.count += 1;
				entry.count
			},
			_ => {
				cache.put(key.to_string(), CounterEntry { count: 1, inserted: now });
				1
			},
		}
	}
}

impl Default for RejectCounter {
	fn default() -> Self {
		Self::new()
	}
}

pub struct RejectAdapter {
	name: String,
	counter: std::sync::Arc<RejectCounter>,
}

impl RejectAdapter {
	pub fn new(name: impl Into<String>, counter: std::sync::Arc<RejectCounter>) -> Self {
		RejectAdapter { name: name.into(), counter }
	}
}

#[async_trait]
impl ProxyAdapter for RejectAdapter {
	async fn dial_tcp(&self, metadata: &Metadata) -> Result<Conn, AdapterError> {
		let count = self.counter.bump(&metadata.remote_address());
		if count > THRESHOLD {
			let (a, b) = tokio::io::duplex(1024);
			Ok(Box::new(DeadlineConn::new(a, b, STALL)))
		} else {
			Ok(Box::new(NoOpConn))
		}
	}

	async fn listen_udp(&self, _metadata: &Metadata) -> Result<Box<dyn PacketConn>, AdapterError> {
		Ok(Box::new(NoOpPacketConn))
	}

	fn supports_udp(&self) -> bool {
		true
	}

	fn name(&self) -> &str {
		&self.name
	}

	fn kind(&self) -> AdapterKind {
		AdapterKind::Reject
	}

	fn disable_dns_resolve(&self) -> bool {
		true
	}
}

/// Immediately yields EOF on read and a broken-pipe error on write, as if
/// the remote had already hung up.
struct NoOpConn;

impl AsyncRead for NoOpConn {
	fn poll_read(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
		Poll::Ready(Ok(()))
	}
}

impl AsyncWrite for NoOpConn {
	fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &[u8]) -> Poll<io::Result<usize>> {
		Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "rejected")))
	}

	fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
		Poll::Ready(Ok(()))
	}

	fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
		Poll::Ready(Ok(()))
	}
}

struct NoOpPacketConn;

#[async_trait]
impl PacketConn for NoOpPacketConn {
	async fn send_to(&self, buf: &[u8], _target: std::net::SocketAddr) -> io::Result<usize> {
		Ok(buf.len())
	}

	async fn recv_from(&self, _buf: &mut [u8]) -> io::Result<(usize, std::net::SocketAddr)> {
		Err(io::Error::new(io::ErrorKind::UnexpectedEof, "rejected"))
	}
}

/// A pipe half whose reads/writes start failing once `deadline` elapses.
/// The peer half is kept alive (never dropped) so neither side sees an
/// EOF or reset before the stall timer fires -- a scanning client's
/// socket genuinely hangs for the full duration instead of getting an
/// instant signal to retry.
struct DeadlineConn {
	inner: DuplexStream,
	_peer: DuplexStream,
	sleep: Pin<Box<Sleep>>,
}

impl DeadlineConn {
	fn new(inner: DuplexStream, peer: DuplexStream, stall: Duration) -> Self {
		DeadlineConn {
			inner,
			_peer: peer,
			sleep: Box::pin(tokio::time::sleep(stall)),
		}
	}

	fn expired(&mut self, cx: &mut Context<'_>) -> bool {
		self.sleep.as_mut().poll(cx).is_ready()
	}
}

impl AsyncRead for DeadlineConn {
	fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
		if self.expired(cx) {
			return Poll::Ready(Err(io::Error::new(io::ErrorKind::TimedOut, "reject stall deadline elapsed")));
		}
		Pin::new(&mut self.inner).poll_read(cx, buf)
	}
}

impl AsyncWrite for DeadlineConn {
	fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
		if self.expired(cx) {
			return Poll::Ready(Err(io::Error::new(io::ErrorKind::TimedOut, "reject stall deadline elapsed")));
		}
		Pin::new(&mut self.inner).poll_write(cx, buf)
	}

	fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
		Pin::new(&mut self.inner).poll_flush(cx)
	}

	fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
		Pin::new(&mut self.inner).poll_shutdown(cx)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Arc;
	use tokio::io::AsyncReadExt;

	#[tokio::test]
	async fn no_op_conn_reads_eof_immediately() {
		let mut conn = NoOpConn;
		let mut buf = [0u8; 8];
		let n = conn.read(&mut buf).await.unwrap();
		assert_eq!(n, 0);
	}

	#[tokio::test]
	async fn counter_escalates_after_threshold() {
		let counter = Arc::new(RejectCounter::new());
		let adapter = RejectAdapter::new("REJECT", counter);
		let mut m = Metadata::new(crate::types::Network::Tcp, "127.0.0.1:1".parse().unwrap(), "test");
		m.dst_ip = Some("1.2.3.4".parse().unwrap());
		m.dst_port = 80;
		for _ in 0..THRESHOLD {
			let _ = adapter.dial_tcp(&m).await.unwrap();
		}
		// the 51st dial crosses the threshold and gets the piped/deadline conn
		let conn = adapter.dial_tcp(&m).await.unwrap();
		drop(conn);
	}

	#[test]
	fn disables_dns_resolution() {
		let adapter = RejectAdapter::new("REJECT", Arc::new(RejectCounter::new()));
		assert!(adapter.disable_dns_resolve());
	}
}
