//! Wire-format DNS transports. Each one exposes `exchange(query) → answer`
//! over a distinct carrier (UDP, TCP, DoT, DoH, DoQ); the resolver core
//! races them through a `Picker` (§4.6). All share `hickory_proto::op::
//! Message` for encode/decode instead of a hand-rolled DNS codec.

pub mod dhcp;
pub mod doh;
pub mod doq;
pub mod dot;
pub mod tcp;
pub mod udp;

use std::sync::Arc;

use async_trait::async_trait;
use hickory_proto::op::Message;

use crate::adapter::ProxyAdapter;

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
	#[error("proxy adapter {0} not found")]
	ProxyNotFound(String),
	#[error("{0} does not support udp, required for this transport")]
	UdpUnsupported(String),
	#[error(transparent)]
	Io(#[from] std::io::Error),
	#[error(transparent)]
	Adapter(#[from] crate::adapter::AdapterError),
	#[error("dns message encode/decode: {0}")]
	Proto(#[from] hickory_proto::ProtoError),
	#[error(transparent)]
	Http(#[from] reqwest::Error),
	#[error("quic: {0}")]
	Quic(String),
	#[error("all dns requests failed")]
	AllFailed,
}

/// Resolves a `proxy-adapter` name to a live adapter instance. Implemented
/// by whatever owns the adapter registry (the resolver core is handed one
/// at construction) so transports never construct adapters themselves --
/// matches the `Arc<dyn HostResolver>` injection pattern used to break the
/// resolver/adapter cycle on the dialing side.
pub trait AdapterLookup: Send + Sync {
	fn find(&self, name: &str) -> Option<Arc<dyn ProxyAdapter>>;
}

#[async_trait]
pub trait DnsTransport: Send + Sync {
	async fn exchange(&self, query: &Message) -> Result<Message, TransportError>;
}

/// Shared helper: when a transport is configured with a `proxy-adapter`
/// name, look it up and fail with `ProxyNotFound` rather than silently
/// dialing direct -- callers that want the "bind name as interface"
/// fallback from §4.5 implement that one level up, where the raw name is
/// still available.
pub(crate) fn require_adapter(lookup: &dyn AdapterLookup, name: &str) -> Result<Arc<dyn ProxyAdapter>, TransportError> {
	lookup.find(name).ok_or_else(|| TransportError::ProxyNotFound(name.to_string()))
}
