//! Multi-transport DNS resolution: wire clients (`transport`), the answer
//! cache and fake-IP store, a picker that races the configured upstreams,
//! and the `resolver` module tying them together into one `exchange` call.

pub mod cache;
pub mod fakeip;
pub mod picker;
pub mod resolver;
pub mod transport;

pub use resolver::{Answer, DnsError, Resolver, ResolverConfig};
