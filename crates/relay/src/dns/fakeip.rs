//! Fake-IP store: a bidirectional host↔IP map backed by a bounded,
//! round-robin pool carved out of a configured IPv4 CIDR. Allocating the
//! same host twice returns the same IP; allocating past the pool size
//! evicts the oldest assignment and frees its address for reuse.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

use ipnet::Ipv4Net;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use relay_core::Strng;

use crate::rules::Rule;
use crate::rules::domain::DomainRule;
use crate::types::Metadata;

/// Hard ceiling on how many addresses get precomputed from the pool CIDR,
/// so a misconfigured `/8` doesn't materialize millions of `Ipv4Addr`s.
const MAX_POOL: usize = 65536;

struct Inner {
	pool: Vec<Ipv4Addr>,
	cursor: usize,
	host_to_ip: HashMap<Strng, Ipv4Addr>,
	ip_to_host: HashMap<Ipv4Addr, Strng>,
}

pub struct FakeIpStore {
	inner: Mutex<Inner>,
}

impl FakeIpStore {
	/// `cidr.hosts()` already skips the network and broadcast addresses.
	pub fn new(cidr: Ipv4Net) -> Self {
		let pool: Vec<Ipv4Addr> = cidr.hosts().take(MAX_POOL).collect();
		FakeIpStore { inner: Mutex::new(Inner { pool, cursor: 0, host_to_ip: HashMap::new(), ip_to_host: HashMap::new() }) }
	}

	pub fn lookup_or_allocate(&self, host: &Strng) -> IpAddr {
		let mut inner = self.inner.lock();
		if let Some(ip) = inner.host_to_ip.get(host) {
			return IpAddr::V4(*ip);
		}
		if inner.pool.is_empty() {
			return IpAddr::V4(Ipv4Addr::UNSPECIFIED);
		}
		let ip = inner.pool[inner.cursor % inner.pool.len()];
		inner.cursor += 1;
		if let Some(old_host) = inner.ip_to_host.remove(&ip) {
			inner.host_to_ip.remove(&old_host);
		}
		inner.host_to_ip.insert(host.clone(), ip);
		inner.ip_to_host.insert(ip, host.clone());
		IpAddr::V4(ip)
	}

	pub fn reverse(&self, ip: IpAddr) -> Option<Strng> {
		let IpAddr::V4(v4) = ip else { return None };
		self.inner.lock().ip_to_host.get(&v4).cloned()
	}

	/// Migrates every current host↔IP pair into a fresh store generation
	/// over the same pool, preserving existing assignments across a
	/// config reload rather than starting blank.
	pub fn clone_to(&self) -> FakeIpStore {
		let inner = self.inner.lock();
		let mut fresh = Inner { pool: inner.pool.clone(), cursor: inner.cursor, host_to_ip: HashMap::new(), ip_to_host: HashMap::new() };
		for (host, ip) in inner.host_to_ip.iter() {
			fresh.host_to_ip.insert(host.clone(), *ip);
			fresh.ip_to_host.insert(*ip, host.clone());
		}
		FakeIpStore { inner: Mutex::new(fresh) }
	}

	pub fn persist(&self, path: &Path) -> std::io::Result<()> {
		let inner = self.inner.lock();
		let snapshot: HashMap<&str, Ipv4Addr> = inner.host_to_ip.iter().map(|(h, ip)| (h.as_str(), *ip)).collect();
		let bytes = serde_json::to_vec(&PersistedSnapshot { host_to_ip: snapshot }).map_err(std::io::Error::other)?;
		std::fs::write(path, bytes)
	}

	pub fn load_persisted(path: &Path, cidr: Ipv4Net) -> std::io::Result<FakeIpStore> {
		let store = FakeIpStore::new(cidr);
		let Ok(bytes) = std::fs::read(path) else { return Ok(store) };
		let snapshot: PersistedOwned = serde_json::from_slice(&bytes).map_err(std::io::Error::other)?;
		let mut inner = store.inner.lock();
		for (host, ip) in snapshot.host_to_ip {
			let host: Strng = host.into();
			inner.host_to_ip.insert(host.clone(), ip);
			inner.ip_to_host.insert(ip, host);
		}
		drop(inner);
		Ok(store)
	}
}

#[derive(Serialize)]
struct PersistedSnapshot<'a> {
	host_to_ip: HashMap<&'a str, Ipv4Addr>,
}

#[derive(Deserialize)]
struct PersistedOwned {
	host_to_ip: HashMap<String, Ipv4Addr>,
}

/// True when `host` (from `metadata.host`) should be served a fake IP --
/// all A queries except those excluded by `fake-ip-filter`'s domain
/// patterns, reusing the rule engine's domain matcher.
pub fn filter_excludes(filter: &[DomainRule], metadata: &Metadata) -> bool {
	filter.iter().any(|rule| rule.matches(metadata))
}

#[cfg(test)]
mod tests {
	use std::str::FromStr;

	use super::*;

	#[test]
	fn allocations_are_distinct_and_stable() {
		let store = FakeIpStore::new(Ipv4Net::from_str("198.18.0.0/28").unwrap());
		let a: Strng = "a.example.com".into();
		let b: Strng = "b.example.com".into();
		let ip_a = store.lookup_or_allocate(&a);
		let ip_b = store.lookup_or_allocate(&b);
		assert_ne!(ip_a, ip_b);
		assert_eq!(store.lookup_or_allocate(&a), ip_a);
	}

	#[test]
	fn reverse_lookup_returns_the_same_pair() {
		let store = FakeIpStore::new(Ipv4Net::from_str("198.18.0.0/28").unwrap());
		let host: Strng = "a.example.com".into();
		let ip = store.lookup_or_allocate(&host);
		assert_eq!(store.reverse(ip).as_deref(), Some("a.example.com"));
	}

	#[test]
	fn clone_to_preserves_existing_assignments() {
		let store = FakeIpStore::new(Ipv4Net::from_str("198.18.0.0/28").unwrap());
		let host: Strng = "a.example.com".into();
		let ip = store.lookup_or_allocate(&host);
		let migrated = store.clone_to();
		assert_eq!(migrated.lookup_or_allocate(&host), ip);
	}
}
