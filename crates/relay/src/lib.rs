#![allow(clippy::too_many_arguments)]
//! Core of a userspace traffic-routing proxy: outbound adapters (direct,
//! reject, HTTP/SOCKS5, Shadowsocks/SSR, VMess/VLESS, Trojan, Snell,
//! WireGuard), a multi-transport DNS resolver, a rule engine with dynamic
//! proxy providers, and the tunnel dispatcher that binds a connection to
//! an adapter.

use std::path::PathBuf;
use std::time::Duration;

use relay_core::prelude::*;

pub mod adapter;
pub mod config;
pub mod control;
pub mod crypto;
pub mod dispatcher;
pub mod dns;
pub mod parser;
pub mod provider;
pub mod rules;
pub mod transport;
pub mod types;

pub use relay_core::Strng;

/// Top-level runtime configuration, assembled by `config::load` from the
/// nested `map<string, any>` input. Holds live trait objects (rules,
/// providers), so unlike the raw deserialized form it does not derive
/// `Debug`.
#[derive(Clone)]
pub struct Config {
	pub logging: relay_core::telemetry::LoggingConfig,
	pub dns: dns::resolver::ResolverConfig,
	pub rules: Vec<Arc<dyn rules::Rule>>,
	pub providers: Vec<Arc<provider::Provider>>,
	pub control_addr: Option<SocketAddr>,
	pub registry: Arc<dispatcher::AdapterRegistry>,
	/// Hosts that must hard-fail a UDP request rather than be silently
	/// rewritten to TCP when the matched adapter lacks UDP support.
	pub udp_fallback_match: Vec<rules::domain::DomainRule>,
}

impl Config {
	/// Builds a fresh `Dispatcher` (and the `Resolver` it dials through)
	/// from this configuration. Cheap to call more than once; callers
	/// that want a single shared resolver should keep the result around
	/// rather than recomputing it per connection.
	pub fn dispatcher(&self) -> dispatcher::Dispatcher {
		let resolver = Arc::new(dns::resolver::Resolver::new(self.dns.clone()));
		dispatcher::Dispatcher::new(self.rules.clone(), self.registry.clone(), resolver, self.udp_fallback_match.clone())
	}
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct LocalCacheDir(());

pub(crate) fn home_subpath(path: &std::path::Path) -> anyhow::Result<PathBuf> {
	let home = std::env::var_os("HOME").ok_or_else(|| anyhow::anyhow!("HOME is not set"))?;
	let home = PathBuf::from(home);
	let canon = path
		.canonicalize()
		.unwrap_or_else(|_| home.join(path.strip_prefix("/").unwrap_or(path)));
	if canon.starts_with(&home) {
		Ok(canon)
	} else {
		anyhow::bail!("vehicle cache path {} must be under {}", path.display(), home.display())
	}
}

pub(crate) mod serde_dur {
	use std::time::Duration;

	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
		s.serialize_str(&format!("{}ms", d.as_millis()))
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
		let raw = String::deserialize(de)?;
		parse(&raw).map_err(serde::de::Error::custom)
	}

	pub fn parse(raw: &str) -> Result<Duration, String> {
		let raw = raw.trim();
		let (num, unit) = raw
			.find(|c: char| !c.is_ascii_digit() && c != '.')
			.map(|i| raw.split_at(i))
			.ok_or_else(|| format!("invalid duration {raw:?}"))?;
		let n: f64 = num.parse().map_err(|_| format!("invalid duration {raw:?}"))?;
		let secs = match unit {
			"ns" => n / 1_000_000_000.0,
			"us" | "µs" => n / 1_000_000.0,
			"ms" => n / 1000.0,
			"s" => n,
			"m" => n * 60.0,
			"h" => n * 3600.0,
			other => return Err(format!("unknown duration unit {other:?}")),
		};
		Ok(Duration::from_secs_f64(secs))
	}

	pub mod option {
		use std::time::Duration;

		use serde::{Deserialize, Deserializer, Serializer};

		pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
			match d {
				Some(d) => super::serialize(d, s),
				None => s.serialize_none(),
			}
		}

		pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Duration>, D::Error> {
			let raw: Option<String> = Option::deserialize(de)?;
			raw.map(|r| super::parse(&r).map_err(serde::de::Error::custom))
				.transpose()
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_human_durations() {
		assert_eq!(serde_dur::parse("15s").unwrap(), Duration::from_secs(15));
		assert_eq!(serde_dur::parse("5m").unwrap(), Duration::from_secs(300));
		assert_eq!(serde_dur::parse("250ms").unwrap(), Duration::from_millis(250));
	}
}
