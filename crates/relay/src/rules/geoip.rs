//! GEOIP rule: looks up `metadata.dst_ip` in a MaxMind country database and
//! compares the ISO country code case-insensitively. The reader is mmap'd
//! once per database path and shared across every rule built against it.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use maxminddb::geoip2;

use super::{Rule, RuleType};
use crate::types::Metadata;

#[derive(thiserror::Error, Debug)]
pub enum GeoIpError {
	#[error("open geoip database {0}: {1}")]
	Open(PathBuf, #[source] maxminddb::MaxMindDBError),
}

pub struct GeoIpDatabase {
	reader: maxminddb::Reader<Vec<u8>>,
}

impl GeoIpDatabase {
	pub fn open(path: &Path) -> Result<Arc<Self>, GeoIpError> {
		let reader: maxminddb::Reader<Vec<u8>> =
			maxminddb::Reader::open_readfile(path).map_err(|e| GeoIpError::Open(path.to_path_buf(), e))?;
		Ok(Arc::new(GeoIpDatabase { reader }))
	}

	pub fn country_code(&self, ip: IpAddr) -> Option<String> {
		let country: geoip2::Country = self.reader.lookup(ip).ok()??;
		country.country?.iso_code.map(str::to_string)
	}
}

pub struct GeoIpRule {
	adapter: String,
	payload: String,
	country: String,
	no_resolve: bool,
	db: Arc<GeoIpDatabase>,
}

impl GeoIpRule {
	pub fn new(payload: &str, adapter: impl Into<String>, no_resolve: bool, db: Arc<GeoIpDatabase>) -> Self {
		GeoIpRule { adapter: adapter.into(), payload: payload.to_string(), country: payload.to_uppercase(), no_resolve, db }
	}
}

impl Rule for GeoIpRule {
	fn rule_type(&self) -> RuleType {
		RuleType::GeoIp
	}

	fn payload(&self) -> &str {
		&self.payload
	}

	fn adapter(&self) -> &str {
		&self.adapter
	}

	fn should_resolve_ip(&self) -> bool {
		!self.no_resolve
	}

	fn matches(&self, metadata: &Metadata) -> bool {
		// "LAN" has no MaxMind entry; treat private/loopback destinations as
		// a match the way upstream's built-in LAN allowlist does.
		if self.country == "LAN" {
			return metadata.dst_ip.is_some_and(is_private_or_loopback);
		}
		let Some(ip) = metadata.dst_ip else { return false };
		self.db.country_code(ip).is_some_and(|code| code.eq_ignore_ascii_case(&self.country))
	}
}

fn is_private_or_loopback(ip: IpAddr) -> bool {
	match ip {
		IpAddr::V4(v4) => v4.is_private() || v4.is_loopback() || v4.is_link_local(),
		IpAddr::V6(v6) => v6.is_loopback() || (v6.segments()[0] & 0xfe00) == 0xfc00,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn lan_matches_private_ranges_without_a_database() {
		assert!(is_private_or_loopback("10.1.2.3".parse().unwrap()));
		assert!(is_private_or_loopback("192.168.1.1".parse().unwrap()));
		assert!(!is_private_or_loopback("8.8.8.8".parse().unwrap()));
	}
}
