//! Best-effort discovery of system-configured resolvers, standing in for
//! a full DHCP client. A full DHCP lease negotiation is a network-stack
//! concern below this crate's layer; `SystemResolvers` instead reads the
//! same `/etc/resolv.conf`-style hints the OS resolver itself uses,
//! behind a trait so a platform-specific implementation can be swapped in
//! without touching callers.
use std::net::{IpAddr, SocketAddr};

pub trait SystemResolvers: Send + Sync {
	/// Best-effort; an empty list means "no system resolvers discovered",
	/// not an error.
	fn discover(&self) -> Vec<SocketAddr>;
}

pub struct ResolvConf {
	path: std::path::PathBuf,
}

impl ResolvConf {
	pub fn new() -> Self {
		ResolvConf { path: "/etc/resolv.conf".into() }
	}

	#[cfg(test)]
	fn at(path: impl Into<std::path::PathBuf>) -> Self {
		ResolvConf { path: path.into() }
	}
}

impl Default for ResolvConf {
	fn default() -> Self {
		Self::new()
	}
}

impl SystemResolvers for ResolvConf {
	fn discover(&self) -> Vec<SocketAddr> {
		let Ok(contents) = std::fs::read_to_string(&self.path) else { return Vec::new() };
		parse_resolv_conf(&contents)
	}
}

fn parse_resolv_conf(contents: &str) -> Vec<SocketAddr> {
	contents
		.lines()
		.filter_map(|line| line.trim().strip_prefix("nameserver"))
		.filter_map(|rest| rest.trim().parse::<IpAddr>().ok())
		.map(|ip| SocketAddr::new(ip, 53))
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_nameserver_lines() {
		let addrs = parse_resolv_conf("# comment\nnameserver 1.1.1.1\nnameserver 2606:4700:4700::1111\nsearch example.com\n");
		assert_eq!(addrs, vec!["1.1.1.1:53".parse().unwrap(), "[2606:4700:4700::1111]:53".parse().unwrap()]);
	}

	#[test]
	fn missing_file_discovers_nothing() {
		let r = ResolvConf::at("/nonexistent/resolv.conf");
		assert!(r.discover().is_empty());
	}
}
