//! Top-level config loader: turns one YAML document into a live
//! [`Config`] -- DNS transports, rules, proxy providers, static proxies,
//! and logging, assembled from the nested `map<string, any>` surface
//! (§6) rather than a single proxy entry (that half is `parser`'s job).

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ipnet::Ipv4Net;
use regex::Regex;
use serde::Deserialize;

use crate::adapter::ProxyAdapter;
use crate::adapter::direct::DirectAdapter;
use crate::adapter::reject::{RejectAdapter, RejectCounter};
use crate::dispatcher::AdapterRegistry;
use crate::dns::fakeip::FakeIpStore;
use crate::dns::resolver::{FakeIpSettings, ResolverConfig};
use crate::dns::transport::dhcp::{ResolvConf, SystemResolvers};
use crate::dns::transport::doh::DohTransport;
use crate::dns::transport::doq::DoqTransport;
use crate::dns::transport::dot::DotTransport;
use crate::dns::transport::tcp::TcpTransport;
use crate::dns::transport::udp::UdpTransport;
use crate::dns::transport::{AdapterLookup, DnsTransport};
use crate::provider::{HealthCheckConfig, Provider, Vehicle};
use crate::rules::Rule;
use crate::rules::domain::{DomainKind, DomainRule};
use crate::rules::geoip::{GeoIpDatabase, GeoIpRule};
use crate::rules::ipcidr::IpCidrRule;
use crate::rules::match_all::MatchAllRule;
use crate::rules::port::{PortRule, PortType};
use crate::rules::process::ProcessRule;
use crate::rules::ruleset::{RuleSetBehavior, RuleSetProvider, RuleSetRule};
use crate::Config;
use relay_core::Strng;
use relay_core::telemetry::LoggingConfig;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
	#[error("read {0}: {1}")]
	Read(PathBuf, #[source] std::io::Error),
	#[error("parse document: {0}")]
	Parse(#[from] serde_yaml::Error),
	#[error("nameserver {0:?}: {1}")]
	Nameserver(String, String),
	#[error("rule line {0:?}: {1}")]
	Rule(String, String),
	#[error("proxy-provider {0:?}: {1}")]
	Provider(String, String),
	#[error(transparent)]
	GeoIp(#[from] crate::rules::geoip::GeoIpError),
	#[error("rule {0:?} references unknown rule-provider {1:?}")]
	UnknownRuleProvider(String, String),
	#[error(transparent)]
	Other(#[from] anyhow::Error),
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
struct RawFallbackFilter {
	geoip: bool,
	geoip_code: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case", default)]
struct RawDns {
	ipv4: bool,
	ipv6: bool,
	nameserver: Vec<String>,
	fallback: Vec<String>,
	fallback_filter: RawFallbackFilter,
	fake_ip: bool,
	fake_ip_range: Option<String>,
	fake_ip_filter: Vec<String>,
	fake_ip_cache_file: Option<String>,
}

impl Default for RawDns {
	fn default() -> Self {
		RawDns {
			ipv4: true,
			ipv6: false,
			nameserver: Vec::new(),
			fallback: Vec::new(),
			fallback_filter: RawFallbackFilter::default(),
			fake_ip: false,
			fake_ip_range: None,
			fake_ip_filter: Vec::new(),
			fake_ip_cache_file: None,
		}
	}
}

fn default_hc_interval() -> Duration {
	Duration::from_secs(300)
}
fn default_hc_timeout() -> Duration {
	Duration::from_secs(5)
}
fn default_hc_url() -> String {
	"https://www.gstatic.com/generate_204".to_string()
}
fn default_true() -> bool {
	true
}

#[derive(Deserialize, Clone)]
#[serde(rename_all = "kebab-case")]
struct RawHealthCheck {
	#[serde(default)]
	enable: bool,
	#[serde(default = "default_hc_interval", with = "crate::serde_dur")]
	interval: Duration,
	#[serde(default = "default_true")]
	lazy: bool,
	#[serde(default = "default_hc_url")]
	url: String,
	#[serde(default = "default_hc_timeout", with = "crate::serde_dur")]
	timeout: Duration,
}

impl Default for RawHealthCheck {
	fn default() -> Self {
		RawHealthCheck { enable: false, interval: default_hc_interval(), lazy: true, url: default_hc_url(), timeout: default_hc_timeout() }
	}
}

impl From<RawHealthCheck> for HealthCheckConfig {
	fn from(r: RawHealthCheck) -> Self {
		HealthCheckConfig { enable: r.enable, interval: r.interval, lazy: r.lazy, url: r.url, timeout: r.timeout }
	}
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawProxyProvider {
	#[serde(rename = "type")]
	kind: String,
	#[serde(default)]
	path: Option<String>,
	#[serde(default)]
	url: Option<String>,
	#[serde(default)]
	headers: HashMap<String, String>,
	#[serde(default)]
	filter: Option<String>,
	#[serde(rename = "override", default)]
	prefix_name: Option<RawOverride>,
	#[serde(rename = "health-check", default)]
	health_check: RawHealthCheck,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
struct RawOverride {
	additional_prefix: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawRuleProvider {
	#[serde(rename = "type")]
	kind: String,
	#[serde(default)]
	path: Option<String>,
	#[serde(default)]
	url: Option<String>,
	behavior: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
struct RawConfig {
	#[serde(rename = "log")]
	logging: LoggingConfig,
	#[serde(rename = "control-addr")]
	control_addr: Option<String>,
	#[serde(rename = "geoip-database")]
	geoip_database: Option<String>,
	dns: RawDns,
	proxies: Vec<serde_yaml::Value>,
	#[serde(rename = "proxy-providers")]
	proxy_providers: HashMap<String, RawProxyProvider>,
	#[serde(rename = "rule-providers")]
	rule_providers: HashMap<String, RawRuleProvider>,
	rules: Vec<String>,
}

/// Loads and decodes a full document into a [`Config`] -- static
/// proxies, providers, rules, DNS transports, logging -- fetching
/// remote rule-set/proxy-provider bodies as needed along the way.
pub async fn load(path: &Path) -> Result<Config, ConfigError> {
	let bytes = tokio::fs::read(path).await.map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
	let raw: RawConfig = serde_yaml::from_slice(&bytes)?;

	let control_addr = raw
		.control_addr
		.as_deref()
		.map(|s| s.parse::<SocketAddr>())
		.transpose()
		.map_err(|e| ConfigError::Other(anyhow::anyhow!("invalid control-addr: {e}")))?;

	let geoip_db = raw
		.geoip_database
		.as_deref()
		.map(|p| GeoIpDatabase::open(Path::new(p)))
		.transpose()?;

	let mut static_adapters: Vec<Arc<dyn ProxyAdapter>> = vec![
		Arc::new(DirectAdapter::new("DIRECT", None, None)),
		Arc::new(RejectAdapter::new("REJECT", Arc::new(RejectCounter::new()))),
	];
	for raw_proxy in &raw.proxies {
		let adapter = crate::parser::build_proxy(raw_proxy).map_err(ConfigError::Other)?;
		static_adapters.push(adapter);
	}

	let providers = build_providers(&raw.proxy_providers)?;
	for provider in &providers {
		provider.update().await.map_err(|e| ConfigError::Provider(provider.name().to_string(), e.to_string()))?;
	}
	let registry = Arc::new(AdapterRegistry::new(static_adapters, providers.clone()));

	let rule_set_providers = build_rule_set_providers(&raw.rule_providers)?;
	for (name, provider) in &rule_set_providers {
		provider
			.update(&reqwest::Client::new())
			.await
			.map_err(|e| ConfigError::Rule(name.clone(), e.to_string()))?;
	}

	let rules = build_rules(&raw.rules, geoip_db.clone(), &rule_set_providers)?;

	let dns = build_resolver_config(&raw.dns, geoip_db, registry.clone())?;

	Ok(Config {
		logging: raw.logging,
		dns,
		rules,
		providers,
		control_addr,
		registry,
		udp_fallback_match: Vec::new(),
	})
}

fn build_providers(raw: &HashMap<String, RawProxyProvider>) -> Result<Vec<Arc<Provider>>, ConfigError> {
	let mut providers = Vec::with_capacity(raw.len());
	for (name, p) in raw {
		let vehicle = build_vehicle(name, &p.kind, p.path.as_deref(), p.url.as_deref(), &p.headers)?;
		let filter = p
			.filter
			.as_deref()
			.map(Regex::new)
			.transpose()
			.map_err(|e| ConfigError::Other(anyhow::anyhow!("provider {name:?} filter: {e}")))?;
		let prefix = p.prefix_name.as_ref().and_then(|o| o.additional_prefix.clone());
		let health: HealthCheckConfig = p.health_check.clone().into();
		providers.push(Arc::new(Provider::new(name.clone(), vehicle, filter, prefix, health)));
	}
	Ok(providers)
}

fn build_rule_set_providers(raw: &HashMap<String, RawRuleProvider>) -> Result<HashMap<String, Arc<RuleSetProvider>>, ConfigError> {
	let mut out = HashMap::with_capacity(raw.len());
	for (name, p) in raw {
		let vehicle = build_vehicle(name, &p.kind, p.path.as_deref(), p.url.as_deref(), &HashMap::new())?;
		let behavior = match p.behavior.as_str() {
			"domain" => RuleSetBehavior::Domain,
			"ipcidr" => RuleSetBehavior::IpCidr,
			"classical" => RuleSetBehavior::Classical,
			other => return Err(ConfigError::Other(anyhow::anyhow!("rule-provider {name:?}: unknown behavior {other:?}"))),
		};
		out.insert(name.clone(), Arc::new(RuleSetProvider::new(name.clone(), vehicle, behavior)));
	}
	Ok(out)
}

fn build_vehicle(name: &str, kind: &str, path: Option<&str>, url: Option<&str>, headers: &HashMap<String, String>) -> Result<Vehicle, ConfigError> {
	match kind {
		"file" => {
			let path = path.ok_or_else(|| ConfigError::Other(anyhow::anyhow!("provider {name:?}: file vehicle needs a path")))?;
			Ok(Vehicle::File { path: PathBuf::from(path) })
		},
		"http" => {
			let url = url.ok_or_else(|| ConfigError::Other(anyhow::anyhow!("provider {name:?}: http vehicle needs a url")))?.to_string();
			let cache_dir = std::env::var_os("HOME")
				.map(PathBuf::from)
				.ok_or_else(|| ConfigError::Other(anyhow::anyhow!("HOME is not set")))?
				.join(".cache")
				.join("relay")
				.join(format!("{name}.yaml"));
			Ok(Vehicle::Http {
				url,
				headers: headers.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
				cache_path: cache_dir,
				url_proxy: None,
			})
		},
		other => Err(ConfigError::Other(anyhow::anyhow!("provider {name:?}: unknown vehicle type {other:?}"))),
	}
}

/// Parses one `"<TYPE>,<payload>,<adapter>[,no-resolve]"` rule line, or
/// the two-field `"MATCH,<adapter>"` form, per §6.
fn parse_rule_line(
	line: &str,
	geoip_db: Option<&Arc<GeoIpDatabase>>,
	rule_sets: &HashMap<String, Arc<RuleSetProvider>>,
) -> Result<Arc<dyn Rule>, ConfigError> {
	let err = || ConfigError::Rule(line.to_string(), "malformed rule line".to_string());
	let parts: Vec<&str> = line.split(',').map(str::trim).collect();
	let kind = *parts.first().ok_or_else(err)?;

	if kind.eq_ignore_ascii_case("match") {
		let adapter = parts.get(1).ok_or_else(err)?;
		return Ok(Arc::new(MatchAllRule::new(*adapter)));
	}

	let payload = parts.get(1).ok_or_else(err)?;
	let adapter = parts.get(2).ok_or_else(err)?;
	let no_resolve = parts.get(3).is_some_and(|s| s.eq_ignore_ascii_case("no-resolve"));

	let rule: Arc<dyn Rule> = match kind.to_ascii_uppercase().as_str() {
		"DOMAIN" => Arc::new(DomainRule::new(*payload, *adapter, DomainKind::Exact)),
		"DOMAIN-SUFFIX" => Arc::new(DomainRule::new(*payload, *adapter, DomainKind::Suffix)),
		"DOMAIN-KEYWORD" => Arc::new(DomainRule::new(*payload, *adapter, DomainKind::Keyword)),
		"IP-CIDR" | "IP-CIDR6" => Arc::new(IpCidrRule::new(payload, *adapter, no_resolve).map_err(|e| ConfigError::Rule(line.to_string(), e.to_string()))?),
		"SRC-PORT" => Arc::new(PortRule::new(payload, *adapter, PortType::Src).map_err(|e| ConfigError::Rule(line.to_string(), e.to_string()))?),
		"DST-PORT" => Arc::new(PortRule::new(payload, *adapter, PortType::Dst).map_err(|e| ConfigError::Rule(line.to_string(), e.to_string()))?),
		"IN-PORT" => Arc::new(PortRule::new(payload, *adapter, PortType::Inbound).map_err(|e| ConfigError::Rule(line.to_string(), e.to_string()))?),
		"PROCESS-NAME" => Arc::new(ProcessRule::new(*payload, *adapter)),
		"GEOIP" => {
			let db = geoip_db
				.cloned()
				.ok_or_else(|| ConfigError::Rule(line.to_string(), "GEOIP rule needs geoip-database configured".to_string()))?;
			Arc::new(GeoIpRule::new(payload, *adapter, no_resolve, db))
		},
		"RULE-SET" => {
			let provider = rule_sets
				.get(*payload)
				.cloned()
				.ok_or_else(|| ConfigError::UnknownRuleProvider(line.to_string(), payload.to_string()))?;
			Arc::new(RuleSetRule::new(*adapter, no_resolve, provider))
		},
		other => return Err(ConfigError::Rule(line.to_string(), format!("unknown rule type {other:?}"))),
	};
	Ok(rule)
}

fn build_rules(lines: &[String], geoip_db: Option<Arc<GeoIpDatabase>>, rule_sets: &HashMap<String, Arc<RuleSetProvider>>) -> Result<Vec<Arc<dyn Rule>>, ConfigError> {
	lines.iter().map(|line| parse_rule_line(line, geoip_db.as_ref(), rule_sets)).collect()
}

/// Scheme-prefixed nameserver grammar: `https://` -> DoH, `tls://` ->
/// DoT (default port 853), `quic://` -> DoQ (default port 853), `dhcp://`
/// -> one UDP+TCP-fallback pair per system resolver discovered off
/// `/etc/resolv.conf`, a bare `host:port` or `udp://host:port` -> plain
/// UDP (default port 53). A trailing `#proxy-name` tunnels the
/// transport through that adapter (dhcp entries are never tunneled --
/// they stand in for the host's own network configuration).
fn resolve_nameserver(raw: &str, registry: &Arc<AdapterRegistry>) -> Result<Vec<(Strng, Arc<dyn DnsTransport>)>, ConfigError> {
	if raw.strip_prefix("dhcp://").is_some() {
		let resolvers = ResolvConf::new();
		return Ok(resolvers
			.discover()
			.into_iter()
			.map(|addr| {
				let udp = UdpTransport::new(addr).with_tcp_fallback(Arc::new(TcpTransport::new(addr)));
				(format!("dhcp({addr})").into(), Arc::new(udp) as Arc<dyn DnsTransport>)
			})
			.collect());
	}
	parse_nameserver(raw, registry).map(|entry| vec![entry])
}

fn parse_nameserver(raw: &str, registry: &Arc<AdapterRegistry>) -> Result<(Strng, Arc<dyn DnsTransport>), ConfigError> {
	let err = |msg: String| ConfigError::Nameserver(raw.to_string(), msg);
	let (body, proxy_adapter) = match raw.split_once('#') {
		Some((b, p)) => (b, Some(p.to_string())),
		None => (raw, None),
	};
	let lookup: Arc<dyn AdapterLookup> = registry.clone();

	if let Some(rest) = body.strip_prefix("https://") {
		let url = format!("https://{rest}");
		let transport: Arc<dyn DnsTransport> = Arc::new(DohTransport::new(url, Arc::new(reqwest::Client::new())));
		return Ok((raw.into(), transport));
	}

	if let Some(rest) = body.strip_prefix("tls://") {
		let (host, addr) = host_port(rest, 853).map_err(|e| err(e))?;
		let transport: Arc<dyn DnsTransport> = {
			let mut t = DotTransport::new(addr, host, crate::parser::default_tls_config());
			if let Some(name) = &proxy_adapter {
				t = t.with_proxy_adapter(name.clone(), lookup.clone());
			}
			Arc::new(t)
		};
		return Ok((raw.into(), transport));
	}

	if let Some(rest) = body.strip_prefix("quic://") {
		let (host, addr) = host_port(rest, 853).map_err(|e| err(e))?;
		let transport = DoqTransport::new(addr, host, (*crate::parser::default_tls_config()).clone()).map_err(|e| err(e.to_string()))?;
		return Ok((raw.into(), Arc::new(transport)));
	}

	let rest = body.strip_prefix("udp://").unwrap_or(body);
	let (_host, addr) = host_port(rest, 53).map_err(|e| err(e))?;
	let mut udp = UdpTransport::new(addr);
	let mut tcp = TcpTransport::new(addr);
	if let Some(name) = &proxy_adapter {
		udp = udp.with_proxy_adapter(name.clone(), lookup.clone());
		tcp = tcp.with_proxy_adapter(name.clone(), lookup);
	}
	let udp = udp.with_tcp_fallback(Arc::new(tcp));
	Ok((raw.into(), Arc::new(udp)))
}

fn host_port(rest: &str, default_port: u16) -> Result<(String, SocketAddr), String> {
	match rest.parse::<SocketAddr>() {
		Ok(addr) => {
			let host = match addr.ip() {
				IpAddr::V4(v4) => v4.to_string(),
				IpAddr::V6(v6) => v6.to_string(),
			};
			Ok((host, addr))
		},
		Err(_) => {
			let (host, port) = match rest.rsplit_once(':') {
				Some((h, p)) => (h, p.parse::<u16>().map_err(|_| format!("invalid port {p:?}"))?),
				None => (rest, default_port),
			};
			let addr: SocketAddr = format!("{host}:{port}").parse().map_err(|e| format!("invalid nameserver address: {e}"))?;
			Ok((host.to_string(), addr))
		},
	}
}

fn build_resolver_config(raw: &RawDns, geoip_db: Option<Arc<GeoIpDatabase>>, registry: Arc<AdapterRegistry>) -> Result<ResolverConfig, ConfigError> {
	let main = raw
		.nameserver
		.iter()
		.map(|n| resolve_nameserver(n, &registry))
		.collect::<Result<Vec<_>, _>>()?
		.into_iter()
		.flatten()
		.collect();
	let fallback = raw
		.fallback
		.iter()
		.map(|n| resolve_nameserver(n, &registry))
		.collect::<Result<Vec<_>, _>>()?
		.into_iter()
		.flatten()
		.collect();

	let fallback_filter_db = if raw.fallback_filter.geoip { geoip_db.clone() } else { None };
	let fallback_filter_country = raw.fallback_filter.geoip_code.clone();

	let fake_ip = if raw.fake_ip {
		let cidr: Ipv4Net = raw
			.fake_ip_range
			.as_deref()
			.unwrap_or("198.18.0.1/16")
			.parse()
			.map_err(|e| ConfigError::Other(anyhow::anyhow!("invalid fake-ip-range: {e}")))?;
		let store = match &raw.fake_ip_cache_file {
			Some(path) => FakeIpStore::load_persisted(Path::new(path), cidr).map_err(|e| ConfigError::Other(e.into()))?,
			None => FakeIpStore::new(cidr),
		};
		let filter = raw
			.fake_ip_filter
			.iter()
			.map(|pattern| DomainRule::new(pattern.clone(), "", DomainKind::Suffix))
			.collect();
		Some(Arc::new(FakeIpSettings { store: Arc::new(store), filter }))
	} else {
		None
	};

	Ok(ResolverConfig {
		main,
		fallback,
		fallback_filter_db,
		fallback_filter_country,
		ipv4_disabled: !raw.ipv4,
		ipv6_disabled: !raw.ipv6,
		fake_ip,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn loads_a_minimal_document() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("config.yaml");
		tokio::fs::write(
			&path,
			br#"
log:
  filter: info
dns:
  nameserver:
    - "1.1.1.1:53"
proxies:
  - type: direct
    name: proxy
rules:
  - MATCH,DIRECT
"#,
		)
		.await
		.unwrap();

		let config = load(&path).await.unwrap();
		assert_eq!(config.rules.len(), 1);
		assert_eq!(config.dns.main.len(), 1);
		assert!(config.registry.find("proxy").is_some());
		assert!(config.registry.find("DIRECT").is_some());
	}

	#[test]
	fn parses_scheme_prefixed_nameservers() {
		let registry = Arc::new(AdapterRegistry::new(Vec::new(), Vec::new()));
		assert!(parse_nameserver("8.8.8.8:53", &registry).is_ok());
		assert!(parse_nameserver("tls://1.1.1.1:853", &registry).is_ok());
		assert!(parse_nameserver("https://dns.example/dns-query", &registry).is_ok());
	}

	#[test]
	fn dhcp_nameserver_never_errors_even_with_no_system_resolvers() {
		let registry = Arc::new(AdapterRegistry::new(Vec::new(), Vec::new()));
		assert!(resolve_nameserver("dhcp://", &registry).is_ok());
	}

	#[tokio::test]
	async fn proxy_provider_is_populated_before_config_is_returned() {
		let dir = tempfile::tempdir().unwrap();
		let provider_path = dir.path().join("provider.yaml");
		tokio::fs::write(&provider_path, b"proxies:\n  - type: direct\n    name: from-provider\n").await.unwrap();

		let config_path = dir.path().join("config.yaml");
		tokio::fs::write(
			&config_path,
			format!(
				r#"
dns:
  nameserver:
    - "1.1.1.1:53"
proxy-providers:
  myset:
    type: file
    path: "{}"
rules:
  - MATCH,DIRECT
"#,
				provider_path.display()
			),
		)
		.await
		.unwrap();

		let config = load(&config_path).await.unwrap();
		assert!(config.registry.find("from-provider").is_some());
	}

	#[test]
	fn rejects_an_unknown_rule_type() {
		let err = parse_rule_line("BOGUS,foo,DIRECT", None, &HashMap::new()).unwrap_err();
		assert!(matches!(err, ConfigError::Rule(_, _)));
	}

	#[test]
	fn match_all_only_needs_two_fields() {
		let rule = parse_rule_line("MATCH,DIRECT", None, &HashMap::new()).unwrap();
		assert_eq!(rule.adapter(), "DIRECT");
	}
}
