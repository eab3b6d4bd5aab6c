//! Config decoding (C10): turns one proxy entry from the nested
//! `map<string, any>` surface (§6) into a live `Arc<dyn ProxyAdapter>`.
//! Each adapter gets its own `#[serde(rename_all = "kebab-case")]`
//! options struct; decoding is a two-pass `serde_yaml::Value` ->
//! discriminant -> concrete struct, which lets the same weakly typed
//! input (`"443"` or `443`, `"true"` or `true`) parse into either an
//! adapter's typed fields without a hand-rolled visitor per adapter.

mod coerce;

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use once_cell::sync::Lazy;
use serde::Deserialize;
use tokio_rustls::rustls::ClientConfig;
use uuid::Uuid;

use crate::adapter::ProxyAdapter;
use crate::adapter::direct::DirectAdapter;
use crate::adapter::http::HttpAdapter;
use crate::adapter::reject::{RejectAdapter, RejectCounter};
use crate::adapter::shadowsocks::ShadowsocksAdapter;
use crate::adapter::shadowsocksr::ShadowsocksRAdapter;
use crate::adapter::snell::SnellAdapter;
use crate::adapter::socks5::Socks5Adapter;
use crate::adapter::trojan::TrojanAdapter;
use crate::adapter::vless::VlessAdapter;
use crate::adapter::vmess::VmessAdapter;
use crate::adapter::wireguard::{WireGuardAdapter, WireGuardConfig};
use crate::transport::shadowsocksr::Options as SsrOptions;

/// System root store, built once and shared by every TLS-dialing adapter
/// a config builds; `rustls::ClientConfig` is cheap to clone (it's
/// `Arc`-backed internally) so this is handed out by reference.
static DEFAULT_TLS_CONFIG: Lazy<Arc<ClientConfig>> = Lazy::new(|| {
	let root_store = rustls::RootCertStore { roots: webpki_roots::TLS_SERVER_ROOTS.into() };
	let config = ClientConfig::builder().with_root_certificates(root_store).with_no_client_auth();
	Arc::new(config)
});

/// Shared default `rustls::ClientConfig` (webpki system roots, no client
/// auth), for the config loader's DoT/DoQ transport construction as well
/// as this module's own `http`/`trojan` adapters.
pub fn default_tls_config() -> Arc<ClientConfig> {
	DEFAULT_TLS_CONFIG.clone()
}

#[derive(Deserialize)]
struct Discriminant {
	#[serde(rename = "type")]
	kind: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DirectOptions {
	name: String,
	interface_name: Option<String>,
	routing_mark: Option<u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RejectOptions {
	name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct HttpOptions {
	name: String,
	server: String,
	#[serde(deserialize_with = "coerce::u16")]
	port: u16,
	username: Option<String>,
	password: Option<String>,
	#[serde(default, deserialize_with = "coerce::bool")]
	tls: bool,
	sni: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Socks5Options {
	name: String,
	server: String,
	#[serde(deserialize_with = "coerce::u16")]
	port: u16,
	username: Option<String>,
	password: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ShadowsocksOptions {
	name: String,
	server: String,
	#[serde(deserialize_with = "coerce::u16")]
	port: u16,
	cipher: String,
	password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ShadowsocksROptions {
	name: String,
	server: String,
	#[serde(deserialize_with = "coerce::u16")]
	port: u16,
	password: String,
	cipher: String,
	obfs: String,
	#[serde(default)]
	obfs_param: String,
	protocol: String,
	#[serde(default)]
	protocol_param: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct VmessOptions {
	name: String,
	server: String,
	#[serde(deserialize_with = "coerce::u16")]
	port: u16,
	uuid: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct VlessOptions {
	name: String,
	server: String,
	#[serde(deserialize_with = "coerce::u16")]
	port: u16,
	uuid: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct TrojanOptions {
	name: String,
	server: String,
	#[serde(deserialize_with = "coerce::u16")]
	port: u16,
	password: String,
	sni: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct SnellOptions {
	name: String,
	server: String,
	#[serde(deserialize_with = "coerce::u16")]
	port: u16,
	psk: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct WireGuardOptions {
	name: String,
	server: String,
	#[serde(deserialize_with = "coerce::u16")]
	port: u16,
	private_key: String,
	public_key: String,
	#[serde(default)]
	persistent_keepalive: Option<u16>,
}

fn decode_wg_key(encoded: &str, field: &str) -> anyhow::Result<[u8; 32]> {
	let bytes = BASE64.decode(encoded.trim()).map_err(|e| anyhow::anyhow!("invalid {field}: {e}"))?;
	bytes.try_into().map_err(|_| anyhow::anyhow!("{field} must decode to exactly 32 bytes"))
}

/// Decodes one `proxies[]` entry (already split out of the document by
/// the caller) into a live adapter. Unknown `type` values are a hard
/// error -- unlike unknown top-level config keys, an unparseable proxy
/// is simply skipped by the provider that requested it (§10.1).
pub fn build_proxy(raw: &serde_yaml::Value) -> anyhow::Result<Arc<dyn ProxyAdapter>> {
	let discriminant: Discriminant = serde_yaml::from_value(raw.clone())?;
	let adapter: Arc<dyn ProxyAdapter> = match discriminant.kind.as_str() {
		"direct" => {
			let opts: DirectOptions = serde_yaml::from_value(raw.clone())?;
			Arc::new(DirectAdapter::new(opts.name, opts.interface_name, opts.routing_mark))
		},
		"reject" => {
			let opts: RejectOptions = serde_yaml::from_value(raw.clone())?;
			Arc::new(RejectAdapter::new(opts.name, Arc::new(RejectCounter::new())))
		},
		"http" => {
			let opts: HttpOptions = serde_yaml::from_value(raw.clone())?;
			let tls_config = opts.tls.then(|| DEFAULT_TLS_CONFIG.clone());
			Arc::new(HttpAdapter::new(opts.name, opts.server, opts.port, opts.username, opts.password, opts.tls, opts.sni, tls_config))
		},
		"socks5" => {
			let opts: Socks5Options = serde_yaml::from_value(raw.clone())?;
			Arc::new(Socks5Adapter::new(opts.name, opts.server, opts.port, opts.username, opts.password))
		},
		"ss" => {
			let opts: ShadowsocksOptions = serde_yaml::from_value(raw.clone())?;
			Arc::new(ShadowsocksAdapter::new(opts.name, opts.server, opts.port, opts.cipher, opts.password))
		},
		"ssr" => {
			let opts: ShadowsocksROptions = serde_yaml::from_value(raw.clone())?;
			let name = opts.name.clone();
			let ssr_options = SsrOptions {
				server: opts.server,
				port: opts.port,
				password: opts.password,
				cipher: opts.cipher,
				obfs: opts.obfs,
				obfs_param: opts.obfs_param,
				protocol: opts.protocol,
				protocol_param: opts.protocol_param,
				random_host: false,
			};
			Arc::new(ShadowsocksRAdapter::new(name, ssr_options))
		},
		"vmess" => {
			let opts: VmessOptions = serde_yaml::from_value(raw.clone())?;
			let uuid = Uuid::parse_str(&opts.uuid)?;
			Arc::new(VmessAdapter::new(opts.name, opts.server, opts.port, uuid))
		},
		"vless" => {
			let opts: VlessOptions = serde_yaml::from_value(raw.clone())?;
			let uuid = Uuid::parse_str(&opts.uuid)?;
			Arc::new(VlessAdapter::new(opts.name, opts.server, opts.port, uuid))
		},
		"trojan" => {
			let opts: TrojanOptions = serde_yaml::from_value(raw.clone())?;
			Arc::new(TrojanAdapter::new(opts.name, opts.server, opts.port, opts.password, opts.sni, DEFAULT_TLS_CONFIG.clone()))
		},
		"snell" => {
			let opts: SnellOptions = serde_yaml::from_value(raw.clone())?;
			Arc::new(SnellAdapter::new(opts.name, opts.server, opts.port, opts.psk))
		},
		"wireguard" => {
			let opts: WireGuardOptions = serde_yaml::from_value(raw.clone())?;
			let config = WireGuardConfig {
				private_key: decode_wg_key(&opts.private_key, "private-key")?,
				peer_public_key: decode_wg_key(&opts.public_key, "public-key")?,
				endpoint: format!("{}:{}", opts.server, opts.port)
					.parse()
					.or_else(|_| format!("{}:{}", opts.server, opts.port).parse())
					.map_err(|e| anyhow::anyhow!("invalid wireguard endpoint: {e}"))?,
				persistent_keepalive: opts.persistent_keepalive,
			};
			Arc::new(WireGuardAdapter::new(opts.name, config))
		},
		other => anyhow::bail!("unknown proxy type {other}"),
	};
	Ok(adapter)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn builds_a_direct_adapter_from_yaml() {
		let raw: serde_yaml::Value = serde_yaml::from_str("type: direct\nname: DIRECT\n").unwrap();
		let adapter = build_proxy(&raw).unwrap();
		assert_eq!(adapter.name(), "DIRECT");
	}

	#[test]
	fn coerces_a_quoted_port_number() {
		let raw: serde_yaml::Value = serde_yaml::from_str("type: socks5\nname: s5\nserver: 1.2.3.4\nport: \"1080\"\n").unwrap();
		let adapter = build_proxy(&raw).unwrap();
		assert_eq!(adapter.name(), "s5");
	}

	#[test]
	fn unknown_type_is_rejected() {
		let raw: serde_yaml::Value = serde_yaml::from_str("type: nope\nname: x\n").unwrap();
		assert!(build_proxy(&raw).is_err());
	}
}
