//! Periodic liveness/latency probing for a provider's proxy pool.
//! *Lazy* mode (the default) skips a tick entirely when no traffic has
//! flowed through the provider since the previous one.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use url::Url;

use super::Proxy;

#[derive(Clone, Debug)]
pub struct HealthCheckConfig {
	pub enable: bool,
	pub interval: Duration,
	pub lazy: bool,
	pub url: String,
	pub timeout: Duration,
}

impl Default for HealthCheckConfig {
	fn default() -> Self {
		HealthCheckConfig {
			enable: false,
			interval: Duration::from_secs(300),
			lazy: true,
			url: "https://www.gstatic.com/generate_204".to_string(),
			timeout: Duration::from_secs(5),
		}
	}
}

pub struct HealthChecker {
	config: HealthCheckConfig,
	proxies: Arc<arc_swap::ArcSwap<Vec<Arc<Proxy>>>>,
	touched: Arc<AtomicBool>,
}

impl HealthChecker {
	pub fn new(config: HealthCheckConfig, proxies: Arc<arc_swap::ArcSwap<Vec<Arc<Proxy>>>>, touched: Arc<AtomicBool>) -> Self {
		HealthChecker { config, proxies, touched }
	}

	/// Never probes when disabled or the interval is zero; otherwise runs
	/// until cancelled, honoring `lazy` before each probe round.
	pub async fn run(self: Arc<Self>) {
		if !self.config.enable || self.config.interval.is_zero() {
			return;
		}
		let mut ticker = tokio::time::interval(self.config.interval);
		loop {
			ticker.tick().await;
			if self.config.lazy && !self.touched.swap(false, Ordering::Relaxed) {
				tracing::debug!(target: "relay::provider::healthcheck", "skipping lazy health check tick, no recent traffic");
				continue;
			}
			self.probe_all().await;
		}
	}

	async fn probe_all(&self) {
		let snapshot = self.proxies.load_full();
		let target = match Url::parse(&self.config.url) {
			Ok(u) => u,
			Err(e) => {
				tracing::warn!(target: "relay::provider::healthcheck", error = %e, "invalid health check url");
				return;
			},
		};
		let mut tasks = Vec::with_capacity(snapshot.len());
		for proxy in snapshot.iter().cloned() {
			let target = target.clone();
			let timeout = self.config.timeout;
			tasks.push(tokio::spawn(async move {
				probe_one(&proxy, &target, timeout).await;
			}));
		}
		for t in tasks {
			let _ = t.await;
		}
	}
}

async fn probe_one(proxy: &Proxy, target: &Url, timeout: Duration) {
	let host = target.host_str().unwrap_or("").to_string();
	let port = target.port_or_known_default().unwrap_or(443);
	let metadata = crate::types::Metadata {
		network: crate::types::Network::Tcp,
		src_addr: "127.0.0.1:0".parse().unwrap(),
		host: Some(host.into()),
		dst_ip: None,
		dst_port: port,
		origin_dst: None,
		inbound_type: "healthcheck".into(),
		process_name: None,
		dns_mode: crate::types::DnsMode::Normal,
	};

	let start = Instant::now();
	let result = tokio::time::timeout(timeout, proxy.adapter().dial_tcp(&metadata)).await;
	match result {
		Ok(Ok(_conn)) => proxy.record_probe(true, start.elapsed()),
		_ => proxy.record_probe(false, timeout),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn disabled_config_has_zero_interval_default_off() {
		let cfg = HealthCheckConfig::default();
		assert!(!cfg.enable);
	}
}
