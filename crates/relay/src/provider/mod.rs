//! Proxy providers: a named, dynamically refreshed pool of outbound
//! adapters fetched from a `Vehicle`, filtered, and health-checked.

pub mod healthcheck;
pub mod vehicle;

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use regex::Regex;

pub use healthcheck::{HealthCheckConfig, HealthChecker};
pub use vehicle::{Vehicle, VehicleError};

use crate::adapter::ProxyAdapter;

const LATENCY_HISTORY_LEN: usize = 5;

/// A single pool member: the adapter plus the rolling liveness/latency
/// state the health checker maintains.
pub struct Proxy {
	adapter: Arc<dyn ProxyAdapter>,
	alive: AtomicBool,
	history: Mutex<VecDeque<Duration>>,
}

impl Proxy {
	pub fn new(adapter: Arc<dyn ProxyAdapter>) -> Self {
		Proxy {
			adapter,
			alive: AtomicBool::new(true),
			history: Mutex::new(VecDeque::with_capacity(LATENCY_HISTORY_LEN)),
		}
	}

	pub fn adapter(&self) -> &Arc<dyn ProxyAdapter> {
		&self.adapter
	}

	pub fn name(&self) -> &str {
		self.adapter.name()
	}

	pub fn alive(&self) -> bool {
		self.alive.load(Ordering::Relaxed)
	}

	pub fn record_probe(&self, alive: bool, latency: Duration) {
		self.alive.store(alive, Ordering::Relaxed);
		let mut history = self.history.lock();
		if history.len() == LATENCY_HISTORY_LEN {
			history.pop_front();
		}
		history.push_back(latency);
	}

	pub fn mean_latency(&self) -> Option<Duration> {
		let history = self.history.lock();
		if history.is_empty() {
			return None;
		}
		let total: Duration = history.iter().sum();
		Some(total / history.len() as u32)
	}
}

#[derive(thiserror::Error, Debug)]
pub enum ProviderError {
	#[error(transparent)]
	Vehicle(#[from] VehicleError),
	#[error("decode provider body: {0}")]
	Decode(#[from] serde_yaml::Error),
	#[error("provider {0} produced no usable proxies")]
	Empty(String),
}

pub struct Provider {
	name: String,
	vehicle: Vehicle,
	filter: Option<Regex>,
	prefix_name: Option<String>,
	client: Arc<reqwest::Client>,
	proxies: Arc<ArcSwap<Vec<Arc<Proxy>>>>,
	touched: Arc<AtomicBool>,
	health: Arc<HealthChecker>,
}

impl Provider {
	pub fn new(name: impl Into<String>, vehicle: Vehicle, filter: Option<Regex>, prefix_name: Option<String>, health_config: HealthCheckConfig) -> Self {
		let proxies = Arc::new(ArcSwap::from_pointee(Vec::new()));
		let touched = Arc::new(AtomicBool::new(false));
		let health = Arc::new(HealthChecker::new(health_config, proxies.clone(), touched.clone()));
		Provider {
			name: name.into(),
			vehicle,
			filter,
			prefix_name,
			client: vehicle::shared_client(),
			proxies,
			touched,
			health,
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn proxies(&self) -> Vec<Arc<Proxy>> {
		self.touched.store(true, Ordering::Relaxed);
		(**self.proxies.load()).clone()
	}

	/// Fetches, decodes, filters, and parses the provider's current proxy
	/// list, then atomically swaps it in. Individual proxy parse failures
	/// are skipped; a wholly empty result is an error.
	pub async fn update(&self) -> Result<(), ProviderError> {
		let bytes = self.vehicle.fetch(&self.client).await?;
		let doc: serde_yaml::Value = serde_yaml::from_slice(&bytes)?;

		let raw_list = doc
			.get("proxies")
			.and_then(|v| v.as_sequence())
			.cloned()
			.unwrap_or_default();

		let mut built = Vec::with_capacity(raw_list.len());
		for mut raw in raw_list {
			if let (Some(prefix), Some(mapping)) = (&self.prefix_name, raw.as_mapping_mut()) {
				if let Some(name) = mapping.get("name").and_then(|v| v.as_str()).map(str::to_string) {
					mapping.insert(serde_yaml::Value::from("name"), serde_yaml::Value::from(format!("{prefix}{name}")));
				}
			}

			let name = raw.get("name").and_then(|v| v.as_str()).unwrap_or_default().to_string();
			if let Some(filter) = &self.filter {
				if !filter.is_match(&name) {
					continue;
				}
			}

			match crate::parser::build_proxy(&raw) {
				Ok(adapter) => built.push(Arc::new(Proxy::new(adapter))),
				Err(e) => tracing::warn!(target: "relay::provider", provider = %self.name, proxy = %name, error = %e, "skipping unparseable proxy"),
			}
		}

		if built.is_empty() {
			return Err(ProviderError::Empty(self.name.clone()));
		}

		self.proxies.store(Arc::new(built));
		Ok(())
	}

	pub fn health_checker(&self) -> Arc<HealthChecker> {
		self.health.clone()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn empty_provider_body_is_rejected() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("empty.yaml");
		tokio::fs::write(&path, b"proxies: []").await.unwrap();
		let provider = Provider::new("test", Vehicle::File { path }, None, None, HealthCheckConfig::default());
		let err = provider.update().await.unwrap_err();
		assert!(matches!(err, ProviderError::Empty(_)));
	}
}
