//! Name -> adapter lookup: the static adapters built straight from config
//! (`DIRECT`, `REJECT`, individually declared proxies) plus whatever a
//! provider's current pool contributes, searched in that order.

use std::collections::HashMap;
use std::sync::Arc;

use crate::adapter::ProxyAdapter;
use crate::dns::transport::AdapterLookup;
use crate::provider::Provider;

pub struct AdapterRegistry {
	adapters: HashMap<String, Arc<dyn ProxyAdapter>>,
	providers: Vec<Arc<Provider>>,
}

impl AdapterRegistry {
	pub fn new(static_adapters: Vec<Arc<dyn ProxyAdapter>>, providers: Vec<Arc<Provider>>) -> Self {
		let adapters = static_adapters.into_iter().map(|a| (a.name().to_string(), a)).collect();
		AdapterRegistry { adapters, providers }
	}

	pub fn find(&self, name: &str) -> Option<Arc<dyn ProxyAdapter>> {
		if let Some(adapter) = self.adapters.get(name) {
			return Some(adapter.clone());
		}
		self
			.providers
			.iter()
			.flat_map(|p| p.proxies())
			.find(|proxy| proxy.name() == name)
			.map(|proxy| proxy.adapter().clone())
	}
}

impl AdapterLookup for AdapterRegistry {
	fn find(&self, name: &str) -> Option<Arc<dyn ProxyAdapter>> {
		AdapterRegistry::find(self, name)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::adapter::direct::DirectAdapter;

	#[test]
	fn finds_a_static_adapter_by_name() {
		let registry = AdapterRegistry::new(vec![Arc::new(DirectAdapter::new("DIRECT", None, None))], Vec::new());
		assert!(registry.find("DIRECT").is_some());
		assert!(registry.find("missing").is_none());
	}
}
