//! Fetches a provider's raw proxy-list bytes, either from a local file or
//! over HTTP (optionally tunneled through another named proxy).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};

const DEFAULT_USER_AGENT: &str = "ClashPlusPro/0.1";

#[derive(thiserror::Error, Debug)]
pub enum VehicleError {
	#[error("read {0}: {1}")]
	Read(PathBuf, #[source] std::io::Error),
	#[error("http vehicle cache path must be under $HOME: {0}")]
	CachePathOutsideHome(#[source] anyhow::Error),
	#[error("fetch {0}: {1}")]
	Fetch(String, #[source] reqwest::Error),
}

#[derive(Clone, Debug)]
pub enum Vehicle {
	File {
		path: PathBuf,
	},
	Http {
		url: String,
		headers: Vec<(String, String)>,
		cache_path: PathBuf,
		/// Name of another provider/proxy to route this fetch through.
		url_proxy: Option<String>,
	},
}

impl Vehicle {
	pub async fn fetch(&self, client: &reqwest::Client) -> Result<Vec<u8>, VehicleError> {
		match self {
			Vehicle::File { path } => tokio::fs::read(path).await.map_err(|e| VehicleError::Read(path.clone(), e)),
			Vehicle::Http { url, headers, cache_path, .. } => {
				crate::home_subpath(cache_path).map_err(VehicleError::CachePathOutsideHome)?;

				let mut header_map = HeaderMap::new();
				let mut has_ua = false;
				for (k, v) in headers {
					if let (Ok(name), Ok(value)) = (HeaderName::try_from(k.as_str()), HeaderValue::from_str(v)) {
						if name == USER_AGENT {
							has_ua = true;
						}
						header_map.insert(name, value);
					}
				}
				if !has_ua {
					header_map.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
				}

				let resp = client
					.get(url)
					.headers(header_map)
					.timeout(Duration::from_secs(20))
					.send()
					.await
					.map_err(|e| VehicleError::Fetch(url.clone(), e))?;
				let bytes = resp.bytes().await.map_err(|e| VehicleError::Fetch(url.clone(), e))?;
				Ok(bytes.to_vec())
			},
		}
	}
}

pub fn shared_client() -> Arc<reqwest::Client> {
	Arc::new(reqwest::Client::new())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn file_vehicle_reads_local_bytes() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("providers.yaml");
		tokio::fs::write(&path, b"proxies: []").await.unwrap();
		let vehicle = Vehicle::File { path: path.clone() };
		let bytes = vehicle.fetch(&reqwest::Client::new()).await.unwrap();
		assert_eq!(bytes, b"proxies: []");
	}
}
