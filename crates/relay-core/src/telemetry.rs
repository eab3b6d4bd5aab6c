//! Logging bootstrap. A single entry point configures a `tracing`
//! subscriber from a small serde-friendly config struct; callers emit
//! `tracing::event!`/`debug!`/`warn!` as usual afterward.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(serde::Deserialize, serde::Serialize, Clone, Debug)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct LoggingConfig {
	/// `tracing_subscriber::EnvFilter` directive string, e.g. "relay=debug,warn".
	#[serde(default = "default_filter")]
	pub filter: String,
	#[serde(default)]
	pub json: bool,
}

fn default_filter() -> String {
	"info".to_string()
}

impl Default for LoggingConfig {
	fn default() -> Self {
		LoggingConfig {
			filter: default_filter(),
			json: false,
		}
	}
}

/// Initializes the global `tracing` subscriber. Safe to call once; a
/// second call returns an error rather than panicking, so embedding
/// applications (and tests) can call it defensively.
pub fn init(cfg: &LoggingConfig) -> anyhow::Result<()> {
	let filter = EnvFilter::try_new(&cfg.filter).unwrap_or_else(|_| EnvFilter::new("info"));
	let registry = tracing_subscriber::registry().with(filter);
	if cfg.json {
		registry.with(tracing_subscriber::fmt::layer().json()).try_init()
	} else {
		registry.with(tracing_subscriber::fmt::layer()).try_init()
	}
	.map_err(|e| anyhow::anyhow!("telemetry already initialized: {e}"))
}
