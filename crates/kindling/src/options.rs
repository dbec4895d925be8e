use std::path::PathBuf;
use std::time::Duration;

use kindling_core::hmr_payload::ClientOptions;
use kindling_monitoring::FromEnvError;
use kindling_monitoring::MonitoringOptions;
use serde::Deserialize;
use serde::Serialize;

/// The options Kindling is started with, built programmatically or deserialized from JSON
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KindlingOptions {
  /// Root that `/`-prefixed urls are served from
  pub project_root: PathBuf,

  /// Extensions tried in order when a specifier does not name a file exactly
  pub resolve_extensions: Vec<String>,

  /// Number of transform worker threads, defaults to one less than the number of cores
  pub threads: Option<usize>,

  pub hmr: HmrOptions,

  pub log_level: LogLevel,
}

impl Default for KindlingOptions {
  fn default() -> Self {
    Self {
      project_root: PathBuf::from("/"),
      resolve_extensions: [".mjs", ".js", ".mts", ".ts", ".jsx", ".tsx", ".json"]
        .into_iter()
        .map(String::from)
        .collect(),
      threads: None,
      hmr: HmrOptions::default(),
      log_level: LogLevel::default(),
    }
  }
}

impl KindlingOptions {
  /// Tracing setup for this session.
  ///
  /// Outputs come from the environment and `RUST_LOG` or `KINDLING_LOG_LEVEL` take precedence
  /// over `log_level`.
  pub fn monitoring_options(&self) -> Result<MonitoringOptions, FromEnvError> {
    let mut monitoring = MonitoringOptions::from_env()?;

    monitoring
      .default_filter
      .get_or_insert_with(|| self.log_level.as_filter().to_string());

    Ok(monitoring)
  }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HmrOptions {
  /// How long to wait for more file events after the first one of a batch
  pub debounce_ms: u64,

  /// Send `prune` for deleted files instead of reloading the page
  pub prune_on_delete: bool,

  /// Files with these extensions reload the page when they change, even if no module uses them
  pub full_reload_extensions: Vec<String>,

  /// Whether clients should show transform errors in an overlay
  pub overlay: bool,
}

impl Default for HmrOptions {
  fn default() -> Self {
    Self {
      debounce_ms: 10,
      prune_on_delete: false,
      full_reload_extensions: vec![String::from("html")],
      overlay: true,
    }
  }
}

impl HmrOptions {
  pub fn debounce(&self) -> Duration {
    Duration::from_millis(self.debounce_ms)
  }

  /// What the served client runtime is configured with
  pub fn client_options(&self) -> ClientOptions {
    ClientOptions {
      overlay: self.overlay,
    }
  }
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
  #[default]
  Error,
  Info,
  None,
  Verbose,
  Warn,
}

impl LogLevel {
  /// The `tracing` filter directive matching this level
  pub fn as_filter(&self) -> &'static str {
    match self {
      LogLevel::Error => "error",
      LogLevel::Info => "info",
      LogLevel::None => "off",
      LogLevel::Verbose => "trace",
      LogLevel::Warn => "warn",
    }
  }
}
