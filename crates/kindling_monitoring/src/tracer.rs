//! This module configures `tracing_subscriber` to write to a log file and optionally standard
//! output.
use std::path::PathBuf;

use anyhow::anyhow;
use serde::Deserialize;
use serde::Serialize;
use tracing_appender::non_blocking::NonBlocking;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::Layer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Registry;

use crate::from_env::optional_var;
use crate::from_env::FromEnvError;

const TRACING_MODE_VAR: &str = "KINDLING_TRACING_MODE";

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "mode")]
pub enum TracerMode {
  /// Output the Tracer logs to Stdout
  Stdout,
}

impl TracerMode {
  pub fn from_env() -> Result<Vec<Self>, FromEnvError> {
    let Some(mode) = optional_var(TRACING_MODE_VAR) else {
      return Ok(vec![]);
    };

    let mut tracer_modes = vec![];

    for mode in mode.split(',').map(|s| s.trim()) {
      match mode {
        "stdout" => {
          if !tracer_modes.contains(&Self::Stdout) {
            tracer_modes.push(Self::stdout());
          }
        }
        // The log file is always written
        "file" => {}
        value => {
          return Err(FromEnvError::InvalidKey(
            String::from(TRACING_MODE_VAR),
            anyhow!("Invalid value: {}", value),
          ))
        }
      }
    }

    Ok(tracer_modes)
  }

  /// Default STDOUT configuration
  pub fn stdout() -> Self {
    Self::Stdout
  }
}

/// Keeps the background writers alive; dropping it flushes them
pub struct Tracer {
  #[allow(unused)]
  worker_guards: Vec<WorkerGuard>,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn env_filter(default_filter: Option<&str>) -> EnvFilter {
  match default_filter {
    Some(directives) if std::env::var(EnvFilter::DEFAULT_ENV).is_err() => {
      EnvFilter::new(directives)
    }
    _ => EnvFilter::from_default_env(),
  }
}

fn log_directory() -> PathBuf {
  std::env::temp_dir().join("kindling_trace")
}

impl Tracer {
  pub fn new(options: &[TracerMode], default_filter: Option<&str>) -> anyhow::Result<Self> {
    let file_appender = tracing_appender::rolling::Builder::new()
      .rotation(Rotation::HOURLY)
      .max_log_files(4)
      .filename_prefix("kindling-tracing")
      .build(log_directory())
      .map_err(|err| anyhow!(err))?;

    let mut worker_guards = Vec::new();
    let mut layers = Vec::<BoxedLayer>::new();

    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    worker_guards.push(guard);
    layers.push(fmt_layer(file_writer, default_filter));

    if options.contains(&TracerMode::Stdout) {
      let (stdout_writer, guard) = tracing_appender::non_blocking(std::io::stdout());
      worker_guards.push(guard);
      layers.push(fmt_layer(stdout_writer, default_filter));
    }

    tracing::subscriber::set_global_default(Registry::default().with(layers))?;

    Ok(Self { worker_guards })
  }
}

fn fmt_layer(writer: NonBlocking, default_filter: Option<&str>) -> BoxedLayer {
  tracing_subscriber::fmt::layer()
    .with_writer(writer)
    .with_span_events(FmtSpan::CLOSE)
    .with_filter(env_filter(default_filter))
    .boxed()
}
