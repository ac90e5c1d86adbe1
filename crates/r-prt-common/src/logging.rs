//! ---
//! prt_section: "01-core-functionality"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Tracing subscriber setup: env filter, stdout layer and rolling JSON file."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

/// Filter override checked before `RUST_LOG`.
pub const LOG_ENV: &str = "R_PRT_LOG";

// Writer guards must outlive the subscriber; dropping one flushes and stops its worker.
static GUARDS: OnceCell<Vec<WorkerGuard>> = OnceCell::new();

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    StructuredJson,
    Pretty,
}

/// Resolve the filter directive: `R_PRT_LOG`, then `RUST_LOG`, then `config.level`.
///
/// An unparsable directive falls through to the next source instead of failing.
pub fn resolve_filter(config: &LoggingConfig) -> EnvFilter {
    for var in [LOG_ENV, "RUST_LOG"] {
        let Ok(directive) = std::env::var(var) else {
            continue;
        };
        match EnvFilter::try_new(&directive) {
            Ok(filter) => return filter,
            Err(err) => eprintln!("ignoring invalid {var} directive {directive:?}: {err}"),
        }
    }
    EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber for `service_name`.
///
/// Tick drivers log per frame at `trace`, so `debug` stays usable on a running
/// bench. A second call leaves the first subscriber in place and returns `Ok`.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    let filter = resolve_filter(config);
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let mut guards = vec![stdout_guard];

    let stdout_layer = match config.format {
        LogFormat::StructuredJson => fmt::layer()
            .with_target(false)
            .with_thread_names(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .json()
            .with_writer(stdout_writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_thread_names(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(stdout_writer)
            .boxed(),
    };

    let file_layer = if config.to_file {
        std::fs::create_dir_all(&config.directory).with_context(|| {
            format!("cannot create log directory {}", config.directory.display())
        })?;
        let prefix = config.file_prefix.as_deref().unwrap_or(service_name);
        let appender = daily(&config.directory, format!("{prefix}-{service_name}.log"));
        let (file_writer, file_guard) = tracing_appender::non_blocking(appender);
        guards.push(file_guard);
        Some(
            fmt::layer()
                .with_thread_names(true)
                .with_timer(fmt::time::UtcTime::rfc_3339())
                .json()
                .with_writer(file_writer)
                .boxed(),
        )
    } else {
        None
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .is_ok();
    if !installed {
        warn!(service = %service_name, "tracing already initialised, keeping existing subscriber");
        return Ok(());
    }
    let _ = GUARDS.set(guards);
    info!(
        service = %service_name,
        format = ?config.format,
        log_dir = %config.directory.display(),
        to_file = config.to_file,
        "tracing initialised"
    );
    Ok(())
}
