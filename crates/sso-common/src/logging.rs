//! ---
//! sso_section: "01-core-functionality"
//! sso_subsection: "module"
//! sso_type: "source"
//! sso_scope: "code"
//! sso_description: "Shared primitives and utilities for the SSO gate runtime."
//! sso_version: "v0.1.0"
//! sso_owner: "tbd"
//! ---
use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "SSO_GATE_LOG";
const DEFAULT_DIRECTIVE: &str = "info";

static FILE_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();
static CONSOLE_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

/// Available log formats.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    StructuredJson,
    Pretty,
}

/// Install the global tracing subscriber described by `config`.
///
/// * `SSO_GATE_LOG` overrides the filter (e.g. `info`, `sso_auth=debug`). When unset the
///   standard `RUST_LOG` variable is honoured, finally defaulting to `info`.
/// * Console events go to stderr so command output on stdout stays machine readable.
/// * With `file_enabled`, events are also appended as JSON to `{prefix}.log`, rotated daily.
///
/// Fails only when the log directory cannot be created. A second call in the same process
/// keeps the subscriber that is already installed.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    let filter = match std::env::var(LOG_ENV) {
        Ok(directive) => EnvFilter::try_new(directive).unwrap_or_else(|err| {
            eprintln!("invalid {LOG_ENV} directive ({err}); defaulting to {DEFAULT_DIRECTIVE}");
            EnvFilter::new(DEFAULT_DIRECTIVE)
        }),
        Err(_) => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE)),
    };

    let file_layer = if config.file_enabled {
        std::fs::create_dir_all(&config.directory).with_context(|| {
            format!(
                "unable to create log directory {}",
                config.directory.display()
            )
        })?;
        let prefix = config
            .file_prefix
            .clone()
            .unwrap_or_else(|| service_name.to_owned());
        let (file_writer, file_guard) =
            tracing_appender::non_blocking(daily(&config.directory, format!("{prefix}.log")));
        let _ = FILE_GUARD.set(file_guard);
        Some(
            fmt::layer()
                .with_target(true)
                .with_timer(fmt::time::UtcTime::rfc_3339())
                .json()
                .with_writer(file_writer)
                .boxed(),
        )
    } else {
        None
    };

    let (console_writer, console_guard) = tracing_appender::non_blocking(std::io::stderr());
    let _ = CONSOLE_GUARD.set(console_guard);
    let console_layer = match config.format {
        LogFormat::StructuredJson => fmt::layer()
            .with_target(false)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .json()
            .with_writer(console_writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(console_writer)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .ok();

    info!(
        service = %service_name,
        log_dir = %config.directory.display(),
        file = config.file_enabled,
        format = ?config.format,
        "tracing initialised"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn log_format_uses_kebab_case() {
        let config: LoggingConfig = toml::from_str(r#"format = "pretty""#).unwrap();
        assert_eq!(config.format, LogFormat::Pretty);
        let config: LoggingConfig = toml::from_str(r#"format = "structured-json""#).unwrap();
        assert_eq!(config.format, LogFormat::StructuredJson);
    }

    #[test]
    fn init_creates_log_directory() {
        let dir = tempdir().unwrap();
        let config = LoggingConfig {
            directory: dir.path().join("logs"),
            format: LogFormat::Pretty,
            file_prefix: Some("sso-test".into()),
            file_enabled: true,
        };
        init_tracing("sso-test", &config).unwrap();
        assert!(config.directory.is_dir());
    }

    #[test]
    fn disabled_file_output_leaves_directory_alone() {
        let dir = tempdir().unwrap();
        let config = LoggingConfig {
            directory: dir.path().join("unused"),
            format: LogFormat::StructuredJson,
            file_prefix: None,
            file_enabled: false,
        };
        init_tracing("sso-test", &config).unwrap();
        assert!(!config.directory.exists());
    }

    #[test]
    fn unwritable_log_directory_is_reported() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let config = LoggingConfig {
            directory: blocker.join("logs"),
            format: LogFormat::Pretty,
            file_prefix: None,
            file_enabled: true,
        };
        let err = init_tracing("sso-test", &config).unwrap_err();
        assert!(err.to_string().contains("unable to create log directory"));
    }
}
