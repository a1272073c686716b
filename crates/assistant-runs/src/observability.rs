use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_LOG_FILE: &str = "assistant-runs.logs.jsonl";

#[derive(Debug, Default, PartialEq, Eq)]
struct Settings {
    enabled: bool,
    level: Option<String>,
    json_log_path: Option<PathBuf>,
}

impl Settings {
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = lookup("ASSISTANT_RUNS_OBSERVABILITY")
            .map(|value| parse_bool_env(&value).unwrap_or(true))
            .unwrap_or(true);
        Self {
            enabled,
            level: lookup("ASSISTANT_RUNS_LOG_LEVEL").filter(|v| !v.trim().is_empty()),
            json_log_path: lookup("ASSISTANT_RUNS_JSON_LOG_PATH")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
        }
    }

    fn env_filter(&self) -> tracing_subscriber::EnvFilter {
        if let Some(level) = &self.level
            && let Ok(filter) = tracing_subscriber::EnvFilter::try_new(level)
        {
            return filter;
        }
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    }
}

fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

/// Installs a global tracing subscriber once per process.
///
/// Environment variables:
/// - `ASSISTANT_RUNS_OBSERVABILITY`: enable/disable flag (default enabled).
/// - `ASSISTANT_RUNS_LOG_LEVEL`: level or filter override (`info`, `assistant_runs=debug`, ...).
/// - `ASSISTANT_RUNS_JSON_LOG_PATH`: when set, logs are written as JSONL to that file.
///   Otherwise logs go to stderr in a compact console format.
/// - `RUST_LOG`: fallback filter.
///
/// Does nothing if another global subscriber is already installed.
pub fn init_observability() {
    INIT.get_or_init(|| {
        let settings = Settings::from_lookup(|key| std::env::var(key).ok());
        if !settings.enabled {
            return;
        }

        let env_filter = settings.env_filter();
        match &settings.json_log_path {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    let _ = std::fs::create_dir_all(parent);
                }
                let dir = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .unwrap_or_else(|| Path::new("."));
                let file_name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or(DEFAULT_LOG_FILE);
                let writer = tracing_appender::rolling::never(dir, file_name);
                let json_layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(true)
                    .with_writer(writer);
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(json_layer)
                    .try_init();
            }
            None => {
                let console_layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr);
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(console_layer)
                    .try_init();
            }
        }
    });
}
