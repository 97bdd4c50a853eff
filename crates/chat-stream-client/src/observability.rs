use once_cell::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_LOG_FILE: &str = "chat-stream.logs.jsonl";

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

fn logging_enabled(lookup: &impl Fn(&str) -> Option<String>) -> bool {
    lookup("CHAT_STREAM_OBSERVABILITY_ENABLED")
        .map(|value| parse_flag(&value).unwrap_or(true))
        .unwrap_or(true)
}

fn resolve_env_filter(lookup: &impl Fn(&str) -> Option<String>) -> tracing_subscriber::EnvFilter {
    if let Some(level) = lookup("CHAT_STREAM_LOG_LEVEL")
        && let Ok(filter) = tracing_subscriber::EnvFilter::try_new(level)
    {
        return filter;
    }
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
}

/// Splits a JSON log path into its directory and file name.
fn log_file_target(raw: &str) -> (std::path::PathBuf, String) {
    let path = std::path::PathBuf::from(raw);
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(std::path::Path::to_path_buf)
        .unwrap_or_else(|| std::path::PathBuf::from("."));
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_LOG_FILE)
        .to_string();
    (dir, file_name)
}

/// Initialize logging once per process.
///
/// Environment variables:
/// - `CHAT_STREAM_OBSERVABILITY_ENABLED`: optional enable/disable flag (default enabled).
/// - `CHAT_STREAM_LOG_LEVEL`: optional level/filter override (`info`, `chat_stream_client=debug`, ...).
/// - `CHAT_STREAM_JSON_LOG_PATH`: optional log file path. If set, logs are JSONL in that file.
///   If unset, logs go to stderr in a compact console format so they never mix with
///   streamed assistant text on stdout.
/// - `RUST_LOG`: fallback filter when `CHAT_STREAM_LOG_LEVEL` is unset. Default `warn`.
pub fn init_observability() {
    let lookup = |key: &str| std::env::var(key).ok();
    INIT.get_or_init(|| {
        if !logging_enabled(&lookup) {
            return;
        }

        let env_filter = resolve_env_filter(&lookup);
        if let Some(raw) = lookup("CHAT_STREAM_JSON_LOG_PATH").filter(|p| !p.trim().is_empty()) {
            let (dir, file_name) = log_file_target(raw.trim());
            let _ = std::fs::create_dir_all(&dir);
            let writer = tracing_appender::rolling::never(dir, file_name);
            let json_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_target(false)
                .with_writer(writer);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(json_layer)
                .try_init();
        } else {
            let console_layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .try_init();
        }
    });
}
