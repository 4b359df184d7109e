use once_cell::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn observability_enabled(lookup: impl Fn(&str) -> Option<String>) -> bool {
    lookup("RESEARCH_OBSERVABILITY_ENABLED")
        .and_then(|value| parse_bool_env(&value))
        .unwrap_or(true)
}

/// Picks the filter directive: `RESEARCH_LOG_LEVEL`, then `RUST_LOG`, then
/// `default_level`. Blank or unparsable values are skipped.
fn filter_directive(default_level: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    for key in ["RESEARCH_LOG_LEVEL", "RUST_LOG"] {
        if let Some(value) = lookup(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            && tracing_subscriber::EnvFilter::try_new(&value).is_ok()
        {
            return value;
        }
    }
    default_level.to_string()
}

fn resolve_env_filter(default_level: &str) -> tracing_subscriber::EnvFilter {
    let directive = filter_directive(default_level, env_lookup);
    tracing_subscriber::EnvFilter::try_new(&directive)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
}

/// Initialize logging once per process.
///
/// Environment variables:
/// - `RESEARCH_OBSERVABILITY_ENABLED`: optional enable/disable flag (default enabled).
/// - `RESEARCH_LOG_LEVEL`: optional level/filter override; `RUST_LOG` is the fallback,
///   then `default_level`.
/// - `RESEARCH_JSON_LOG_PATH`: optional log file path. If set, logs are JSONL in that file.
///   If unset, logs go to stderr in a compact console format so stdout stays free for
///   session output.
pub fn init_observability(default_level: &str) {
    INIT.get_or_init(|| {
        if !observability_enabled(env_lookup) {
            return;
        }

        let env_filter = resolve_env_filter(default_level);
        if let Some(path_raw) = env_lookup("RESEARCH_JSON_LOG_PATH") {
            let path = std::path::PathBuf::from(path_raw);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                let _ = std::fs::create_dir_all(parent);
            }
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("research.logs.jsonl");
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_env_accepts_common_spellings() {
        for on in ["1", "true", " YES ", "on", "Enabled"] {
            assert_eq!(parse_bool_env(on), Some(true), "{on}");
        }
        for off in ["0", "false", "no", "OFF", "disabled"] {
            assert_eq!(parse_bool_env(off), Some(false), "{off}");
        }
        assert_eq!(parse_bool_env("maybe"), None);
    }

    fn vars(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn research_log_level_wins_over_rust_log() {
        let lookup = vars(&[("RESEARCH_LOG_LEVEL", "debug"), ("RUST_LOG", "trace")]);
        assert_eq!(filter_directive("info", lookup), "debug");
    }

    #[test]
    fn rust_log_is_the_fallback() {
        let lookup = vars(&[("RESEARCH_LOG_LEVEL", "   "), ("RUST_LOG", "research_session=trace")]);
        assert_eq!(filter_directive("info", lookup), "research_session=trace");
    }

    #[test]
    fn default_level_when_nothing_is_set() {
        assert_eq!(filter_directive("warn", vars(&[])), "warn");
    }

    #[test]
    fn enable_flag_defaults_on_and_can_be_disabled() {
        assert!(observability_enabled(vars(&[])));
        assert!(observability_enabled(vars(&[("RESEARCH_OBSERVABILITY_ENABLED", "maybe")])));
        assert!(!observability_enabled(vars(&[("RESEARCH_OBSERVABILITY_ENABLED", "off")])));
    }

    #[test]
    fn init_is_idempotent() {
        init_observability("warn");
        init_observability("debug");
        assert!(INIT.get().is_some());
    }
}
