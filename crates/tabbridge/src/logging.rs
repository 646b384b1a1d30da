//! Tracing setup shared by the host and the CLI.
//!
//! Logs always go to stderr: the host's stdout carries native-messaging
//! frames and the CLI's stdout carries command output.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const ENV_LOG: &str = "TABBRIDGE_LOG";

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set. Otherwise `TABBRIDGE_LOG` picks the level for the
/// tabbridge crates (falling back to `default_level`). `LOG_FORMAT=json`
/// switches to JSON lines. Calling this twice is harmless.
pub fn init_tracing(default_level: &str) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = level_from(std::env::var(ENV_LOG).ok().as_deref(), default_level);
        EnvFilter::new(filter_directives(level))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}

fn level_from<'a>(raw: Option<&str>, default_level: &'a str) -> &'a str {
    match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        Some("trace") => "trace",
        Some("debug") => "debug",
        Some("info") => "info",
        Some("warn") | Some("warning") => "warn",
        Some("error") => "error",
        Some("off") => "off",
        _ => default_level,
    }
}

fn filter_directives(level: &str) -> String {
    format!("tabbridge={level},tabbridge_host={level},tabbridge_cli={level}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_parsing() {
        assert_eq!(level_from(Some("DEBUG"), "info"), "debug");
        assert_eq!(level_from(Some("warning"), "info"), "warn");
        assert_eq!(level_from(Some(" off "), "info"), "off");
        assert_eq!(level_from(Some("loud"), "warn"), "warn");
        assert_eq!(level_from(None, "info"), "info");
    }

    #[test]
    fn directives_cover_all_crates() {
        assert_eq!(
            filter_directives("debug"),
            "tabbridge=debug,tabbridge_host=debug,tabbridge_cli=debug"
        );
    }
}
