//! Tracing setup for the `cinder` binary.
//!
//! The filter comes from `CINDER_LOG` (for example `debug` or
//! `cinder_search_core=debug,sqlx=warn`) and defaults to `warn`. Output goes
//! to stderr so command output on stdout stays parseable.

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "CINDER_LOG";

fn filter_directives(value: Option<&str>) -> &str {
    match value.map(str::trim) {
        None | Some("") => "warn",
        Some("0") | Some("off") | Some("none") => "error",
        Some("1") => "info",
        Some("2") => "debug",
        Some(custom) => custom,
    }
}

pub fn init_tracing() {
    let value = std::env::var(LOG_ENV).ok();
    let filter = EnvFilter::try_new(filter_directives(value.as_deref()))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_from_env_value() {
        assert_eq!(filter_directives(None), "warn");
        assert_eq!(filter_directives(Some(" ")), "warn");
        assert_eq!(filter_directives(Some("off")), "error");
        assert_eq!(filter_directives(Some("2")), "debug");
        assert_eq!(filter_directives(Some("sqlx=info")), "sqlx=info");
    }
}
