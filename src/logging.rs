//! Diagnostic logging setup
//!
//! The filter comes from `CVAULT_LOG`, falling back to `RUST_LOG`, then to
//! `info`. `--verbose` raises this crate to `debug` whatever the filter says.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

/// Build the filter from the environment lookup and verbosity
fn build_filter<F>(lookup: F, verbose: bool) -> EnvFilter
where
    F: Fn(&str) -> Option<String>,
{
    let directives = lookup("CVAULT_LOG")
        .or_else(|| lookup("RUST_LOG"))
        .unwrap_or_else(|| DEFAULT_FILTER.to_string());

    let filter = EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    if verbose {
        match "contract_vault=debug".parse() {
            Ok(directive) => filter.add_directive(directive),
            Err(_) => filter,
        }
    } else {
        filter
    }
}

/// Install the global subscriber, writing to stderr
///
/// Calling this twice is harmless; the second call leaves the first
/// subscriber in place.
pub fn init(verbose: bool) {
    let filter = build_filter(|k| std::env::var(k).ok(), verbose);
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
    fn test_prefers_cvault_log() {
        let filter = build_filter(
            |k| match k {
                "CVAULT_LOG" => Some("warn".into()),
                "RUST_LOG" => Some("trace".into()),
                _ => None,
            },
            false,
        );
        assert_eq!(filter.to_string(), "warn");
    }

    #[test]
    fn test_falls_back_to_default() {
        let filter = build_filter(|_| None, false);
        assert_eq!(filter.to_string(), "info");
    }

    #[test]
    fn test_invalid_directive_uses_default() {
        let filter = build_filter(|k| (k == "RUST_LOG").then(|| "vault=loud".to_string()), false);
        assert_eq!(filter.to_string(), "info");
    }

    #[test]
    fn test_verbose_adds_debug() {
        let filter = build_filter(|_| None, true);
        assert!(filter.to_string().contains("contract_vault=debug"));
    }
}
