//! Log output for np_config consumers.
//!
//! Events this crate emits under the `np_config` target:
//!
//! - `warn`: probe or connect failure, session switched to the local backup
//! - `info`: backup completed (startup or periodic), local rig identity
//! - `debug`: session open/close, backup skipped or fresh, local file writes
//!   and write failures, nodes vanishing during a backup walk
//!
//! `NP_CONFIG_LOG` sets the level for these events (default `info`, so
//! fallback warnings are always shown). `NP_CONFIG_LOG_DEPS` sets the level
//! for everything else, such as the ZooKeeper and HTTP clients (default
//! `warn`). Both accept `off`, `error`, `warn`, `info`, `debug`, `trace`.

use std::sync::OnceLock;
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::prelude::*;

static INIT: OnceLock<()> = OnceLock::new();

const CRATE_TARGET: &str = "np_config";

fn parse_level(var: &str, default: LevelFilter) -> LevelFilter {
    match std::env::var(var)
        .map(|v| v.trim().to_ascii_lowercase())
        .as_deref()
    {
        Ok("off") => LevelFilter::OFF,
        Ok("error") => LevelFilter::ERROR,
        Ok("warn") => LevelFilter::WARN,
        Ok("info") => LevelFilter::INFO,
        Ok("debug") => LevelFilter::DEBUG,
        Ok("trace") => LevelFilter::TRACE,
        _ => default,
    }
}

fn targets() -> Targets {
    Targets::new()
        .with_target(CRATE_TARGET, parse_level("NP_CONFIG_LOG", LevelFilter::INFO))
        .with_default(parse_level("NP_CONFIG_LOG_DEPS", LevelFilter::WARN))
}

/// Install a stderr subscriber filtered by `NP_CONFIG_LOG` and
/// `NP_CONFIG_LOG_DEPS`.
///
/// Only the first call installs anything. Never fails: if the process
/// already has a subscriber, that one is kept.
pub fn init() {
    if INIT.get().is_some() {
        return;
    }
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(targets())
        .try_init();
    let _ = INIT.set(());
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tracing::Level;

    fn with_vars<F: FnOnce()>(vars: &[(&str, Option<&str>)], f: F) {
        let originals: Vec<_> = vars
            .iter()
            .map(|(name, _)| (name.to_string(), std::env::var(name).ok()))
            .collect();
        for (name, value) in vars {
            unsafe {
                match value {
                    Some(v) => std::env::set_var(name, v),
                    None => std::env::remove_var(name),
                }
            }
        }
        f();
        for (name, value) in originals {
            unsafe {
                match value {
                    Some(v) => std::env::set_var(&name, v),
                    None => std::env::remove_var(&name),
                }
            }
        }
    }

    #[test]
    #[serial]
    fn test_parse_level() {
        with_vars(&[("NP_CONFIG_LOG", Some("DEBUG"))], || {
            assert_eq!(parse_level("NP_CONFIG_LOG", LevelFilter::INFO), LevelFilter::DEBUG);
        });
        with_vars(&[("NP_CONFIG_LOG", Some("nonsense"))], || {
            assert_eq!(parse_level("NP_CONFIG_LOG", LevelFilter::INFO), LevelFilter::INFO);
        });
        with_vars(&[("NP_CONFIG_LOG", Some(" off "))], || {
            assert_eq!(parse_level("NP_CONFIG_LOG", LevelFilter::INFO), LevelFilter::OFF);
        });
    }

    #[test]
    #[serial]
    fn test_default_targets_show_fallback_warnings_only_for_crate() {
        with_vars(
            &[("NP_CONFIG_LOG", None), ("NP_CONFIG_LOG_DEPS", None)],
            || {
                let targets = targets();
                assert!(targets.would_enable("np_config::remote::session", &Level::WARN));
                assert!(targets.would_enable("np_config::backup", &Level::INFO));
                assert!(!targets.would_enable("np_config::store::local", &Level::DEBUG));
                assert!(targets.would_enable("zookeeper::io", &Level::WARN));
                assert!(!targets.would_enable("zookeeper::io", &Level::INFO));
            },
        );
    }

    #[test]
    #[serial]
    fn test_crate_and_dependency_levels_are_independent() {
        with_vars(
            &[("NP_CONFIG_LOG", Some("debug")), ("NP_CONFIG_LOG_DEPS", Some("off"))],
            || {
                let targets = targets();
                assert!(targets.would_enable("np_config::store::local", &Level::DEBUG));
                assert!(!targets.would_enable("reqwest::connect", &Level::ERROR));
            },
        );
    }

    #[test]
    fn test_init_is_idempotent() {
        init();
        init();
        assert!(INIT.get().is_some());
    }
}
