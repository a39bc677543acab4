//! Tracing subscriber setup for the CLI.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Filter used when neither `RUST_LOG` nor the caller names one.
pub const DEFAULT_FILTER: &str = "scry=info,scry_core=info,reqwest=warn,hyper=warn";

fn filter(directives: Option<&str>) -> EnvFilter {
    if let Some(directives) = directives {
        match EnvFilter::try_new(directives) {
            Ok(f) => return f,
            Err(e) => eprintln!("invalid log filter '{directives}' ({e}), using defaults"),
        }
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the global subscriber: stderr always, plus a daily rotating
/// `scry.log` under `log_dir` when given.
///
/// Keep the returned guard alive until exit; dropping it flushes the file
/// writer.
pub fn init(directives: Option<&str>, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let stderr = fmt::layer().with_writer(std::io::stderr).with_target(false);

    match log_dir {
        Some(dir) => {
            let appender = RollingFileAppender::new(Rotation::DAILY, dir, "scry.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = fmt::layer()
                .with_ansi(false)
                .with_line_number(true)
                .with_writer(writer);
            tracing_subscriber::registry()
                .with(filter(directives))
                .with(stderr)
                .with(file)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter(directives))
                .with(stderr)
                .init();
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_directives_win() {
        let f = filter(Some("scry=debug"));
        assert_eq!(f.to_string(), "scry=debug");
    }

    #[test]
    fn invalid_directives_fall_back() {
        let f = filter(Some("scry=notalevel"));
        assert!(!f.to_string().is_empty());
    }
}
