// Logging setup for the live quiz client
//
// stdout belongs to the quiz display, so console logs go to stderr and
// the file output is optional.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing::{warn, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

const CRATE_DIRECTIVE: &str = "live_quiz_client=debug";

// Flushing workers for the installed subscriber
static LOG_GUARD: OnceLock<Vec<WorkerGuard>> = OnceLock::new();

/// Install the global subscriber.
///
/// Fails when a subscriber is already installed; the existing one stays
/// in place and this call's writers are dropped.
pub fn init_logging(enable_console: bool, log_file_path: Option<PathBuf>) -> Result<(), TryInitError> {
    let mut guards = Vec::new();

    let file_target = log_file_path.as_deref().map(|path| (path, split_log_path(path)));
    let file_layer = file_target
        .as_ref()
        .and_then(|(_, target)| target.as_ref())
        .map(|(dir, file_name)| {
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            guards.push(guard);
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false)
        });

    let console_layer = enable_console.then(|| {
        let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
        guards.push(guard);
        tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(quiz_filter())
        .with(file_layer)
        .with(console_layer)
        .try_init()?;

    let _ = LOG_GUARD.set(guards);

    if let Some((path, None)) = file_target {
        warn!(path = %path.display(), "Log file path has no file name, file logging disabled");
    }
    Ok(())
}

/// `RUST_LOG` when set, INFO otherwise; this crate always logs at DEBUG
fn quiz_filter() -> EnvFilter {
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();
    match CRATE_DIRECTIVE.parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    }
}

/// Directory and file name for the appender. A bare file name logs to
/// the working directory.
fn split_log_path(path: &Path) -> Option<(PathBuf, String)> {
    let file_name = path.file_name()?.to_str()?.to_string();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Some((dir, file_name))
}
