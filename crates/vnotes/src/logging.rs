use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::Registry;

use crate::args::GlobalArgs;

/// Initialize the dual-layer tracing subscriber.
///
/// Sets up:
/// - File layer: writes `vnotes.log` in the OS temp directory with daily rotation,
///   filtered by `RUST_LOG` (default "info", or "debug" when `debug` is set)
/// - Stderr layer: level follows `--quiet` / `--verbose`
///
/// Returns a `WorkerGuard` that must be kept alive for the file logging to work.
pub fn init_tracing(args: &GlobalArgs, debug: bool) -> WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(std::env::temp_dir(), "vnotes.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let default_level = if debug { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_thread_names(true)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(env_filter);

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .with_filter(stderr_level(args));

    Registry::default().with(file_layer).with(stderr_layer).init();

    guard
}

fn stderr_level(args: &GlobalArgs) -> LevelFilter {
    if args.quiet {
        return LevelFilter::OFF;
    }
    match args.verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}
