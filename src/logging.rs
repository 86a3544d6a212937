use std::fs::OpenOptions;
use std::sync::{Mutex, Once};

use slog::Drain;

// The menu owns stdout; only warnings reach the terminal unless asked for.
fn level_from_env_or_default(default: log::LevelFilter) -> log::LevelFilter {
    let Ok(value) = std::env::var("RUST_LOG") else {
        return default;
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "info" => log::LevelFilter::Info,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        "off" => log::LevelFilter::Off,
        _ => default,
    }
}

fn default_level(verbose: bool) -> log::LevelFilter {
    if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    }
}

static LOGGER_GUARD: Mutex<Option<slog_scope::GlobalLoggerGuard>> = Mutex::new(None);

fn install_logger(logger: slog::Logger, level: log::LevelFilter) {
    static STDLOG_INIT: Once = Once::new();

    if let Ok(mut guard) = LOGGER_GUARD.lock() {
        if guard.is_none() {
            *guard = Some(slog_scope::set_global_logger(logger));
        }
    }

    STDLOG_INIT.call_once(|| {
        let _ = slog_stdlog::init();
    });
    log::set_max_level(level);
}

fn async_root<D>(drain: D) -> slog::Logger
where
    D: Drain<Ok = (), Err = slog::Never> + Send + 'static,
{
    let drain = slog_async::Async::new(drain)
        .overflow_strategy(slog_async::OverflowStrategy::Block)
        .build()
        .fuse();
    slog::Logger::root(drain, slog::o!("app" => "hy2"))
}

pub fn init_terminal(verbose: bool) {
    let level = level_from_env_or_default(default_level(verbose));
    let decorator = slog_term::TermDecorator::new().stderr().build();
    let drain = slog_term::CompactFormat::new(decorator).build().fuse();
    install_logger(async_root(drain), level);
}

/// Log to a file instead of the terminal; the file always gets at least info.
pub fn init_file(path: &str, verbose: bool) -> anyhow::Result<()> {
    let level = level_from_env_or_default(default_level(verbose).max(log::LevelFilter::Info));
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let decorator = slog_term::PlainDecorator::new(file);
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    install_logger(async_root(drain), level);
    Ok(())
}

/// Drops the global logger so the async drain writes out what it still
/// buffers. Call before `process::exit`, which skips destructors.
pub fn shutdown() {
    let guard = LOGGER_GUARD.lock().ok().and_then(|mut guard| guard.take());
    drop(guard);
}
