use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Crates whose events follow `--log-level`. Everything else is held at
/// warnings.
const XENSTORE_TARGETS: [&str; 4] = [
    "xenstore",
    "xenstore_wire",
    "xenstore_transport",
    "xenstore_client",
];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }

    /// `-V` raises the level to at least debug; it never lowers `trace`.
    pub fn with_verbose(self, verbose: bool) -> Self {
        if verbose {
            self.max(LogLevel::Debug)
        } else {
            self
        }
    }
}

fn targets(level: LogLevel) -> Targets {
    XENSTORE_TARGETS
        .iter()
        .fold(Targets::new().with_default(LevelFilter::WARN), |targets, name| {
            targets.with_target(*name, level.as_filter())
        })
}

/// Send logs to stderr so stdout carries only command output. At debug and
/// above each line names its thread, which tells router events apart from
/// the caller's.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let thread_names = level >= LogLevel::Debug;
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .with_thread_names(thread_names);

    let registry = tracing_subscriber::registry().with(targets(level));
    let _ = match format {
        LogFormat::Text => registry.with(layer).try_init(),
        LogFormat::Json => registry.with(layer.json()).try_init(),
    };
}
