use anyhow::Result;
use media_migrate_core::LogHealth;
use std::io::{self, IsTerminal, Write};
use std::path::Path;
use tracing_appender::non_blocking::{NonBlockingBuilder, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::{self, time::ChronoUtc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Counts failed writes so a damaged `migration.log` shows up in the exit code
struct TrackedWriter<W> {
    inner: W,
    health: LogHealth,
}

impl<W: Write> Write for TrackedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf).map_err(|e| {
            self.health.record_failure();
            e
        })
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush().map_err(|e| {
            self.health.record_failure();
            e
        })
    }
}

fn filter_for(verbose_level: u8, base: &str) -> EnvFilter {
    // 0 = base, 1 = debug (with hyper::proto::h1 suppressed), 2+ = trace (all logs)
    let filter_str = match verbose_level {
        0 => base,
        1 => "debug,hyper::proto::h1=warn,hyper::client::pool=warn",
        _ => "trace",
    };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_str))
}

fn open_log_file(log_path: &Path) -> Result<RollingFileAppender> {
    let log_dir = match log_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(log_dir)?;
    let log_filename = log_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid log filename: {}", log_path.display()))?;

    // Rotation::NEVER appends to exactly `log_filename`
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(log_filename)
        .build(log_dir)?;
    Ok(appender)
}

/// Console layer on stderr plus the append-only migration log.
///
/// The returned guard flushes the log when dropped. If the log file cannot
/// be opened the run continues on the console and `health` records it.
pub fn init_logging(
    verbose_level: u8,
    quiet: bool,
    log_file: &Path,
    health: LogHealth,
) -> Result<Option<WorkerGuard>> {
    let console_filter = if quiet {
        // In quiet mode, only show errors
        EnvFilter::new("error")
    } else {
        filter_for(verbose_level, "info")
    };

    let json = std::env::var("RUST_LOG_JSON")
        .map(|v| v == "true")
        .unwrap_or(false);

    let console: BoxedLayer = if json {
        fmt::layer()
            .json()
            .with_timer(ChronoUtc::rfc_3339())
            .with_writer(io::stderr)
            .with_filter(console_filter)
            .boxed()
    } else {
        fmt::layer()
            .with_timer(ChronoUtc::rfc_3339())
            .with_ansi(io::stderr().is_terminal())
            .with_writer(io::stderr)
            .with_filter(console_filter)
            .boxed()
    };
    let mut layers = vec![console];

    let mut guard = None;
    let mut open_error = None;
    match open_log_file(log_file) {
        Ok(appender) => {
            let writer = TrackedWriter {
                inner: appender,
                health: health.clone(),
            };
            let (non_blocking, worker_guard) = NonBlockingBuilder::default().lossy(false).finish(writer);
            let file_layer = fmt::layer()
                .with_timer(ChronoUtc::rfc_3339())
                .with_ansi(false) // Disable ANSI codes when writing to file
                .with_writer(non_blocking)
                .with_filter(filter_for(verbose_level, "info"))
                .boxed();
            layers.push(file_layer);
            guard = Some(worker_guard);
        }
        Err(e) => {
            health.record_failure();
            open_error = Some(e);
        }
    }

    Registry::default().with(layers).init();

    if let Some(e) = open_error {
        tracing::error!("Could not open {}: {}. Logging to the console only.", log_file.display(), e);
    }
    Ok(guard)
}
