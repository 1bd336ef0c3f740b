//! Log subscriber setup and the per-request logger handle.
//!
//! The subscriber is installed once at process start by [`init`]. Code on
//! the request path never touches it directly: it asks the request's
//! [`RequestContext`](crate::RequestContext) for a [`ContextLogger`], which
//! stamps every event with the trace id, route signature and user.
//!
//! Targets:
//! - `access`: one trace-level record per request (see
//!   [`TracingSink`](crate::middleware::TracingSink))
//! - `fatal`: panics caught by the recovery guard

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::config::LogConfig;
use crate::error::Error;

const UNSET: &str = "-";

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` overrides `config.level`. When `config.dir` is set, output goes
/// to a daily-rolling file there; keep the returned guard alive until
/// shutdown so buffered lines are flushed.
pub fn init(config: &LogConfig) -> Result<Option<WorkerGuard>, Error> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| Error::Logging(e.to_string()))?;

    let (writer, guard) = match &config.dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "gatehouse.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(non_blocking), Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stdout), None),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(true);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| Error::Logging(e.to_string()))?;

    Ok(guard)
}

/// Logger keyed by one request's identifiers.
#[derive(Clone, Copy, Debug)]
pub struct ContextLogger<'a> {
    trace_id: Option<&'a str>,
    route: Option<&'a str>,
    user: Option<&'a str>,
}

impl<'a> ContextLogger<'a> {
    pub fn new(trace_id: Option<&'a str>, route: Option<&'a str>, user: Option<&'a str>) -> Self {
        Self { trace_id, route, user }
    }

    pub fn warn(&self, message: &str, err: &dyn std::fmt::Display) {
        tracing::warn!(
            trace_id = self.trace_id.unwrap_or(UNSET),
            route = self.route.unwrap_or(UNSET),
            user = self.user.unwrap_or(UNSET),
            error = %err,
            "{message}"
        );
    }

    pub fn error(&self, message: &str, err: &dyn std::fmt::Display) {
        tracing::error!(
            trace_id = self.trace_id.unwrap_or(UNSET),
            route = self.route.unwrap_or(UNSET),
            user = self.user.unwrap_or(UNSET),
            error = %err,
            "{message}"
        );
    }

    /// A panic that reached the recovery guard.
    pub fn fatal(&self, fault: &str, stack: &str) {
        tracing::error!(
            target: "fatal",
            trace_id = self.trace_id.unwrap_or(UNSET),
            route = self.route.unwrap_or(UNSET),
            user = self.user.unwrap_or(UNSET),
            fault,
            stack,
            "recover"
        );
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::io;
    use std::sync::{Arc, Mutex};

    use tracing_subscriber::fmt::MakeWriter;

    /// Collects the JSON lines of a subscriber installed with
    /// `tracing::subscriber::set_default`.
    #[derive(Clone, Default)]
    pub(crate) struct LogCapture(Arc<Mutex<Vec<u8>>>);

    impl LogCapture {
        pub(crate) fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync + 'static {
            tracing_subscriber::fmt()
                .json()
                .with_max_level(tracing::Level::TRACE)
                .with_writer(self.clone())
                .finish()
        }

        /// Every event written so far, parsed.
        pub(crate) fn events(&self) -> Vec<serde_json::Value> {
            let raw = self.0.lock().unwrap().clone();
            String::from_utf8_lossy(&raw)
                .lines()
                .filter_map(|line| serde_json::from_str(line).ok())
                .collect()
        }

        pub(crate) fn on_target(&self, target: &str) -> Vec<serde_json::Value> {
            self.events().into_iter().filter(|e| e["target"] == target).collect()
        }
    }

    impl io::Write for LogCapture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for LogCapture {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }
}
