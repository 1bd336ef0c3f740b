//! Infrastructure error type.

/// The error type returned by gatehouse's fallible setup and serving
/// operations.
///
/// Request-level failures are [`Failure`](crate::Failure)s and end up as
/// envelope responses. This type covers what happens around requests:
/// binding a port, reading configuration, installing the log subscriber.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("config: {0}")]
    Config(String),

    #[error("logging: {0}")]
    Logging(String),
}

impl Error {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
