use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A caller-supplied value or index violates a precondition.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// An operation was called in the wrong lifecycle state.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
    /// Bytes do not match any recognized version, width or strategy id.
    #[error("format error: {0}")]
    Format(String),
    #[error("io error{}: {source}", fmt_context(.context))]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("file {path:?} is {size} bytes, limit is {limit}")]
    CapacityExceeded { path: PathBuf, size: u64, limit: u64 },
}

fn fmt_context(context: &str) -> String {
    if context.is_empty() {
        String::new()
    } else {
        format!(" [{context}]")
    }
}

impl Error {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn truncated(what: &str, needed: usize, available: usize) -> Self {
        Error::Format(format!(
            "truncated {what}: need {needed} bytes, have {available}"
        ))
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::io(String::new(), value)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Attaches a stream or column name to io failures.
pub(crate) trait IoContext<T> {
    fn io_context(self, context: impl FnOnce() -> String) -> Result<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn io_context(self, context: impl FnOnce() -> String) -> Result<T> {
        self.map_err(|err| Error::io(context(), err))
    }
}
