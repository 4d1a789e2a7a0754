use std::path::PathBuf;

use thiserror::Error;

/// Failures raised by cache backends.
///
/// A missing key or bucket is never an error; backends report it as `None`.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("io error on `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("gzip failure on `{path}`: {source}")]
    Compression {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed bucket `{path}`: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize cache value: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("cache directory `{dir}` rejected: {reason}")]
    Sandbox { dir: String, reason: &'static str },
    #[error("invalid cache instance `{instance}`: {reason}")]
    Configuration { instance: String, reason: String },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn compression(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Compression {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn malformed(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Malformed {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn configuration(instance: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            instance: instance.into(),
            reason: reason.into(),
        }
    }
}
