use std::path::PathBuf;
use thiserror::Error;

/// Failures of the loading and normalization pipeline.
///
/// Every variant is fatal: the driver propagates it to `main` and no figure is written.
#[derive(Error, Debug)]
pub enum Error {
    #[error("resource not found: {path:?}")]
    ResourceNotFound { path: PathBuf },

    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed record in {path:?} (line {line:?}): {reason}")]
    MalformedRecord {
        path: PathBuf,
        line: Option<usize>,
        reason: String,
    },

    #[error("degenerate baseline {first_year}-{last_year}: {reason}")]
    DegenerateBaseline {
        first_year: i32,
        last_year: i32,
        reason: String,
    },

    #[error("misaligned series: {0}")]
    MisalignedSeries(String),
}

impl Error {
    pub fn malformed<P: Into<PathBuf>, S: Into<String>>(
        path: P,
        line: Option<usize>,
        reason: S,
    ) -> Self {
        Self::MalformedRecord {
            path: path.into(),
            line,
            reason: reason.into(),
        }
    }

    /// Classify an I/O failure on `path`, singling out missing files.
    pub fn from_io<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::ResourceNotFound { path },
            _ => Self::Io { path, source },
        }
    }
}
