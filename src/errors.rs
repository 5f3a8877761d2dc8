use std::error::Error;
use std::io;
use std::path::PathBuf;

use thiserror::Error;
use zip::result::ZipError;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_INVALID_PARAMETERS: u8 = 1;
pub const EXIT_OTHER_ERROR: u8 = 99;

#[derive(Error, Debug)]
pub enum SamError {
    /// Bad command line or settings value, reported before any network call
    #[error("{0}")]
    InvalidParameter(String),

    /// One download attempt failed or ran out of time.  Absorbed by the retry loop.
    #[error("download of {url} failed: {reason}")]
    Transfer { url: String, reason: String },

    #[error("{0}")]
    RemoteStore(String),

    #[error("failed to read archive {}", .path.display())]
    Archive { path: PathBuf, source: ZipError },

    #[error("i/o error on {}", .path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("{0}")]
    Unexpected(String),
}

impl SamError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> SamError {
        SamError::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit status for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            SamError::InvalidParameter(_) => EXIT_INVALID_PARAMETERS,
            _ => EXIT_OTHER_ERROR,
        }
    }

    /// The message followed by every underlying cause, one per line.
    pub fn report(&self) -> String {
        let mut out = self.to_string();
        let mut source = self.source();
        while let Some(cause) = source {
            out.push_str(&format!("\n  caused by: {}", cause));
            source = cause.source();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes() {
        assert_eq!(EXIT_SUCCESS, 0);
        assert_eq!(SamError::InvalidParameter("x".into()).exit_code(), 1);
        assert_eq!(SamError::RemoteStore("x".into()).exit_code(), 99);
        assert_eq!(SamError::Unexpected("x".into()).exit_code(), 99);
        let e = SamError::io("/tmp/x", io::Error::other("disk full"));
        assert_eq!(e.exit_code(), 99);
    }

    #[test]
    fn report_includes_cause() {
        let e = SamError::io("/tmp/ingest/a.dat", io::Error::other("disk full"));
        let report = e.report();
        assert!(report.starts_with("i/o error on /tmp/ingest/a.dat"));
        assert!(report.contains("caused by: disk full"));
    }
}
