//! Errors raised while opening and reading DSSAT inputs
use std::fmt::Display;
use std::io::ErrorKind;
use std::path::PathBuf;

use crate::format_specs::PError;

/// Type alias for a `Result` with [`DssatError`] as the error type.
pub type DResult<T> = Result<T, DssatError>;


/// An error opening a DSSAT archive or building a column schema
#[derive(Debug)]
pub enum DssatError {
    /// Indicates that the path given to a reader does not exist.
    FileMissing { path: PathBuf },

    /// Indicates an I/O error while opening a file or reading its lines.
    IoFailure(std::io::Error),

    /// Indicates that a ZIP container or one of its entries could not be read.
    ArchiveCorrupt { path: PathBuf, reason: String },

    /// Indicates a schema with a zero width, a duplicated field name, or a
    /// number of field names that does not match its format.
    InvalidSchema(String),

    /// Indicates an invalid Fortran format string given for a schema.
    FormatError(PError),
}

impl Display for DssatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DssatError::FileMissing { path } => {
                write!(f, "File not found: '{}'", path.display())
            },
            DssatError::IoFailure(e) => write!(f, "Error reading input: {e}"),
            DssatError::ArchiveCorrupt { path, reason } => {
                write!(f, "Could not read ZIP archive '{}': {reason}", path.display())
            },
            DssatError::InvalidSchema(msg) => write!(f, "Invalid schema: {msg}"),
            DssatError::FormatError(e) => write!(f, "Error parsing format: {e}"),
        }
    }
}

impl std::error::Error for DssatError {}

impl From<std::io::Error> for DssatError {
    fn from(value: std::io::Error) -> Self {
        Self::IoFailure(value)
    }
}

impl From<PError> for DssatError {
    fn from(value: PError) -> Self {
        Self::FormatError(value)
    }
}

impl DssatError {
    /// Errors from opening an archive. Running out of data or hitting malformed
    /// data means the archive is damaged; other I/O errors are passed through.
    pub(crate) fn from_zip<P: Into<PathBuf>>(e: zip::result::ZipError, path: P) -> Self {
        match e {
            zip::result::ZipError::Io(e) if matches!(e.kind(), ErrorKind::UnexpectedEof | ErrorKind::InvalidData) => {
                Self::ArchiveCorrupt { path: path.into(), reason: e.to_string() }
            },
            zip::result::ZipError::Io(e) => Self::IoFailure(e),
            other => Self::ArchiveCorrupt { path: path.into(), reason: other.to_string() },
        }
    }
}
