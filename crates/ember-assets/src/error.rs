use std::error::Error;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Errors produced by the asset system.
#[derive(Debug)]
pub enum AssetError {
    /// The asset or cache file does not exist on the active source.
    NotFound { path: PathBuf },
    /// An I/O operation on the underlying source failed.
    Io { path: PathBuf, source: io::Error },
    /// An empty path was passed to a load operation.
    EmptyPath,
    /// A metadata cache file could not be parsed.
    CacheFormat { path: PathBuf, message: String },
    /// The file watcher could not be started.
    Watch { path: PathBuf, message: String },
}

impl fmt::Display for AssetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetError::NotFound { path } => {
                write!(f, "asset not found: {}", path.display())
            }
            AssetError::Io { path, source } => {
                write!(f, "io error on {}: {}", path.display(), source)
            }
            AssetError::EmptyPath => write!(f, "empty asset path"),
            AssetError::CacheFormat { path, message } => {
                write!(f, "malformed asset cache {}: {}", path.display(), message)
            }
            AssetError::Watch { path, message } => {
                write!(f, "cannot watch {}: {}", path.display(), message)
            }
        }
    }
}

impl Error for AssetError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AssetError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl AssetError {
    pub(crate) fn from_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::NotFound {
            AssetError::NotFound { path }
        } else {
            AssetError::Io { path, source }
        }
    }
}

pub type AssetResult<T> = Result<T, AssetError>;
