use std::fmt;
use std::path::PathBuf;

use crate::core::fingerprint::TreeMismatch;

/// Main error type for packaging operations
#[derive(Debug)]
pub enum PackError {
    InvalidArgument {
        field: String,
        value: String,
        reason: String,
    },
    Io {
        source: std::io::Error,
        context: String,
    },
    Parse {
        path: Option<PathBuf>,
        message: String,
    },
    Manifest {
        field: String,
        reason: String,
    },
    Mismatch {
        mismatches: Vec<TreeMismatch>,
    },
    Config {
        message: String,
        path: Option<PathBuf>,
    },
    Archive {
        path: PathBuf,
        reason: String,
    },
}

impl PackError {
    pub fn invalid_argument(field: &str, value: impl fmt::Display, reason: &str) -> Self {
        PackError::InvalidArgument {
            field: field.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn manifest(field: &str, reason: impl Into<String>) -> Self {
        PackError::Manifest {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// Short machine-friendly name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            PackError::InvalidArgument { .. } => "InvalidArgument",
            PackError::Io { .. } => "IOError",
            PackError::Parse { .. } => "ParseError",
            PackError::Manifest { .. } => "ManifestError",
            PackError::Mismatch { .. } => "MismatchError",
            PackError::Config { .. } => "ConfigError",
            PackError::Archive { .. } => "ArchiveError",
        }
    }
}

impl fmt::Display for PackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackError::InvalidArgument { field, value, reason } => {
                write!(f, "Invalid {} '{}': {}", field, value, reason)
            }
            PackError::Io { source, context } => {
                write!(f, "IO error during {}: {}", context, source)
            }
            PackError::Parse { path, message } => {
                if let Some(path) = path {
                    write!(f, "Failed to parse {}: {}", path.display(), message)
                } else {
                    write!(f, "Failed to parse manifest: {}", message)
                }
            }
            PackError::Manifest { field, reason } => {
                write!(f, "Manifest field '{}' {}", field, reason)
            }
            PackError::Mismatch { mismatches } => {
                write!(f, "{} path(s) differ between trees", mismatches.len())?;
                for mismatch in mismatches {
                    write!(f, "\n  {}", mismatch)?;
                }
                Ok(())
            }
            PackError::Config { message, path } => {
                if let Some(path) = path {
                    write!(f, "Configuration error in {}: {}", path.display(), message)
                } else {
                    write!(f, "Configuration error: {}", message)
                }
            }
            PackError::Archive { path, reason } => {
                write!(f, "Archive error for {}: {}", path.display(), reason)
            }
        }
    }
}

impl std::error::Error for PackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PackError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PackError>;

pub trait ErrorContext<T> {
    fn with_io_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ErrorContext<T> for std::result::Result<T, std::io::Error> {
    fn with_io_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| PackError::Io {
            source: e,
            context: f(),
        })
    }
}

impl<T> ErrorContext<T> for std::result::Result<T, walkdir::Error> {
    fn with_io_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| PackError::Io {
            source: e.into(),
            context: f(),
        })
    }
}
