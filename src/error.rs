use std::io;
use std::path::PathBuf;

/// Failures surfaced to the caller of a single workspace request.
///
/// Everything else (unparseable text, unresolved types) is reported as a
/// [`crate::diagnostics::Diagnostic`] next to a partial result instead.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("no workspace root configured")]
    NoRoots,

    #[error("workspace root not found: {0}")]
    RootNotFound(PathBuf),

    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid glob pattern {pattern}: {source}")]
    Glob {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("service not found: {0}")]
    ServiceNotFound(String),

    #[error("method {method} not found in service {service}")]
    MethodNotFound { service: String, method: String },

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl WorkspaceError {
    pub fn read(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::NotFound {
            return Self::FileNotFound(path);
        }
        Self::Read { path, source }
    }
}

/// Failures of the schema-aware proto layer.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("compile {path}: {message}")]
    Compile { path: PathBuf, message: String },

    #[error("{0} is not part of the compiled descriptor set")]
    MissingFile(PathBuf),

    #[error("message type not found: {0}")]
    UnknownType(String),

    #[error("message nesting cycle through {0}")]
    Cycle(String),
}

pub type Result<T> = std::result::Result<T, WorkspaceError>;
