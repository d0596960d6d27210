pub mod cache;
pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod golang;
pub mod model;
pub mod proto;
pub mod rpc;
pub mod scan;
pub mod text;
pub mod util;
pub mod watch;
pub mod workspace;

pub use cache::{AnalysisCache, SourceAnalyzer};
pub use error::{SchemaError, WorkspaceError};
pub use workspace::{FileEvent, Workspace};
