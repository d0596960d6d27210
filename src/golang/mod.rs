pub mod analyzer;
pub mod matcher;

pub use analyzer::GoAnalyzer;
pub use matcher::{MatchMode, SignatureMatcher};
