use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    UnparseableMethod,
    UnparseableDeclaration,
    UnterminatedBlock,
    EmptyService,
    SchemaFallback,
    UnresolvedType,
    ReadError,
}

impl DiagnosticKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnparseableMethod => "unparseable_method",
            Self::UnparseableDeclaration => "unparseable_declaration",
            Self::UnterminatedBlock => "unterminated_block",
            Self::EmptyService => "empty_service",
            Self::SchemaFallback => "schema_fallback",
            Self::UnresolvedType => "unresolved_type",
            Self::ReadError => "read_error",
        }
    }
}

/// Something an extractor skipped, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub subject: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            subject: subject.into(),
            message: message.into(),
            file: None,
        }
    }

    pub fn with_file(mut self, file: &Path) -> Self {
        self.file = Some(file.to_path_buf());
        self
    }
}

/// Best-effort extraction result: what parsed, plus what was dropped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Extracted<T> {
    pub items: Vec<T>,
    pub diagnostics: Vec<Diagnostic>,
}

impl<T> Default for Extracted<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            diagnostics: Vec::new(),
        }
    }
}

impl<T> Extracted<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        tracing::debug!(
            kind = diagnostic.kind.as_str(),
            subject = %diagnostic.subject,
            "{}",
            diagnostic.message
        );
        self.diagnostics.push(diagnostic);
    }

    pub fn extend(&mut self, other: Extracted<T>) {
        self.items.extend(other.items);
        self.diagnostics.extend(other.diagnostics);
    }

    /// Attach `file` to every diagnostic that does not name one yet.
    pub fn in_file(mut self, file: &Path) -> Self {
        for diagnostic in &mut self.diagnostics {
            if diagnostic.file.is_none() {
                diagnostic.file = Some(file.to_path_buf());
            }
        }
        self
    }
}

/// Result of one extraction layer.
///
/// `Fallback` means the layer ran cleanly but produced nothing usable, so the
/// next layer should be tried. `Failure` means the layer itself could not run.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome<T> {
    Success(T),
    Fallback(Vec<Diagnostic>),
    Failure(Diagnostic),
}

impl<T> ParseOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn success(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }
}
