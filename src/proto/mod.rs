pub mod filter;
pub mod method;
pub mod schema;
pub mod service;
pub mod template;
pub mod url;

use crate::diagnostics::{Diagnostic, DiagnosticKind, Extracted, ParseOutcome};
use crate::error::{Result, WorkspaceError};
use crate::model::ProtoService;
use regex::Regex;
use schema::SchemaLoader;
use std::path::Path;
use std::sync::LazyLock;

pub use filter::{ExclusionReason, exclusion_reason, filter_services};
pub use method::extract_methods;
pub use service::extract_services;

// A declaration, not the word inside `go_package` paths or prose.
static SERVICE_DECL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bservice\s+[A-Za-z_]").expect("service declaration regex"));

/// Runs the extraction layers for one proto file: strict text, loose text,
/// then the compiled schema.
#[derive(Debug, Clone, Default)]
pub struct ProtoParser {
    schema: SchemaLoader,
}

impl ProtoParser {
    pub fn new(schema: SchemaLoader) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &SchemaLoader {
        &self.schema
    }

    pub fn parse_file(&self, path: &Path) -> Result<Extracted<ProtoService>> {
        let text = std::fs::read_to_string(path).map_err(|err| WorkspaceError::read(path, err))?;
        Ok(self.parse_text(path, &text))
    }

    /// Never fails: whatever no layer could recover is reported as diagnostics.
    pub fn parse_text(&self, path: &Path, text: &str) -> Extracted<ProtoService> {
        let mut diagnostics = match service::extract_services(text, path) {
            ParseOutcome::Success(found) => return found.in_file(path),
            ParseOutcome::Fallback(diagnostics) => diagnostics,
            ParseOutcome::Failure(diagnostic) => vec![diagnostic],
        };

        if !SERVICE_DECL_RE.is_match(text) {
            // No service declaration: a messages-only file, nothing to recover.
            return Extracted {
                items: Vec::new(),
                diagnostics,
            }
            .in_file(path);
        }

        tracing::debug!(file = %path.display(), "text layers found no service, trying schema");
        let out = match schema::services_from_schema(&self.schema, text, path) {
            ParseOutcome::Success(mut found) => {
                diagnostics.append(&mut found.diagnostics);
                found.diagnostics = diagnostics;
                found
            }
            ParseOutcome::Fallback(mut rest) => {
                diagnostics.append(&mut rest);
                Extracted {
                    items: Vec::new(),
                    diagnostics,
                }
            }
            ParseOutcome::Failure(diagnostic) => {
                tracing::warn!(file = %path.display(), error = %diagnostic.message, "schema load failed");
                diagnostics.push(diagnostic);
                Extracted {
                    items: Vec::new(),
                    diagnostics,
                }
            }
        };
        out.in_file(path)
    }
}

pub(crate) fn read_failure(path: &Path, err: &WorkspaceError) -> Diagnostic {
    Diagnostic::new(DiagnosticKind::ReadError, path.display().to_string(), err.to_string())
        .with_file(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_only_file_skips_schema_layer() {
        let parser = ProtoParser::default();
        let out = parser.parse_text(
            Path::new("/nonexistent/types.proto"),
            "syntax = \"proto3\";\nmessage Ping { string id = 1; }\n",
        );
        assert!(out.items.is_empty());
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn service_word_in_options_does_not_reach_schema_layer() {
        let parser = ProtoParser::default();
        let out = parser.parse_text(
            Path::new("/nonexistent/types.proto"),
            "syntax = \"proto3\";\noption go_package = \"example.com/service/v1;v1\";\n// shared by the service layer\nimport \"missing/dep.proto\";\nmessage Ping { string id = 1; }\n",
        );
        assert!(out.items.is_empty());
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn schema_failure_is_a_diagnostic() {
        let parser = ProtoParser::default();
        let path = Path::new("/nonexistent/broken.proto");
        let out = parser.parse_text(path, "service Broken");
        assert!(out.items.is_empty());
        let diag = out
            .diagnostics
            .iter()
            .find(|d| d.kind == DiagnosticKind::SchemaFallback)
            .expect("schema diagnostic");
        assert_eq!(diag.file.as_deref(), Some(path));
    }
}
