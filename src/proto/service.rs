use crate::diagnostics::{Diagnostic, DiagnosticKind, Extracted, ParseOutcome};
use crate::model::ProtoService;
use crate::proto::method;
use crate::text::find_block_end;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

static PACKAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bpackage\s+([a-zA-Z0-9_.]+)\s*;").expect("package regex"));
static STRICT_SERVICE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bservice\s+(\w+)\s*\{").expect("service regex"));
// Dotted names, comments and option noise between the name and the brace.
static LOOSE_SERVICE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bservice\s+([A-Za-z_][\w.]*)(?:\s|//[^\n]*|/\*[\s\S]*?\*/)*\{")
        .expect("loose service regex")
});

/// A `service Name { ... }` block located in a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceBlock {
    pub name: String,
    /// Offset just after the opening brace.
    pub body_start: usize,
    /// Offset of the closing brace.
    pub end: usize,
}

impl ServiceBlock {
    pub fn body<'a>(&self, text: &'a str) -> &'a str {
        &text[self.body_start..self.end]
    }
}

/// Declared package, or the name of the directory holding the file.
pub fn package_name(text: &str, file_path: &Path) -> String {
    if let Some(package) = declared_package(text) {
        return package;
    }
    file_path
        .parent()
        .and_then(|dir| dir.file_name())
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .unwrap_or("default")
        .to_string()
}

pub fn declared_package(text: &str) -> Option<String> {
    PACKAGE_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Locates service blocks whose start matches `start_re`, balancing braces to
/// find each end. Unterminated blocks are skipped and reported.
pub fn locate_service_blocks(text: &str, start_re: &Regex) -> Extracted<ServiceBlock> {
    let mut out = Extracted::new();
    for caps in start_re.captures_iter(text) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        match find_block_end(text, whole.end()) {
            Some(end) => out.push(ServiceBlock {
                name: name.as_str().to_string(),
                body_start: whole.end(),
                end,
            }),
            None => out.report(Diagnostic::new(
                DiagnosticKind::UnterminatedBlock,
                name.as_str(),
                "service block never closes",
            )),
        }
    }
    out
}

/// Strict layer: `service Name {` with a plain identifier.
pub fn extract_strict(text: &str, file_path: &Path) -> ParseOutcome<Extracted<ProtoService>> {
    extract_with(text, file_path, &STRICT_SERVICE_RE)
}

/// Loose layer: tolerates dotted names and comments before the brace.
pub fn extract_loose(text: &str, file_path: &Path) -> ParseOutcome<Extracted<ProtoService>> {
    extract_with(text, file_path, &LOOSE_SERVICE_RE)
}

/// Runs the text layers in order and returns the first that finds services.
pub fn extract_services(text: &str, file_path: &Path) -> ParseOutcome<Extracted<ProtoService>> {
    let mut skipped = Vec::new();
    for (layer, extract) in [
        ("strict", extract_strict as fn(&str, &Path) -> ParseOutcome<Extracted<ProtoService>>),
        ("loose", extract_loose),
    ] {
        match extract(text, file_path) {
            ParseOutcome::Success(mut found) => {
                tracing::debug!(
                    file = %file_path.display(),
                    layer,
                    services = found.items.len(),
                    "services extracted"
                );
                let mut diagnostics = std::mem::take(&mut skipped);
                diagnostics.append(&mut found.diagnostics);
                found.diagnostics = diagnostics;
                return ParseOutcome::Success(found);
            }
            ParseOutcome::Fallback(diagnostics) => {
                tracing::debug!(file = %file_path.display(), layer, "no services, falling back");
                skipped.extend(diagnostics);
            }
            ParseOutcome::Failure(diagnostic) => skipped.push(diagnostic),
        }
    }
    ParseOutcome::Fallback(dedup(skipped))
}

fn extract_with(
    text: &str,
    file_path: &Path,
    start_re: &Regex,
) -> ParseOutcome<Extracted<ProtoService>> {
    let package = package_name(text, file_path);
    let blocks = locate_service_blocks(text, start_re);
    let mut out = Extracted {
        items: Vec::new(),
        diagnostics: blocks.diagnostics,
    };
    for block in blocks.items {
        let methods = method::extract_methods(&block.name, block.body(text));
        out.diagnostics.extend(methods.diagnostics);
        if methods.items.is_empty() {
            out.report(Diagnostic::new(
                DiagnosticKind::EmptyService,
                block.name.as_str(),
                "no method could be parsed",
            ));
            continue;
        }
        out.push(ProtoService {
            full_name: format!("{package}.{}", block.name),
            name: block.name,
            file_path: file_path.to_path_buf(),
            methods: methods.items,
        });
    }
    if out.items.is_empty() {
        return ParseOutcome::Fallback(out.diagnostics);
    }
    ParseOutcome::Success(out)
}

// Both text layers see the same methods, so their reports overlap.
fn dedup(diagnostics: Vec<Diagnostic>) -> Vec<Diagnostic> {
    let mut out: Vec<Diagnostic> = Vec::with_capacity(diagnostics.len());
    for diagnostic in diagnostics {
        if !out.contains(&diagnostic) {
            out.push(diagnostic);
        }
    }
    out
}
