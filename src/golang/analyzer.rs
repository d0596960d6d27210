use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::model::{FileAnalysis, GoInterface, GoMethod, GoParam, GoStruct};
use crate::text::{LineIndex, find_block_end};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

// One level of nested braces in the body, enough for `interface{}` params.
static INTERFACE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\btype\s+(\w+)\s+interface\s*\{([^{}]*(?:\{[^{}]*\}[^{}]*)*)\}")
        .expect("interface regex")
});
static METHOD_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\w+)\s*\(([^)]*)\)\s*(.*)$").expect("method line regex"));
static STRUCT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\btype\s+(\w+)\s+struct\s*\{").expect("struct regex"));

/// Structural Go reader: interfaces, structs and their receiver methods.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoAnalyzer;

impl GoAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, path: &Path, text: &str) -> FileAnalysis {
        let index = LineIndex::new(text);
        let mut analysis = FileAnalysis::default();
        parse_interfaces(path, text, &index, &mut analysis);
        parse_structs(path, text, &index, &mut analysis);
        for diagnostic in &mut analysis.diagnostics {
            diagnostic.file = Some(path.to_path_buf());
        }
        tracing::debug!(
            file = %path.display(),
            interfaces = analysis.interfaces.len(),
            structs = analysis.structs.len(),
            skipped = analysis.diagnostics.len(),
            "go file analyzed"
        );
        analysis
    }
}

fn parse_interfaces(path: &Path, text: &str, index: &LineIndex<'_>, out: &mut FileAnalysis) {
    for caps in INTERFACE_RE.captures_iter(text) {
        let (Some(whole), Some(name), Some(body)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let methods = interface_methods(
            name.as_str(),
            body.as_str(),
            body.start(),
            index,
            &mut out.diagnostics,
        );
        out.interfaces.push(GoInterface {
            name: name.as_str().to_string(),
            methods,
            position: index.position(whole.start()),
            range: index.range(whole.start(), whole.end()),
            file_path: path.to_path_buf(),
        });
    }
}

fn interface_methods(
    interface_name: &str,
    body: &str,
    body_offset: usize,
    index: &LineIndex<'_>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<GoMethod> {
    let mut methods = Vec::new();
    let mut line_offset = body_offset;
    for line in body.split('\n') {
        let start = line_offset;
        line_offset += line.len() + 1;

        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("//") || trimmed.starts_with("/*") {
            continue;
        }
        let Some(caps) = METHOD_LINE_RE.captures(trimmed) else {
            // Embedded interfaces carry no parens; anything else is worth a note.
            if trimmed.contains('(') {
                diagnostics.push(Diagnostic::new(
                    DiagnosticKind::UnparseableDeclaration,
                    interface_name,
                    format!("unrecognized interface line: {trimmed}"),
                ));
            }
            continue;
        };
        let (Some(name), Some(params)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let returns = caps.get(3).map(|m| m.as_str()).unwrap_or_default();

        let name_start = start + (line.len() - line.trim_start().len());
        let name_end = name_start + name.as_str().len();
        methods.push(GoMethod {
            name: name.as_str().to_string(),
            signature: trimmed.to_string(),
            params: parse_params(params.as_str()),
            returns: parse_returns(strip_line_comment(returns)),
            position: index.position(name_start),
            range: index.range(name_start, name_end),
        });
    }
    methods
}

fn parse_structs(path: &Path, text: &str, index: &LineIndex<'_>, out: &mut FileAnalysis) {
    for caps in STRUCT_RE.captures_iter(text) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let Some(close) = find_block_end(text, whole.end()) else {
            out.diagnostics.push(Diagnostic::new(
                DiagnosticKind::UnterminatedBlock,
                name.as_str(),
                "struct body never closes",
            ));
            continue;
        };
        let methods = receiver_methods(name.as_str(), text, index);
        out.structs.push(GoStruct {
            name: name.as_str().to_string(),
            methods,
            position: index.position(whole.start()),
            range: index.range(whole.start(), close + 1),
            file_path: path.to_path_buf(),
        });
    }
}

/// Methods declared anywhere in `text` with `name` (or `*name`) as receiver.
fn receiver_methods(struct_name: &str, text: &str, index: &LineIndex<'_>) -> Vec<GoMethod> {
    let pattern = format!(
        r"func\s*\(\s*\w*\s*\*?\b{}\s*\)\s*(\w+)\s*\(([^)]*)\)\s*(\([^)]*\)|[\w\[\]\*\.]*)?",
        regex::escape(struct_name)
    );
    let re = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(err) => {
            tracing::debug!(struct_name, error = %err, "receiver pattern rejected");
            return Vec::new();
        }
    };

    re.captures_iter(text)
        .filter_map(|caps| {
            let name = caps.get(1)?;
            let params = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            let returns = caps.get(3).map(|m| m.as_str()).unwrap_or_default();
            Some(GoMethod {
                name: name.as_str().to_string(),
                signature: format!("{}({params}) {returns}", name.as_str())
                    .trim()
                    .to_string(),
                params: parse_params(params),
                returns: parse_returns(returns),
                position: index.position(name.start()),
                range: index.range(name.start(), name.end()),
            })
        })
        .collect()
}

/// `ctx context.Context, id int64` → named params; a lone token is an
/// unnamed param of that type.
pub fn parse_params(raw: &str) -> Vec<GoParam> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| match part.split_once(char::is_whitespace) {
            Some((name, rest)) => GoParam {
                name: name.to_string(),
                param_type: rest.split_whitespace().collect::<Vec<_>>().join(" "),
            },
            None => GoParam {
                name: String::new(),
                param_type: part.to_string(),
            },
        })
        .collect()
}

/// `(*User, error)` or a bare `error`.
pub fn parse_returns(raw: &str) -> Vec<GoParam> {
    let raw = raw.trim();
    let raw = raw.strip_prefix('(').unwrap_or(raw);
    let raw = raw.strip_suffix(')').unwrap_or(raw);
    parse_params(raw)
}

fn strip_line_comment(text: &str) -> &str {
    match text.find("//") {
        Some(idx) => text[..idx].trim_end(),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Position;

    #[test]
    fn params_split_on_first_whitespace() {
        let params = parse_params("ctx context.Context, id int64, map[string]int");
        assert_eq!(params.len(), 3);
        assert_eq!(params[0].name, "ctx");
        assert_eq!(params[0].param_type, "context.Context");
        assert_eq!(params[2].name, "");
        assert_eq!(params[2].param_type, "map[string]int");
        assert!(parse_params("  ").is_empty());
    }

    #[test]
    fn returns_strip_outer_parens() {
        let returns = parse_returns("(*User, error)");
        assert_eq!(returns.len(), 2);
        assert_eq!(returns[0].param_type, "*User");
        assert_eq!(parse_returns("error").len(), 1);
        assert!(parse_returns("").is_empty());
    }

    #[test]
    fn interface_method_positions_are_exact() {
        let text = "package repo\n\ntype Store interface {\n\tGet(id int64) (*Item, error) // by id\n\tPut(item *Item) error\n}\n";
        let analysis = GoAnalyzer::new().analyze(Path::new("store.go"), text);
        let store = &analysis.interfaces[0];
        assert_eq!(store.name, "Store");
        assert_eq!(store.position, Position::new(2, 0));
        assert_eq!(store.methods[0].position, Position::new(3, 1));
        assert_eq!(store.methods[0].range.end, Position::new(3, 4));
        assert_eq!(store.methods[0].returns.len(), 2);
        assert_eq!(store.methods[1].position, Position::new(4, 1));
    }

    #[test]
    fn embedded_interfaces_are_skipped_quietly() {
        let text = "type ReadCloser interface {\n\tio.Reader\n\tClose() error\n\tBroken(\n}\n";
        let analysis = GoAnalyzer::new().analyze(Path::new("rc.go"), text);
        let methods = &analysis.interfaces[0].methods;
        assert_eq!(methods.len(), 1);
        assert_eq!(methods[0].name, "Close");
        assert_eq!(analysis.diagnostics.len(), 1);
        assert_eq!(analysis.diagnostics[0].kind, DiagnosticKind::UnparseableDeclaration);
        assert_eq!(analysis.diagnostics[0].file.as_deref(), Some(Path::new("rc.go")));
    }

    #[test]
    fn interface_body_allows_empty_interface_params() {
        let text = "type Encoder interface {\n\tEncode(v interface{}) ([]byte, error)\n}\n";
        let analysis = GoAnalyzer::new().analyze(Path::new("enc.go"), text);
        let method = &analysis.interfaces[0].methods[0];
        assert_eq!(method.name, "Encode");
        assert_eq!(method.params[0].param_type, "interface{}");
    }

    #[test]
    fn struct_range_covers_nested_braces() {
        let text = "type Server struct {\n\tcfg struct {\n\t\tport int\n\t}\n\tname string\n}\n\nfunc (s *Server) Start() error { return nil }\nfunc (Server) Name() string { return \"\" }\nfunc (s *MyServer) Other() {}\n";
        let analysis = GoAnalyzer::new().analyze(Path::new("server.go"), text);
        let server = &analysis.structs[0];
        assert_eq!(server.range.end, Position::new(5, 1));
        let names: Vec<_> = server.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["Start", "Name"]);
        assert_eq!(server.methods[0].signature, "Start() error");
        assert_eq!(server.methods[0].position, Position::new(7, 17));
    }

    #[test]
    fn unterminated_struct_is_reported() {
        let analysis = GoAnalyzer::new().analyze(Path::new("x.go"), "type Broken struct {\n\tx int\n");
        assert!(analysis.structs.is_empty());
        assert_eq!(analysis.diagnostics[0].kind, DiagnosticKind::UnterminatedBlock);
    }
}
