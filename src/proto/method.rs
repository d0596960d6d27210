use crate::diagnostics::{Diagnostic, DiagnosticKind, Extracted, ParseOutcome};
use crate::model::{HttpMethod, ProtoMethod};
use regex::Regex;
use std::sync::LazyLock;

pub const HTTP_OPTION_MARKER: &str = "(google.api.http)";

static RPC_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\brpc\s+(\w+)").expect("rpc name regex"));
static HTTP_VERB_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(get|post|put|delete|patch)\s*:\s*"([^"]+)""#).expect("http verb regex")
});
static HTTP_BODY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bbody\s*:\s*"([^"]+)""#).expect("http body regex"));
static STRICT_REQUEST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\A\s*rpc\s+\w+\s*\(\s*([.\w]+)\s*\)").expect("strict request regex")
});
static LOOSE_REQUEST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(([^)]+)\)").expect("loose request regex"));
static STRICT_RESPONSE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\breturns\s*\(\s*([.\w]+)\s*\)").expect("strict response regex")
});
static LOOSE_RESPONSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\breturns\s*\(([^)]+)\)").expect("loose response regex"));

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpBinding {
    pub method: Option<HttpMethod>,
    pub path: Option<String>,
    pub body: Option<String>,
    pub has_option: bool,
}

/// Extracts every RPC declared in a service body, in textual order.
///
/// Each method's text runs from its `rpc` keyword to the next one (or the end
/// of the body). Methods whose request or response type cannot be resolved
/// are dropped and reported.
pub fn extract_methods(service_name: &str, body: &str) -> Extracted<ProtoMethod> {
    let mut out = Extracted::new();
    let starts: Vec<(String, usize)> = RPC_NAME_RE
        .captures_iter(body)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(1)?;
            Some((name.as_str().to_string(), whole.start()))
        })
        .collect();
    tracing::debug!(service = service_name, count = starts.len(), "rpc declarations");

    for (idx, (name, start)) in starts.iter().enumerate() {
        let end = starts
            .get(idx + 1)
            .map(|(_, next)| *next)
            .unwrap_or(body.len());
        let text = body[*start..end].trim();
        match parse_method(service_name, name, text) {
            ParseOutcome::Success(method) => out.push(method),
            ParseOutcome::Fallback(diagnostics) => {
                for diagnostic in diagnostics {
                    out.report(diagnostic);
                }
            }
            ParseOutcome::Failure(diagnostic) => out.report(diagnostic),
        }
    }
    out
}

/// Parses one `rpc` span. Both types must resolve, by the strict or the
/// loose pattern, for the method to be kept.
pub fn parse_method(service_name: &str, method_name: &str, text: &str) -> ParseOutcome<ProtoMethod> {
    let binding = http_binding(text);
    let request = capture_type(&STRICT_REQUEST_RE, &LOOSE_REQUEST_RE, text);
    let response = capture_type(&STRICT_RESPONSE_RE, &LOOSE_RESPONSE_RE, text);
    let subject = format!("{service_name}.{method_name}");

    let (request, response) = match (request, response) {
        (Some(request), Some(response)) => (request, response),
        (request, response) => {
            let missing = match (request.is_some(), response.is_some()) {
                (false, false) => "request and response types",
                (false, true) => "request type",
                _ => "response type",
            };
            return ParseOutcome::Failure(Diagnostic::new(
                DiagnosticKind::UnparseableMethod,
                subject,
                format!("could not resolve {missing}"),
            ));
        }
    };

    let (request_type, client_streaming) = split_stream(&request);
    let (response_type, server_streaming) = split_stream(&response);
    if request_type.is_empty() || response_type.is_empty() {
        return ParseOutcome::Failure(Diagnostic::new(
            DiagnosticKind::UnparseableMethod,
            subject,
            "empty request or response type",
        ));
    }

    ParseOutcome::Success(ProtoMethod {
        name: method_name.to_string(),
        request_type,
        response_type,
        client_streaming,
        server_streaming,
        request_message: None,
        response_message: None,
        http_method: binding.method,
        http_path: binding.path,
        http_body: binding.body,
        has_http_option: binding.has_option,
    })
}

/// HTTP transcoding details from a `(google.api.http)` option in `text`.
pub fn http_binding(text: &str) -> HttpBinding {
    let mut binding = HttpBinding {
        has_option: text.contains(HTTP_OPTION_MARKER),
        ..Default::default()
    };
    if !binding.has_option {
        return binding;
    }
    let Some(caps) = HTTP_VERB_RE.captures(text) else {
        return binding;
    };
    let method = caps.get(1).and_then(|m| HttpMethod::parse(m.as_str()));
    binding.path = caps.get(2).map(|m| m.as_str().to_string());
    binding.method = method;
    binding.body = HTTP_BODY_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());
    if binding.body.is_none() && method.is_some_and(HttpMethod::carries_body) {
        binding.body = Some("*".to_string());
    }
    binding
}

fn capture_type(strict: &Regex, loose: &Regex, text: &str) -> Option<String> {
    let strict_match = strict
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());
    if strict_match.is_some() {
        return strict_match;
    }
    loose
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|value| !value.is_empty())
}

fn split_stream(raw: &str) -> (String, bool) {
    let trimmed = raw.trim();
    match trimmed.strip_prefix("stream") {
        Some(rest) if rest.starts_with(char::is_whitespace) => (rest.trim().to_string(), true),
        _ => (trimmed.to_string(), false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_method() {
        let out = extract_methods("Foo", " rpc Bar(ReqT) returns (ResT); ");
        assert_eq!(out.items.len(), 1);
        let method = &out.items[0];
        assert_eq!(method.name, "Bar");
        assert_eq!(method.request_type, "ReqT");
        assert_eq!(method.response_type, "ResT");
        assert!(!method.has_http_option);
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn loose_pass_recovers_odd_spacing() {
        let text = "rpc Odd( pkg.v1.Req /* why */ ) returns ( Res );";
        let ParseOutcome::Success(method) = parse_method("S", "Odd", text) else {
            panic!("expected loose match");
        };
        assert_eq!(method.request_type, "pkg.v1.Req /* why */");
        assert_eq!(method.response_type, "Res");
    }

    #[test]
    fn streaming_prefix_becomes_flag() {
        let text = "rpc Chat(stream ChatIn) returns (stream ChatOut) {}";
        let method = parse_method("S", "Chat", text).success().unwrap();
        assert_eq!(method.request_type, "ChatIn");
        assert_eq!(method.response_type, "ChatOut");
        assert!(method.client_streaming);
        assert!(method.server_streaming);
    }

    #[test]
    fn method_without_response_is_dropped() {
        let body = "rpc Good(A) returns (B);\n rpc Broken(A) returns;\n";
        let out = extract_methods("S", body);
        assert_eq!(out.items.len(), 1);
        assert_eq!(out.items[0].name, "Good");
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].kind, DiagnosticKind::UnparseableMethod);
        assert_eq!(out.diagnostics[0].subject, "S.Broken");
    }

    #[test]
    fn http_binding_defaults_body_for_post() {
        let text = r#"rpc Create(A) returns (B) {
            option (google.api.http) = { post: "/v1/items" };
        }"#;
        let binding = http_binding(text);
        assert!(binding.has_option);
        assert_eq!(binding.method, Some(HttpMethod::Post));
        assert_eq!(binding.path.as_deref(), Some("/v1/items"));
        assert_eq!(binding.body.as_deref(), Some("*"));
    }

    #[test]
    fn http_binding_keeps_explicit_body() {
        let text = r#"option (google.api.http) = { PUT: "/v1/items/{id}" body: "item" };"#;
        let binding = http_binding(text);
        assert_eq!(binding.method, Some(HttpMethod::Put));
        assert_eq!(binding.body.as_deref(), Some("item"));
    }

    #[test]
    fn http_verb_ignored_without_option_marker() {
        let binding = http_binding(r#"rpc A(B) returns (C); // get: "/nope""#);
        assert_eq!(binding, HttpBinding::default());
    }
}
