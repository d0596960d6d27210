use crate::model::{ProtoMethod, ProtoService, UrlInfo};
use regex::{Captures, Regex};
use std::sync::LazyLock;

pub const DEFAULT_HOST: &str = "localhost:9000";

static PATH_PARAM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^}]+)\}").expect("path param regex"));
static HOST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9.-]+(:[0-9]+)?$").expect("host regex"));

// Checked in order; `uuid` must come before `id`, which it contains.
const PLACEHOLDER_EXAMPLES: &[(&[&str], &str)] = &[
    (&["uuid", "guid"], "550e8400-e29b-41d4-a716-446655440000"),
    (&["id"], "123"),
    (&["name"], "example-name"),
    (&["code"], "ABC123"),
    (&["email"], "user@example.com"),
    (&["phone"], "13800138000"),
    (&["version", "ver"], "v1"),
    (&["type", "category"], "default"),
    (&["status"], "active"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpUrlVariants {
    /// Path placeholders kept, e.g. `http://host/v1/users/{id}`.
    pub template: String,
    /// Placeholders replaced with example values.
    pub example: String,
    pub path_params: Vec<String>,
}

pub fn generate_url_info(service: &ProtoService, method: &ProtoMethod, host: &str) -> UrlInfo {
    let host = format_host(host);
    let service_path = if service.full_name.is_empty() {
        &service.name
    } else {
        &service.full_name
    };
    let grpc_url = format!("grpc://{host}/{service_path}/{}", method.name);

    let variants = if method.has_http_option {
        generate_http_url_variants(method, &host)
    } else {
        None
    };
    let description = describe(service, method, &grpc_url, variants.as_ref());
    match variants {
        Some(variants) => UrlInfo {
            grpc_url,
            http_url: Some(variants.example),
            http_url_template: Some(variants.template),
            http_path_params: variants.path_params,
            description,
        },
        None => UrlInfo {
            grpc_url,
            http_url: None,
            http_url_template: None,
            http_path_params: Vec::new(),
            description,
        },
    }
}

/// `None` when the method has no HTTP path.
pub fn generate_http_url_variants(method: &ProtoMethod, host: &str) -> Option<HttpUrlVariants> {
    let path = method.http_path.as_deref().filter(|path| !path.is_empty())?;
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    Some(HttpUrlVariants {
        template: format!("http://{host}{path}"),
        example: format!("http://{host}{}", substitute_placeholders(&path)),
        path_params: extract_path_params(&path),
    })
}

pub fn extract_path_params(path: &str) -> Vec<String> {
    PATH_PARAM_RE
        .captures_iter(path)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

pub fn substitute_placeholders(path: &str) -> String {
    PATH_PARAM_RE
        .replace_all(path, |caps: &Captures| {
            let name = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            example_value(name)
        })
        .into_owned()
}

/// Example value for a path parameter, chosen by keywords in its name.
pub fn example_value(param: &str) -> String {
    let lower = param.to_lowercase();
    PLACEHOLDER_EXAMPLES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|keyword| lower.contains(keyword)))
        .map(|(_, example)| example.to_string())
        .unwrap_or_else(|| format!("example-{param}"))
}

/// `host` or `host:port`, with an optional http(s) scheme.
pub fn validate_host(host: &str) -> bool {
    let host = host.trim();
    if host.is_empty() {
        return false;
    }
    HOST_RE.is_match(strip_scheme(host))
}

/// Drops the scheme and a trailing slash; empty input yields [`DEFAULT_HOST`].
pub fn format_host(host: &str) -> String {
    let host = host.trim();
    if host.is_empty() {
        return DEFAULT_HOST.to_string();
    }
    let host = strip_scheme(host);
    host.strip_suffix('/').unwrap_or(host).to_string()
}

fn strip_scheme(host: &str) -> &str {
    host.strip_prefix("http://")
        .or_else(|| host.strip_prefix("https://"))
        .unwrap_or(host)
}

fn describe(
    service: &ProtoService,
    method: &ProtoMethod,
    grpc_url: &str,
    variants: Option<&HttpUrlVariants>,
) -> String {
    let mut lines = vec![
        format!("Service: {}", service.name),
        format!("Method: {}", method.name),
        format!("Request: {}", method.request_type),
        format!("Response: {}", method.response_type),
        String::new(),
        format!("gRPC: {grpc_url}"),
    ];
    if let (Some(variants), Some(verb)) = (variants, method.http_method) {
        lines.push(format!("HTTP: {} {}", verb.as_str().to_uppercase(), variants.example));
        if let Some(body) = &method.http_body {
            lines.push(format!("  body: {body}"));
        }
        if !variants.path_params.is_empty() {
            lines.push(format!("  template: {}", variants.template));
            lines.push(format!("  path params: {}", variants.path_params.join(", ")));
        }
    }
    lines.join("\n")
}
