use crate::model::ProtoService;
use serde::Serialize;
use std::fmt;

/// Infrastructure services every gRPC server exposes; never worth listing.
pub const EXCLUDED_SERVICE_NAMES: &[&str] = &["HTTP", "Health", "Reflection", "ServerReflection", "XDS"];

pub const EXCLUDED_PATH_PATTERNS: &[&str] = &[
    "google/api/http.proto",
    "google/api/annotations.proto",
    "google/api/httpbody.proto",
    "google/protobuf/",
    "google/rpc/",
    "validate/",
    "errors/",
    "common/",
    "health/",
    "status.proto",
    "reflection.proto",
];

pub const EXCLUDED_PACKAGE_PREFIXES: &[&str] =
    &["google.", "grpc.", "envoy.", "validate.", "errors.", "http."];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "rule", content = "pattern", rename_all = "snake_case")]
pub enum ExclusionReason {
    ServiceName(&'static str),
    FilePath(&'static str),
    PackagePrefix(&'static str),
    NoMethods,
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServiceName(name) => write!(f, "excluded service name {name}"),
            Self::FilePath(pattern) => write!(f, "file path matches {pattern}"),
            Self::PackagePrefix(prefix) => write!(f, "package starts with {prefix}"),
            Self::NoMethods => f.write_str("no methods"),
        }
    }
}

/// First rule that excludes `service`, checked in precedence order.
pub fn exclusion_reason(service: &ProtoService) -> Option<ExclusionReason> {
    if let Some(name) = EXCLUDED_SERVICE_NAMES
        .iter()
        .copied()
        .find(|name| *name == service.name)
    {
        return Some(ExclusionReason::ServiceName(name));
    }

    let path = service
        .file_path
        .to_string_lossy()
        .replace('\\', "/")
        .to_lowercase();
    if let Some(pattern) = EXCLUDED_PATH_PATTERNS
        .iter()
        .copied()
        .find(|pattern| path.contains(pattern))
    {
        return Some(ExclusionReason::FilePath(pattern));
    }

    let full_name = service.full_name.to_lowercase();
    if let Some(prefix) = EXCLUDED_PACKAGE_PREFIXES
        .iter()
        .copied()
        .find(|prefix| full_name.starts_with(prefix))
    {
        return Some(ExclusionReason::PackagePrefix(prefix));
    }

    if service.methods.is_empty() {
        return Some(ExclusionReason::NoMethods);
    }
    None
}

/// Drops infrastructure services and sorts the rest by (file path, name).
/// The sort is stable, so equal keys keep their input order.
pub fn filter_services(services: Vec<ProtoService>) -> Vec<ProtoService> {
    let before = services.len();
    let mut kept: Vec<ProtoService> = services
        .into_iter()
        .filter(|service| match exclusion_reason(service) {
            Some(reason) => {
                tracing::debug!(service = %service.full_name, %reason, "service filtered");
                false
            }
            None => true,
        })
        .collect();
    kept.sort_by(|a, b| {
        a.file_path
            .as_os_str()
            .cmp(b.file_path.as_os_str())
            .then_with(|| a.name.cmp(&b.name))
    });
    tracing::debug!(before, after = kept.len(), "services filtered");
    kept
}
