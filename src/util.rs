use anyhow::{Context, Result};
use std::fs::Metadata;
use std::path::{Component, Path};

pub fn normalize_rel_path(root: &Path, path: &Path) -> Result<String> {
    let rel = path.strip_prefix(root).with_context(|| {
        format!("strip prefix {} from {}", root.display(), path.display())
    })?;
    Ok(normalize_path(rel))
}

pub fn normalize_path(path: &Path) -> String {
    let mut parts = Vec::new();
    for comp in path.components() {
        match comp {
            Component::Normal(os) => parts.push(os.to_string_lossy().to_string()),
            Component::ParentDir => parts.push("..".to_string()),
            Component::CurDir => {}
            _ => {}
        }
    }
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

/// Modification time in milliseconds since the epoch; 0 when unavailable.
pub fn modified_millis(metadata: &Metadata) -> u64 {
    metadata
        .modified()
        .ok()
        .and_then(|m| m.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_relative_paths() {
        let root = Path::new("/repo");
        let rel = normalize_rel_path(root, Path::new("/repo/api/./v1/a.proto")).unwrap();
        assert_eq!(rel, "api/v1/a.proto");
        assert_eq!(normalize_path(Path::new("")), ".");
        assert!(normalize_rel_path(root, Path::new("/other/a.proto")).is_err());
    }
}
