use crate::error::{Result, WorkspaceError};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use serde::Serialize;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize)]
pub struct ScannedFile {
    pub rel_path: String,
    pub abs_path: PathBuf,
    pub modified: u64,
    pub language: String,
}

#[derive(Debug, Clone)]
pub struct LanguageSpec {
    pub name: &'static str,
    pub extensions: &'static [&'static str],
}

static LANGUAGE_SPECS: &[LanguageSpec] = &[
    LanguageSpec {
        name: "proto",
        extensions: &["proto"],
    },
    LanguageSpec {
        name: "go",
        extensions: &["go"],
    },
];

/// Compiled include/exclude globs, matched against root-relative `/` paths.
#[derive(Debug, Clone)]
pub struct PathFilter {
    include: GlobSet,
    exclude: GlobSet,
}

impl PathFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            include: build_globset(include)?,
            exclude: build_globset(exclude)?,
        })
    }

    pub fn matches(&self, rel_path: &str) -> bool {
        self.include.is_match(rel_path) && !self.exclude.is_match(rel_path)
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|source| WorkspaceError::Glob {
            pattern: pattern.clone(),
            source,
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| WorkspaceError::Glob {
        pattern: patterns.join(","),
        source,
    })
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOptions {
    pub no_ignore: bool,
}

impl ScanOptions {
    pub fn new(no_ignore: bool) -> Self {
        Self { no_ignore }
    }
}

/// Files under `root` accepted by `filter`, sorted by relative path.
pub fn scan_root(root: &Path, filter: &PathFilter, options: ScanOptions) -> Result<Vec<ScannedFile>> {
    if !root.is_dir() {
        return Err(WorkspaceError::RootNotFound(root.to_path_buf()));
    }
    let mut files = Vec::new();
    let mut builder = WalkBuilder::new(root);
    if options.no_ignore {
        builder
            .ignore(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .parents(false);
    } else {
        builder
            .ignore(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .parents(true)
            .require_git(false);
    }
    let walker = builder
        .hidden(false)
        .filter_entry(|entry| !is_ignored_entry(entry))
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(error = %err, "walk error");
                continue;
            }
        };
        if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }
        let path = entry.path();
        let Some(language) = detect_language(path) else {
            continue;
        };
        let Ok(rel_path) = crate::util::normalize_rel_path(root, path) else {
            continue;
        };
        if !filter.matches(&rel_path) {
            continue;
        }
        let modified = match fs::metadata(path) {
            Ok(metadata) => crate::util::modified_millis(&metadata),
            Err(err) => {
                tracing::warn!(file = %path.display(), error = %err, "stat failed");
                continue;
            }
        };
        files.push(ScannedFile {
            rel_path,
            abs_path: path.to_path_buf(),
            modified,
            language: language.to_string(),
        });
    }
    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    tracing::debug!(root = %root.display(), files = files.len(), "scan finished");
    Ok(files)
}

fn is_ignored_entry(entry: &ignore::DirEntry) -> bool {
    entry.file_name() == OsStr::new(".git")
}

fn detect_language(path: &Path) -> Option<&'static str> {
    let ext = path.extension().and_then(|ext| ext.to_str())?;
    LANGUAGE_SPECS
        .iter()
        .find(|spec| spec.extensions.contains(&ext))
        .map(|spec| spec.name)
}

pub fn language_for_path(path: &Path) -> Option<&'static str> {
    detect_language(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, text: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn filter_applies_include_then_exclude() {
        let filter =
            PathFilter::new(&strings(&["**/*.proto"]), &strings(&["**/vendor/**"])).unwrap();
        assert!(filter.matches("api/v1/a.proto"));
        assert!(filter.matches("a.proto"));
        assert!(!filter.matches("vendor/x/a.proto"));
        assert!(!filter.matches("api/v1/a.go"));
    }

    #[test]
    fn bad_glob_is_reported() {
        let err = PathFilter::new(&strings(&["a/[b"]), &[]).unwrap_err();
        assert!(matches!(err, WorkspaceError::Glob { .. }));
    }

    #[test]
    fn missing_root_is_an_error() {
        let filter = PathFilter::new(&strings(&["**/*.go"]), &[]).unwrap();
        let err = scan_root(Path::new("/definitely/not/here"), &filter, ScanOptions::default())
            .unwrap_err();
        assert!(matches!(err, WorkspaceError::RootNotFound(_)));
    }

    #[test]
    fn scan_honours_gitignore_unless_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, ".gitignore", "gen/\n");
        write(root, "api/v1/a.proto", "");
        write(root, "gen/b.proto", "");
        write(root, "vendor/c.proto", "");
        write(root, "main.go", "");
        let filter =
            PathFilter::new(&strings(&["**/*.proto"]), &strings(&["**/vendor/**"])).unwrap();

        let files = scan_root(root, &filter, ScanOptions::default()).unwrap();
        let rels: Vec<_> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(rels, ["api/v1/a.proto"]);
        assert_eq!(files[0].language, "proto");

        let files = scan_root(root, &filter, ScanOptions::new(true)).unwrap();
        let rels: Vec<_> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(rels, ["api/v1/a.proto", "gen/b.proto"]);
    }
}
