use crate::golang::GoAnalyzer;
use crate::model::{CacheStats, FileAnalysis};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const DEFAULT_MAX_CACHE_SIZE: usize = 1000;

/// Produces the structural analysis the cache memoizes.
pub trait SourceAnalyzer {
    fn analyze(&self, path: &Path, text: &str) -> FileAnalysis;
}

impl SourceAnalyzer for GoAnalyzer {
    fn analyze(&self, path: &Path, text: &str) -> FileAnalysis {
        GoAnalyzer::analyze(self, path, text)
    }
}

impl<T: SourceAnalyzer + ?Sized> SourceAnalyzer for Box<T> {
    fn analyze(&self, path: &Path, text: &str) -> FileAnalysis {
        (**self).analyze(path, text)
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    analysis: Arc<FileAnalysis>,
    /// Modification time the analysis was computed for, ms since the epoch.
    modified: u64,
}

/// Per-path analysis memo keyed on modification time.
pub struct AnalysisCache<A: SourceAnalyzer = GoAnalyzer> {
    analyzer: A,
    entries: HashMap<PathBuf, CacheEntry>,
    max_size: usize,
}

impl AnalysisCache<GoAnalyzer> {
    pub fn new(max_size: usize) -> Self {
        Self::with_analyzer(GoAnalyzer::new(), max_size)
    }
}

impl Default for AnalysisCache<GoAnalyzer> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CACHE_SIZE)
    }
}

impl<A: SourceAnalyzer> AnalysisCache<A> {
    pub fn with_analyzer(analyzer: A, max_size: usize) -> Self {
        Self {
            analyzer,
            entries: HashMap::new(),
            max_size,
        }
    }

    /// Cached analysis when it is at least as new as `modified`, otherwise a
    /// fresh one (stored before returning).
    pub fn get_file_info(&mut self, path: &Path, text: &str, modified: u64) -> Arc<FileAnalysis> {
        if let Some(hit) = self.fresh(path, modified) {
            tracing::trace!(file = %path.display(), "analysis cache hit");
            return hit;
        }

        let analysis = Arc::new(self.analyzer.analyze(path, text));
        self.entries.insert(
            path.to_path_buf(),
            CacheEntry {
                analysis: Arc::clone(&analysis),
                modified,
            },
        );
        self.evict_if_over_capacity();
        analysis
    }

    /// The cached analysis if it was computed for `modified` or later.
    pub fn fresh(&self, path: &Path, modified: u64) -> Option<Arc<FileAnalysis>> {
        self.entries
            .get(path)
            .filter(|entry| entry.modified >= modified)
            .map(|entry| Arc::clone(&entry.analysis))
    }

    pub fn invalidate(&mut self, path: &Path) -> bool {
        self.entries.remove(path).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drops the oldest entries (by modification time, then path) until the
    /// cache fits. Returns how many were removed.
    pub fn evict_if_over_capacity(&mut self) -> usize {
        if self.entries.len() <= self.max_size {
            return 0;
        }
        let excess = self.entries.len() - self.max_size;
        let mut by_age: Vec<(u64, PathBuf)> = self
            .entries
            .iter()
            .map(|(path, entry)| (entry.modified, path.clone()))
            .collect();
        by_age.sort();
        for (_, path) in by_age.into_iter().take(excess) {
            self.entries.remove(&path);
        }
        tracing::debug!(evicted = excess, remaining = self.entries.len(), "analysis cache trimmed");
        excess
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn stats(&self) -> CacheStats {
        let (interfaces, structs) = self.entries.values().fold((0, 0), |(i, s), entry| {
            (i + entry.analysis.interfaces.len(), s + entry.analysis.structs.len())
        });
        CacheStats {
            entries: self.entries.len(),
            interfaces,
            structs,
            max_size: self.max_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "type Greeter interface {\n\tHello() error\n}\n";

    #[test]
    fn reanalyzes_only_when_newer() {
        let mut cache = AnalysisCache::new(10);
        let path = Path::new("greeter.go");
        let first = cache.get_file_info(path, SOURCE, 100);
        let second = cache.get_file_info(path, "", 100);
        assert!(Arc::ptr_eq(&first, &second));
        let third = cache.get_file_info(path, "", 101);
        assert!(third.interfaces.is_empty());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn eviction_breaks_timestamp_ties_by_path() {
        let mut cache = AnalysisCache::new(2);
        cache.get_file_info(Path::new("b.go"), SOURCE, 5);
        cache.get_file_info(Path::new("a.go"), SOURCE, 5);
        cache.get_file_info(Path::new("c.go"), SOURCE, 9);
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(Path::new("a.go")));
        assert!(cache.contains(Path::new("b.go")));
    }

    #[test]
    fn stats_count_declarations() {
        let mut cache = AnalysisCache::default();
        cache.get_file_info(Path::new("g.go"), SOURCE, 1);
        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.interfaces, 1);
        assert_eq!(stats.structs, 0);
        assert_eq!(stats.max_size, DEFAULT_MAX_CACHE_SIZE);
        assert!(cache.invalidate(Path::new("g.go")));
        assert!(cache.is_empty());
    }
}
