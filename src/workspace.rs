use crate::cache::AnalysisCache;
use crate::config::Config;
use crate::diagnostics::Extracted;
use crate::error::{Result, SchemaError, WorkspaceError};
use crate::golang::{MatchMode, SignatureMatcher};
use crate::model::{
    CacheStats, FileAnalysis, GoInterface, GoStruct, Implementation, MessageInfo, ProtoMethod,
    ProtoService, RequestTemplate, UrlInfo,
};
use crate::proto::schema::SchemaLoader;
use crate::proto::{ProtoParser, template, url};
use crate::scan::{self, PathFilter, ScanOptions, ScannedFile};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

pub type SharedCache = Arc<Mutex<AnalysisCache>>;

pub fn shared_cache(max_size: usize) -> SharedCache {
    Arc::new(Mutex::new(AnalysisCache::new(max_size)))
}

/// A file change reported by the host or the watcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum FileEvent {
    Created(PathBuf),
    Changed(PathBuf),
    Deleted(PathBuf),
}

impl FileEvent {
    pub fn path(&self) -> &Path {
        match self {
            Self::Created(path) | Self::Changed(path) | Self::Deleted(path) => path,
        }
    }

    /// Same kind of event for another path.
    pub fn with_path(&self, path: PathBuf) -> Self {
        match self {
            Self::Created(_) => Self::Created(path),
            Self::Changed(_) => Self::Changed(path),
            Self::Deleted(_) => Self::Deleted(path),
        }
    }
}

/// Entry point for hosts: scanning, parsing and implementation lookups over
/// a set of workspace roots.
pub struct Workspace {
    roots: Vec<PathBuf>,
    config: Config,
    parser: ProtoParser,
    matcher: SignatureMatcher,
    cache: SharedCache,
    proto_filter: PathFilter,
    go_filter: PathFilter,
}

impl Workspace {
    pub fn new(roots: Vec<PathBuf>, config: Config) -> Result<Self> {
        let cache = shared_cache(config.max_cache_size);
        Self::with_cache(roots, config, cache)
    }

    pub fn with_cache(roots: Vec<PathBuf>, config: Config, cache: SharedCache) -> Result<Self> {
        if roots.is_empty() {
            return Err(WorkspaceError::NoRoots);
        }
        if let Some(missing) = roots.iter().find(|root| !root.is_dir()) {
            return Err(WorkspaceError::RootNotFound(missing.clone()));
        }
        let proto_filter = PathFilter::new(&config.proto_include, &config.exclude)?;
        let go_filter = PathFilter::new(&config.go_include, &config.exclude)?;
        let parser = ProtoParser::new(SchemaLoader::new(roots.clone(), config.import_paths.clone()));
        let mode = if config.strict_signatures {
            MatchMode::Strict
        } else {
            MatchMode::Arity
        };
        Ok(Self {
            roots,
            parser,
            matcher: SignatureMatcher::new(mode),
            cache,
            proto_filter,
            go_filter,
            config,
        })
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn matcher(&self) -> SignatureMatcher {
        self.matcher
    }

    /// `path` as given when absolute, otherwise relative to the first root.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            return path.to_path_buf();
        }
        match self.roots.first() {
            Some(root) => root.join(path),
            None => path.to_path_buf(),
        }
    }

    fn scan_options(&self) -> ScanOptions {
        ScanOptions::new(self.config.no_ignore)
    }

    fn scan(&self, filter: &PathFilter) -> Result<Vec<ScannedFile>> {
        let mut files = Vec::new();
        for root in &self.roots {
            files.extend(scan::scan_root(root, filter, self.scan_options())?);
        }
        Ok(files)
    }

    pub fn scan_proto_files(&self) -> Result<Vec<PathBuf>> {
        let files = self.scan(&self.proto_filter)?;
        tracing::debug!(count = files.len(), "proto files found");
        Ok(files.into_iter().map(|file| file.abs_path).collect())
    }

    pub fn scan_go_files(&self) -> Result<Vec<ScannedFile>> {
        self.scan(&self.go_filter)
    }

    pub fn parse_proto_file(&self, path: &Path) -> Result<Extracted<ProtoService>> {
        self.parser.parse_file(path)
    }

    /// Every service in the workspace, filtered and sorted. Unreadable files
    /// are reported as diagnostics and do not stop the batch.
    pub fn scan_and_parse_all_proto_files(&self) -> Result<Extracted<ProtoService>> {
        let files = self.scan_proto_files()?;
        let mut all = Extracted::new();
        for path in &files {
            match self.parser.parse_file(path) {
                Ok(found) => all.extend(found),
                Err(err) => {
                    tracing::warn!(file = %path.display(), error = %err, "proto file skipped");
                    all.report(crate::proto::read_failure(path, &err));
                }
            }
        }
        let parsed = all.items.len();
        all.items = crate::proto::filter_services(all.items);
        tracing::info!(
            files = files.len(),
            parsed,
            kept = all.items.len(),
            "proto services collected"
        );
        Ok(all)
    }

    /// Looks a service up by full name, falling back to the short name.
    pub fn find_service(&self, name: &str) -> Result<ProtoService> {
        let mut services = self.scan_and_parse_all_proto_files()?.items;
        let by_full = services.iter().position(|service| service.full_name == name);
        let index = by_full.or_else(|| services.iter().position(|service| service.name == name));
        match index {
            Some(index) => Ok(services.swap_remove(index)),
            None => Err(WorkspaceError::ServiceNotFound(name.to_string())),
        }
    }

    pub fn find_method(&self, service: &str, method: &str) -> Result<(ProtoService, ProtoMethod)> {
        let service = self.find_service(service)?;
        let found = service.method(method).cloned();
        match found {
            Some(found) => Ok((service, found)),
            None => Err(WorkspaceError::MethodNotFound {
                service: service.full_name,
                method: method.to_string(),
            }),
        }
    }

    /// Analysis of in-memory text (an editor buffer) for `path`.
    pub fn analyze_file(&self, path: &Path, text: &str) -> Arc<FileAnalysis> {
        let modified = std::fs::metadata(path)
            .map(|metadata| crate::util::modified_millis(&metadata))
            .unwrap_or_else(|_| now_millis());
        lock(&self.cache).get_file_info(path, text, modified)
    }

    pub fn analyze_path(&self, path: &Path) -> Result<Arc<FileAnalysis>> {
        let metadata = std::fs::metadata(path).map_err(|err| WorkspaceError::read(path, err))?;
        self.analyze_modified(path, crate::util::modified_millis(&metadata))
    }

    /// Analysis of `path` as of `modified`, read from disk only on a miss.
    fn analyze_modified(&self, path: &Path, modified: u64) -> Result<Arc<FileAnalysis>> {
        if let Some(hit) = lock(&self.cache).fresh(path, modified) {
            return Ok(hit);
        }
        let text = std::fs::read_to_string(path).map_err(|err| WorkspaceError::read(path, err))?;
        Ok(lock(&self.cache).get_file_info(path, &text, modified))
    }

    /// Interfaces and structs of every Go file. Files that cannot be read are
    /// logged and skipped.
    pub fn go_declarations(&self) -> Result<(Vec<GoInterface>, Vec<GoStruct>)> {
        let files = self.scan_go_files()?;
        let mut interfaces = Vec::new();
        let mut structs = Vec::new();
        for file in &files {
            match self.analyze_modified(&file.abs_path, file.modified) {
                Ok(analysis) => {
                    interfaces.extend(analysis.interfaces.iter().cloned());
                    structs.extend(analysis.structs.iter().cloned());
                }
                Err(err) => {
                    tracing::warn!(file = %file.abs_path.display(), error = %err, "go file skipped");
                }
            }
        }
        tracing::debug!(
            files = files.len(),
            interfaces = interfaces.len(),
            structs = structs.len(),
            "go declarations collected"
        );
        Ok((interfaces, structs))
    }

    /// Implementations across every Go file of the workspace.
    pub fn get_all_implementations(&self) -> Result<Vec<Implementation>> {
        let (interfaces, structs) = self.go_declarations()?;
        let implementations = self.matcher.find_implementations(&interfaces, &structs);
        tracing::info!(
            interfaces = interfaces.len(),
            structs = structs.len(),
            implementations = implementations.len(),
            "implementations collected"
        );
        Ok(implementations)
    }

    /// File events only invalidate; the next request re-analyzes. Returns
    /// whether a cached analysis was dropped.
    pub fn handle_file_event(&self, event: &FileEvent) -> bool {
        let removed = lock(&self.cache).invalidate(event.path());
        tracing::debug!(event = ?event, removed, "file event");
        removed
    }

    pub fn clear_cache(&self) {
        lock(&self.cache).clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        lock(&self.cache).stats()
    }

    /// The request message of `method`, from the parse result when the schema
    /// layer already attached it, otherwise compiled from the service's file.
    /// `None` when the file does not compile or the schema does not know
    /// the type.
    pub fn request_message(
        &self,
        service: &ProtoService,
        method: &ProtoMethod,
    ) -> Result<Option<MessageInfo>> {
        if let Some(message) = &method.request_message {
            return Ok(Some(message.clone()));
        }
        let compiled = match self.parser.schema().compile(&service.file_path) {
            Ok(compiled) => compiled,
            Err(err @ (SchemaError::Compile { .. } | SchemaError::MissingFile(_))) => {
                tracing::warn!(
                    file = %service.file_path.display(),
                    type_name = %method.request_type,
                    error = %err,
                    "schema unavailable, request left unresolved"
                );
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        match compiled.message_info(&method.request_type) {
            Ok(message) => Ok(Some(message)),
            Err(SchemaError::UnknownType(name)) => {
                tracing::debug!(type_name = %name, "request type not in schema");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Flat request example, resolving the request message when needed.
    pub fn request_example(&self, service: &ProtoService, method: &ProtoMethod) -> Result<Value> {
        let message = self.request_message(service, method)?;
        let resolved = ProtoMethod {
            request_message: message,
            ..method.clone()
        };
        Ok(template::generate_request_example(&resolved))
    }

    /// Nested request structure for `method`, resolved through the compiled
    /// schema of the service's file.
    pub fn request_template(
        &self,
        service: &ProtoService,
        method: &ProtoMethod,
    ) -> Result<RequestTemplate> {
        match self.request_message(service, method)? {
            Some(message) => Ok(template::generate_request_template(method, &message)),
            None => Ok(template::unresolved_request_template(method)),
        }
    }

    pub fn url_info(&self, service: &ProtoService, method: &ProtoMethod, host: Option<&str>) -> UrlInfo {
        let host = host.unwrap_or(&self.config.default_host);
        url::generate_url_info(service, method, host)
    }
}

fn lock(cache: &SharedCache) -> MutexGuard<'_, AnalysisCache> {
    cache.lock().unwrap_or_else(PoisonError::into_inner)
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
