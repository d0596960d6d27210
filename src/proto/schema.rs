use crate::diagnostics::{Diagnostic, DiagnosticKind, Extracted, ParseOutcome};
use crate::error::SchemaError;
use crate::model::{MessageField, MessageInfo, ProtoMethod, ProtoService};
use crate::proto::{method, service};
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{DescriptorProto, FieldDescriptorProto, FileDescriptorProto, FileDescriptorSet};
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

// Descriptor field numbers used in SourceCodeInfo paths.
const FILE_MESSAGE_TYPE: i32 = 4;
const MESSAGE_FIELD: i32 = 2;
const MESSAGE_NESTED_TYPE: i32 = 3;

/// Compiles proto files with `protox`, resolving imports from the usual
/// layout of a Go service repository.
#[derive(Debug, Clone, Default)]
pub struct SchemaLoader {
    roots: Vec<PathBuf>,
    import_paths: Vec<PathBuf>,
}

impl SchemaLoader {
    pub fn new(roots: Vec<PathBuf>, import_paths: Vec<PathBuf>) -> Self {
        Self {
            roots,
            import_paths,
        }
    }

    /// Include directories for `file`, in lookup order. Only existing
    /// directories are returned, without duplicates.
    pub fn include_paths_for(&self, file: &Path) -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        if let Some(dir) = file.parent() {
            candidates.push(dir.to_path_buf());
            // `.../api/foo/v1/x.proto` imports as `api/foo/v1/...` from the module root.
            if let Some(api_parent) = dir
                .ancestors()
                .find(|ancestor| ancestor.file_name().is_some_and(|name| name == "api"))
                .and_then(Path::parent)
            {
                candidates.push(api_parent.to_path_buf());
            }
        }
        for root in &self.roots {
            candidates.push(root.clone());
            candidates.push(root.join("api"));
            candidates.push(root.join("third_party"));
            candidates.push(root.join("third_party").join("googleapis"));
        }
        if let Some(gopath) = gopath() {
            candidates.push(gopath.join("src"));
        }
        candidates.extend(self.import_paths.iter().cloned());

        let mut out: Vec<PathBuf> = Vec::new();
        for candidate in candidates {
            if candidate.is_dir() && !out.contains(&candidate) {
                out.push(candidate);
            }
        }
        out
    }

    pub fn compile(&self, file: &Path) -> Result<CompiledFile, SchemaError> {
        let includes = self.include_paths_for(file);
        tracing::debug!(file = %file.display(), includes = includes.len(), "compiling schema");
        let compile_error = |err: protox::Error| SchemaError::Compile {
            path: file.to_path_buf(),
            message: err.to_string(),
        };
        let mut compiler = protox::Compiler::new(&includes).map_err(compile_error)?;
        compiler.include_imports(true);
        compiler.include_source_info(true);
        compiler.open_file(file).map_err(compile_error)?;
        CompiledFile::new(compiler.file_descriptor_set(), file)
    }
}

fn gopath() -> Option<PathBuf> {
    if let Some(raw) = std::env::var_os("GOPATH") {
        if let Some(first) = std::env::split_paths(&raw).next() {
            return Some(first);
        }
    }
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join("go"))
}

#[derive(Debug, Clone, Copy)]
struct MessageEntry<'a> {
    file: &'a FileDescriptorProto,
    message: &'a DescriptorProto,
}

/// A descriptor set plus the index of the file it was compiled for.
#[derive(Debug, Clone)]
pub struct CompiledFile {
    set: FileDescriptorSet,
    target: usize,
    path: PathBuf,
}

impl CompiledFile {
    fn new(set: FileDescriptorSet, path: &Path) -> Result<Self, SchemaError> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| SchemaError::MissingFile(path.to_path_buf()))?;
        // The file's own directory is the first include, so its descriptor
        // is named by the bare file name. Imports sharing that base name are
        // listed under their import path. The opened file comes last.
        let target = set
            .file
            .iter()
            .position(|file| file.name() == file_name)
            .or_else(|| set.file.len().checked_sub(1))
            .ok_or_else(|| SchemaError::MissingFile(path.to_path_buf()))?;
        Ok(Self {
            set,
            target,
            path: path.to_path_buf(),
        })
    }

    pub fn file(&self) -> &FileDescriptorProto {
        &self.set.file[self.target]
    }

    pub fn package(&self) -> &str {
        self.file().package()
    }

    /// Fully qualified (`.pkg.Msg`) name → descriptor, across every file in the set.
    fn messages(&self) -> HashMap<String, (MessageEntry<'_>, Vec<i32>)> {
        let mut out = HashMap::new();
        for file in &self.set.file {
            let prefix = match file.package() {
                "" => String::new(),
                package => format!(".{package}"),
            };
            for (idx, message) in file.message_type.iter().enumerate() {
                collect_messages(
                    file,
                    message,
                    &prefix,
                    vec![FILE_MESSAGE_TYPE, idx as i32],
                    &mut out,
                );
            }
        }
        out
    }

    /// Field structure of `type_name`, resolved relative to the compiled
    /// file's package. Nested message fields are expanded recursively.
    pub fn message_info(&self, type_name: &str) -> Result<MessageInfo, SchemaError> {
        let messages = self.messages();
        let full_name = self
            .qualify(type_name, &messages)
            .ok_or_else(|| SchemaError::UnknownType(type_name.to_string()))?;
        let mut stack = Vec::new();
        let fields = self.fields_of(&full_name, &messages, &mut stack)?;
        Ok(MessageInfo {
            name: type_name.to_string(),
            fields,
        })
    }

    fn qualify(
        &self,
        type_name: &str,
        messages: &HashMap<String, (MessageEntry<'_>, Vec<i32>)>,
    ) -> Option<String> {
        if type_name.starts_with('.') {
            return messages.contains_key(type_name).then(|| type_name.to_string());
        }
        let package = self.package();
        let mut candidates = Vec::new();
        if !package.is_empty() {
            candidates.push(format!(".{package}.{type_name}"));
        }
        candidates.push(format!(".{type_name}"));
        candidates
            .into_iter()
            .find(|candidate| messages.contains_key(candidate))
    }

    fn fields_of(
        &self,
        full_name: &str,
        messages: &HashMap<String, (MessageEntry<'_>, Vec<i32>)>,
        stack: &mut Vec<String>,
    ) -> Result<Vec<MessageField>, SchemaError> {
        if stack.iter().any(|seen| seen == full_name) {
            return Err(SchemaError::Cycle(full_name.trim_start_matches('.').to_string()));
        }
        let (entry, path) = messages
            .get(full_name)
            .ok_or_else(|| SchemaError::UnknownType(full_name.to_string()))?;
        stack.push(full_name.to_string());

        let mut fields = Vec::with_capacity(entry.message.field.len());
        for (idx, field) in entry.message.field.iter().enumerate() {
            let mut field_path = path.clone();
            field_path.extend([MESSAGE_FIELD, idx as i32]);
            fields.push(self.field_info(entry.file, field, &field_path, messages, stack)?);
        }

        stack.pop();
        Ok(fields)
    }

    fn field_info(
        &self,
        file: &FileDescriptorProto,
        field: &FieldDescriptorProto,
        path: &[i32],
        messages: &HashMap<String, (MessageEntry<'_>, Vec<i32>)>,
        stack: &mut Vec<String>,
    ) -> Result<MessageField, SchemaError> {
        let mut info = MessageField {
            name: field.name().to_string(),
            is_repeated: field.label() == Label::Repeated,
            is_optional: field.proto3_optional()
                || (file.syntax() != "proto3" && field.label() == Label::Optional),
            description: comment_for(file, path),
            ..Default::default()
        };

        // Map fields are repeated synthetic `*Entry` messages; report the value type.
        let value = match map_entry(field, messages) {
            Some(entry) => {
                info.is_map = true;
                info.is_repeated = false;
                entry
                    .message
                    .field
                    .iter()
                    .find(|entry_field| entry_field.number() == 2)
                    .unwrap_or(field)
            }
            None => field,
        };

        info.field_type = self.type_label(value);
        if value.r#type() == Type::Message {
            match self.fields_of(value.type_name(), messages, stack) {
                Ok(nested) if !nested.is_empty() => info.nested_fields = Some(nested),
                Ok(_) => {}
                Err(SchemaError::UnknownType(name)) => {
                    tracing::debug!(field = %info.name, type_name = %name, "nested type not resolved");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(info)
    }

    fn type_label(&self, field: &FieldDescriptorProto) -> String {
        match field.r#type() {
            Type::Message | Type::Enum | Type::Group => {
                short_type_name(field.type_name(), self.package())
            }
            scalar => scalar_name(scalar).to_string(),
        }
    }
}

fn collect_messages<'a>(
    file: &'a FileDescriptorProto,
    message: &'a DescriptorProto,
    prefix: &str,
    path: Vec<i32>,
    out: &mut HashMap<String, (MessageEntry<'a>, Vec<i32>)>,
) {
    let full_name = format!("{prefix}.{}", message.name());
    for (idx, nested) in message.nested_type.iter().enumerate() {
        let mut nested_path = path.clone();
        nested_path.extend([MESSAGE_NESTED_TYPE, idx as i32]);
        collect_messages(file, nested, &full_name, nested_path, out);
    }
    out.insert(full_name, (MessageEntry { file, message }, path));
}

fn map_entry<'a>(
    field: &FieldDescriptorProto,
    messages: &HashMap<String, (MessageEntry<'a>, Vec<i32>)>,
) -> Option<MessageEntry<'a>> {
    if field.label() != Label::Repeated || field.r#type() != Type::Message {
        return None;
    }
    let (entry, _) = messages.get(field.type_name())?;
    entry
        .message
        .options
        .as_ref()
        .is_some_and(|options| options.map_entry())
        .then_some(*entry)
}

fn comment_for(file: &FileDescriptorProto, path: &[i32]) -> Option<String> {
    let info = file.source_code_info.as_ref()?;
    let location = info.location.iter().find(|location| location.path == path)?;
    [&location.leading_comments, &location.trailing_comments]
        .into_iter()
        .filter_map(|comment| comment.as_deref().map(str::trim))
        .find(|comment| !comment.is_empty())
        .map(str::to_string)
}

fn scalar_name(kind: Type) -> &'static str {
    match kind {
        Type::Double => "double",
        Type::Float => "float",
        Type::Int64 => "int64",
        Type::Uint64 => "uint64",
        Type::Int32 => "int32",
        Type::Fixed64 => "fixed64",
        Type::Fixed32 => "fixed32",
        Type::Bool => "bool",
        Type::String => "string",
        Type::Bytes => "bytes",
        Type::Uint32 => "uint32",
        Type::Sfixed32 => "sfixed32",
        Type::Sfixed64 => "sfixed64",
        Type::Sint32 => "sint32",
        Type::Sint64 => "sint64",
        Type::Group | Type::Message | Type::Enum => "message",
    }
}

/// `.pkg.v1.Foo` → `Foo` inside `pkg.v1`, otherwise the name without its leading dot.
pub fn short_type_name(type_name: &str, package: &str) -> String {
    let name = type_name.trim_start_matches('.');
    if !package.is_empty() {
        if let Some(rest) = name
            .strip_prefix(package)
            .and_then(|rest| rest.strip_prefix('.'))
        {
            return rest.to_string();
        }
    }
    name.to_string()
}

/// Schema layer: services of the compiled file. Method text is re-read from
/// the raw source where possible so HTTP bindings survive.
pub fn services_from_schema(
    loader: &SchemaLoader,
    text: &str,
    file_path: &Path,
) -> ParseOutcome<Extracted<ProtoService>> {
    let compiled = match loader.compile(file_path) {
        Ok(compiled) => compiled,
        Err(err) => {
            return ParseOutcome::Failure(
                Diagnostic::new(
                    DiagnosticKind::SchemaFallback,
                    file_path.display().to_string(),
                    err.to_string(),
                )
                .with_file(file_path),
            );
        }
    };

    let package = match compiled.package() {
        "" => service::package_name(text, file_path),
        package => package.to_string(),
    };
    let mut out = Extracted::new();
    for descriptor in &compiled.file().service {
        let name = descriptor.name();
        let mut methods = methods_from_text(name, text);
        out.diagnostics.extend(methods.diagnostics.drain(..));
        if methods.items.is_empty() {
            methods.items = descriptor
                .method
                .iter()
                .map(|method| method_from_descriptor(method, compiled.package(), text))
                .collect();
        }
        for method in &mut methods.items {
            attach_messages(&compiled, name, method, &mut out.diagnostics);
        }
        if methods.items.is_empty() {
            out.report(Diagnostic::new(
                DiagnosticKind::EmptyService,
                name,
                "compiled service has no methods",
            ));
            continue;
        }
        out.push(ProtoService {
            name: name.to_string(),
            full_name: format!("{package}.{name}"),
            file_path: file_path.to_path_buf(),
            methods: methods.items,
        });
    }

    if out.items.is_empty() {
        return ParseOutcome::Fallback(out.diagnostics);
    }
    ParseOutcome::Success(out)
}

// First-level body only: `[^}]*` stops at the first closing brace.
fn methods_from_text(service_name: &str, text: &str) -> Extracted<ProtoMethod> {
    let pattern = format!(r"service\s+{}\s*\{{([^}}]*)\}}", regex::escape(service_name));
    let Ok(re) = Regex::new(&pattern) else {
        return Extracted::new();
    };
    match re.captures(text).and_then(|caps| caps.get(1)) {
        Some(body) => method::extract_methods(service_name, body.as_str()),
        None => Extracted::new(),
    }
}

fn method_from_descriptor(
    descriptor: &prost_types::MethodDescriptorProto,
    package: &str,
    text: &str,
) -> ProtoMethod {
    let name = descriptor.name();
    let pattern = format!(
        r"rpc\s+{}\s*\([^)]*\)\s*returns\s*\([^)]*\)[^;]*",
        regex::escape(name)
    );
    let binding = Regex::new(&pattern)
        .ok()
        .and_then(|re| re.find(text).map(|found| method::http_binding(found.as_str())))
        .unwrap_or_default();
    ProtoMethod {
        name: name.to_string(),
        request_type: short_type_name(descriptor.input_type(), package),
        response_type: short_type_name(descriptor.output_type(), package),
        client_streaming: descriptor.client_streaming(),
        server_streaming: descriptor.server_streaming(),
        http_method: binding.method,
        http_path: binding.path,
        http_body: binding.body,
        has_http_option: binding.has_option,
        ..Default::default()
    }
}

fn attach_messages(
    compiled: &CompiledFile,
    service_name: &str,
    method: &mut ProtoMethod,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let subject = format!("{service_name}.{}", method.name);
    let mut resolve = |type_name: &str| match compiled.message_info(type_name) {
        Ok(info) => Some(info),
        Err(err) => {
            tracing::debug!(subject = %subject, type_name, error = %err, "message not resolved");
            diagnostics.push(
                Diagnostic::new(DiagnosticKind::UnresolvedType, subject.as_str(), err.to_string())
                    .with_file(&compiled.path),
            );
            None
        }
    };
    method.request_message = resolve(&method.request_type);
    method.response_message = resolve(&method.response_type);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_type_name_strips_own_package_only() {
        assert_eq!(short_type_name(".helloworld.v1.HelloRequest", "helloworld.v1"), "HelloRequest");
        assert_eq!(
            short_type_name(".google.protobuf.Empty", "helloworld.v1"),
            "google.protobuf.Empty"
        );
        assert_eq!(short_type_name(".Ping", ""), "Ping");
    }

    #[test]
    fn include_paths_skip_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let proto_dir = root.join("api").join("greeter").join("v1");
        std::fs::create_dir_all(&proto_dir).unwrap();
        std::fs::create_dir_all(root.join("third_party")).unwrap();
        let file = proto_dir.join("greeter.proto");

        let loader = SchemaLoader::new(vec![root.clone()], vec![root.join("nope")]);
        let includes = loader.include_paths_for(&file);
        assert_eq!(includes[0], proto_dir);
        assert!(includes.contains(&root));
        assert!(includes.contains(&root.join("api")));
        assert!(includes.contains(&root.join("third_party")));
        assert!(!includes.contains(&root.join("nope")));
        assert!(!includes.contains(&root.join("third_party").join("googleapis")));
    }
}
