use crate::golang::matcher;
use crate::model::{FileAnalysis, Position};
use crate::proto::url;
use crate::watch;
use crate::workspace::{FileEvent, Workspace};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

const SLOW_REQUEST_MS: u128 = 100;

const METHOD_DOCS: &[(&str, &str)] = &[
    ("help", "Describe the available methods."),
    ("scan_proto_files", "Proto files under the roots after include/exclude filtering."),
    ("parse_proto_file", "Services of one proto file: {path}."),
    ("list_services", "Every service of the workspace, filtered and sorted."),
    ("analyze_file", "Interfaces and structs of one Go file: {path, text?}."),
    ("implementations", "Every interface/struct implementation in the workspace."),
    ("interface_method_at", "Interface method under a cursor and its implementations: {path, line, column, text?}."),
    ("struct_method_at", "Struct method under a cursor and the interfaces it satisfies: {path, line, column, text?}."),
    ("implementations_for", "Struct methods implementing an interface method: {interface, method}."),
    ("interfaces_for", "Interface methods a struct method implements: {struct, method}."),
    ("missing_methods", "Interface methods a struct lacks: {interface, struct}."),
    ("request_example", "Flat example request body: {service, method}."),
    ("request_template", "Nested request template: {service, method}."),
    ("url_info", "gRPC and HTTP URLs of a method: {service, method, host?}."),
    ("file_changed", "Invalidate a cached analysis: {kind: created|changed|deleted, path}."),
    ("clear_cache", "Drop every cached analysis."),
    ("cache_stats", "Analysis cache counters."),
];

#[derive(Deserialize)]
struct RpcRequest {
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Serialize)]
struct RpcResponse {
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

#[derive(Serialize)]
struct RpcError {
    message: String,
}

#[derive(Deserialize)]
struct PathParams {
    path: PathBuf,
}

#[derive(Deserialize)]
struct AnalyzeParams {
    path: PathBuf,
    /// Unsaved buffer contents; the file on disk is read when absent.
    text: Option<String>,
}

#[derive(Deserialize)]
struct CursorParams {
    path: PathBuf,
    line: u32,
    column: u32,
    text: Option<String>,
}

#[derive(Deserialize)]
struct InterfaceMethodParams {
    interface: String,
    method: String,
}

#[derive(Deserialize)]
struct StructMethodParams {
    #[serde(rename = "struct")]
    struct_name: String,
    method: String,
}

#[derive(Deserialize)]
struct MissingMethodsParams {
    interface: String,
    #[serde(rename = "struct")]
    struct_name: String,
}

#[derive(Deserialize)]
struct MethodParams {
    service: String,
    method: String,
}

#[derive(Deserialize)]
struct UrlParams {
    service: String,
    method: String,
    host: Option<String>,
}

/// Serves JSONL requests from stdin until it closes, one response per line.
pub fn serve(workspace: Workspace, watch_config: watch::WatchConfig) -> Result<()> {
    let workspace = Arc::new(workspace);
    let _watcher = watch::start(Arc::clone(&workspace), watch_config)?;
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(value) => value,
            Err(err) => {
                tracing::error!(error = %err, "stdin error");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_line(&workspace, &line);
        writeln!(stdout, "{}", serde_json::to_string(&response)?)?;
        stdout.flush()?;
    }

    Ok(())
}

/// Runs a single request and returns the serialized response line.
pub fn call(workspace: &Workspace, method: String, params_raw: &str, id_raw: &str) -> Result<String> {
    let params: Value = serde_json::from_str(params_raw).context("parse params JSON")?;
    let id = parse_value(id_raw);
    let response = handle_request(workspace, RpcRequest { id, method, params });
    Ok(serde_json::to_string(&response)?)
}

fn handle_line(workspace: &Workspace, line: &str) -> RpcResponse {
    match serde_json::from_str::<RpcRequest>(line) {
        Ok(request) => handle_request(workspace, request),
        Err(err) => error_response(Value::Null, &format!("invalid request: {err}")),
    }
}

fn handle_request(workspace: &Workspace, req: RpcRequest) -> RpcResponse {
    let id = req.id;
    match handle_method(workspace, &req.method, req.params) {
        Ok(value) => RpcResponse {
            id,
            result: Some(value),
            error: None,
        },
        Err(err) => {
            tracing::debug!(method = %req.method, error = %err, "request failed");
            error_response(id, &format!("{err:#}"))
        }
    }
}

pub fn handle_method(workspace: &Workspace, method: &str, params: Value) -> Result<Value> {
    let start = Instant::now();
    let value = match method {
        "help" => method_help(),
        "scan_proto_files" => json!(workspace.scan_proto_files()?),
        "parse_proto_file" => {
            let params: PathParams = parse_params(params)?;
            let path = workspace.resolve_path(&params.path);
            json!(workspace.parse_proto_file(&path)?)
        }
        "list_services" => json!(workspace.scan_and_parse_all_proto_files()?),
        "analyze_file" => {
            let params: AnalyzeParams = parse_params(params)?;
            json!(*analysis_for(workspace, &params.path, params.text)?)
        }
        "implementations" => json!(workspace.get_all_implementations()?),
        "interface_method_at" => {
            let params: CursorParams = parse_params(params)?;
            let position = Position::new(params.line, params.column);
            let analysis = analysis_for(workspace, &params.path, params.text)?;
            match matcher::find_interface_method_at(position, &analysis.interfaces) {
                Some((interface, found)) => {
                    let implementations = workspace.get_all_implementations()?;
                    let mappings = matcher::implementations_for_interface_method(
                        &interface.name,
                        &found.name,
                        &implementations,
                    );
                    json!({
                        "interface": interface.name,
                        "method": found,
                        "implementations": mappings,
                    })
                }
                None => Value::Null,
            }
        }
        "struct_method_at" => {
            let params: CursorParams = parse_params(params)?;
            let position = Position::new(params.line, params.column);
            let analysis = analysis_for(workspace, &params.path, params.text)?;
            match matcher::find_struct_method_at(position, &analysis.structs) {
                Some((go_struct, found)) => {
                    let implementations = workspace.get_all_implementations()?;
                    let mappings = matcher::interfaces_for_struct_method(
                        &go_struct.name,
                        &found.name,
                        &implementations,
                    );
                    json!({
                        "struct": go_struct.name,
                        "method": found,
                        "interfaces": mappings,
                    })
                }
                None => Value::Null,
            }
        }
        "implementations_for" => {
            let params: InterfaceMethodParams = parse_params(params)?;
            let implementations = workspace.get_all_implementations()?;
            json!(matcher::implementations_for_interface_method(
                &params.interface,
                &params.method,
                &implementations
            ))
        }
        "interfaces_for" => {
            let params: StructMethodParams = parse_params(params)?;
            let implementations = workspace.get_all_implementations()?;
            json!(matcher::interfaces_for_struct_method(
                &params.struct_name,
                &params.method,
                &implementations
            ))
        }
        "missing_methods" => {
            let params: MissingMethodsParams = parse_params(params)?;
            let (interfaces, structs) = workspace.go_declarations()?;
            let interface = interfaces
                .iter()
                .find(|interface| interface.name == params.interface)
                .with_context(|| format!("interface not found: {}", params.interface))?;
            let go_struct = structs
                .iter()
                .find(|go_struct| go_struct.name == params.struct_name)
                .with_context(|| format!("struct not found: {}", params.struct_name))?;
            let missing = workspace.matcher().missing_methods(interface, go_struct);
            json!({
                "interface": interface.name,
                "struct": go_struct.name,
                "complete": missing.is_empty(),
                "missing": missing,
            })
        }
        "request_example" => {
            let params: MethodParams = parse_params(params)?;
            let (service, found) = workspace.find_method(&params.service, &params.method)?;
            workspace.request_example(&service, &found)?
        }
        "request_template" => {
            let params: MethodParams = parse_params(params)?;
            let (service, found) = workspace.find_method(&params.service, &params.method)?;
            json!(workspace.request_template(&service, &found)?)
        }
        "url_info" => {
            let params: UrlParams = parse_params(params)?;
            let host = match params.host.as_deref() {
                Some(raw) => {
                    let host = url::format_host(raw);
                    if !url::validate_host(&host) {
                        anyhow::bail!("invalid host: {raw}");
                    }
                    Some(host)
                }
                None => None,
            };
            let (service, found) = workspace.find_method(&params.service, &params.method)?;
            json!(workspace.url_info(&service, &found, host.as_deref()))
        }
        "file_changed" => {
            let event: FileEvent = parse_params(params)?;
            let event = event.with_path(workspace.resolve_path(event.path()));
            let invalidated = workspace.handle_file_event(&event);
            json!({ "invalidated": invalidated })
        }
        "clear_cache" => {
            workspace.clear_cache();
            json!({ "cleared": true })
        }
        "cache_stats" => json!(workspace.cache_stats()),
        other => anyhow::bail!("unknown method: {other}"),
    };

    let elapsed = start.elapsed();
    if elapsed.as_millis() > SLOW_REQUEST_MS {
        tracing::info!(method, elapsed_ms = elapsed.as_millis() as u64, "slow request");
    }
    Ok(value)
}

fn analysis_for(workspace: &Workspace, path: &Path, text: Option<String>) -> Result<Arc<FileAnalysis>> {
    let path = workspace.resolve_path(path);
    match text {
        Some(text) => Ok(workspace.analyze_file(&path, &text)),
        None => Ok(workspace.analyze_path(&path)?),
    }
}

/// Missing params behave like an empty object.
fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T> {
    let params = if params.is_null() { json!({}) } else { params };
    serde_json::from_value(params).context("invalid params")
}

fn method_help() -> Value {
    let methods: serde_json::Map<String, Value> = METHOD_DOCS
        .iter()
        .map(|(name, doc)| (name.to_string(), json!(doc)))
        .collect();
    json!({
        "summary": "protolens serves proto and Go structure queries as JSONL over stdin/stdout.",
        "request": {"id": "any JSON value", "method": "string", "params": "object"},
        "positions": "line and column are zero-based; columns count characters",
        "methods": methods,
    })
}

fn error_response(id: Value, message: &str) -> RpcResponse {
    RpcResponse {
        id,
        result: None,
        error: Some(RpcError {
            message: message.to_string(),
        }),
    }
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
