use crate::diagnostics::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Inclusive at both ends, like an editor cursor test.
    pub fn contains(&self, position: Position) -> bool {
        self.start <= position && position <= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "get" => Some(Self::Get),
            "post" => Some(Self::Post),
            "put" => Some(Self::Put),
            "delete" => Some(Self::Delete),
            "patch" => Some(Self::Patch),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Post => "post",
            Self::Put => "put",
            Self::Delete => "delete",
            Self::Patch => "patch",
        }
    }

    /// Verbs whose body defaults to `"*"` when the binding names none.
    pub fn carries_body(self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtoMethod {
    pub name: String,
    pub request_type: String,
    pub response_type: String,
    #[serde(default)]
    pub client_streaming: bool,
    #[serde(default)]
    pub server_streaming: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_message: Option<MessageInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_message: Option<MessageInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_method: Option<HttpMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_body: Option<String>,
    #[serde(default)]
    pub has_http_option: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtoService {
    pub name: String,
    pub full_name: String,
    pub file_path: PathBuf,
    pub methods: Vec<ProtoMethod>,
}

impl ProtoService {
    pub fn method(&self, name: &str) -> Option<&ProtoMethod> {
        self.methods.iter().find(|method| method.name == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub is_map: bool,
    #[serde(default)]
    pub is_repeated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nested_fields: Option<Vec<MessageField>>,
    #[serde(default)]
    pub is_optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl MessageField {
    pub fn scalar(name: &str, field_type: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type: field_type.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageInfo {
    pub name: String,
    pub fields: Vec<MessageField>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestTemplate {
    pub structure: Value,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UrlInfo {
    pub grpc_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_url_template: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub http_path_params: Vec<String>,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoParam {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoMethod {
    pub name: String,
    pub signature: String,
    pub params: Vec<GoParam>,
    pub returns: Vec<GoParam>,
    pub position: Position,
    pub range: Range,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoInterface {
    pub name: String,
    pub methods: Vec<GoMethod>,
    pub position: Position,
    pub range: Range,
    pub file_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoStruct {
    pub name: String,
    pub methods: Vec<GoMethod>,
    pub position: Position,
    pub range: Range,
    pub file_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodMapping {
    pub interface_method: GoMethod,
    pub struct_method: GoMethod,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Implementation {
    pub interface_name: String,
    pub struct_name: String,
    pub interface_file: PathBuf,
    pub struct_file: PathBuf,
    pub method_mappings: Vec<MethodMapping>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FileAnalysis {
    pub interfaces: Vec<GoInterface>,
    pub structs: Vec<GoStruct>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub interfaces: usize,
    pub structs: usize,
    pub max_size: usize,
}
