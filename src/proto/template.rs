use crate::model::{MessageField, MessageInfo, ProtoMethod, RequestTemplate};
use serde_json::{Map, Value};

const MAP_KEY_EXAMPLE: &str = "key_example";

/// Flat request body: one default per declared field, in declaration order.
/// Nested messages are not expanded; see [`generate_request_template`].
pub fn generate_request_example(method: &ProtoMethod) -> Value {
    let Some(message) = &method.request_message else {
        return Value::Object(Map::new());
    };
    let object = message
        .fields
        .iter()
        .map(|field| {
            let value = if field.is_map {
                Value::Object(Map::new())
            } else if field.is_repeated {
                Value::Array(Vec::new())
            } else {
                scalar_default(&field.field_type)
            };
            (field.name.clone(), value)
        })
        .collect();
    Value::Object(object)
}

/// Full request structure with nested messages expanded, plus a readable
/// field summary.
pub fn generate_request_template(method: &ProtoMethod, message: &MessageInfo) -> RequestTemplate {
    RequestTemplate {
        structure: structure_of(&message.fields),
        description: describe(method, message),
    }
}

/// Template for a request type that could not be resolved.
pub fn unresolved_request_template(method: &ProtoMethod) -> RequestTemplate {
    RequestTemplate {
        structure: Value::Object(Map::new()),
        description: format!("could not resolve request type {}", method.request_type),
    }
}

pub fn format_request_template(template: &RequestTemplate) -> String {
    serde_json::to_string_pretty(&template.structure).unwrap_or_else(|_| "{}".to_string())
}

fn structure_of(fields: &[MessageField]) -> Value {
    let object = fields
        .iter()
        .map(|field| {
            let value = if field.is_map {
                let mut map = Map::new();
                map.insert(MAP_KEY_EXAMPLE.to_string(), field_value(field));
                Value::Object(map)
            } else if field.is_repeated {
                Value::Array(vec![field_value(field)])
            } else {
                field_value(field)
            };
            (field.name.clone(), value)
        })
        .collect();
    Value::Object(object)
}

fn field_value(field: &MessageField) -> Value {
    match &field.nested_fields {
        Some(nested) if !nested.is_empty() => structure_of(nested),
        _ => scalar_default(&field.field_type),
    }
}

fn scalar_default(field_type: &str) -> Value {
    match field_type.to_ascii_lowercase().as_str() {
        "string" | "bytes" => Value::String(String::new()),
        "int32" | "int64" | "uint32" | "uint64" | "sint32" | "sint64" | "fixed32" | "fixed64"
        | "sfixed32" | "sfixed64" | "double" | "float" => Value::from(0),
        "bool" => Value::Bool(false),
        _ => Value::Null,
    }
}

fn describe(method: &ProtoMethod, message: &MessageInfo) -> String {
    let mut lines = vec![
        format!("Request template - {}", method.name),
        format!("Type: {}", method.request_type),
        format!("Fields: {}", message.fields.len()),
        String::new(),
    ];
    for field in &message.fields {
        lines.push(format!("  {}: {}{}", field.name, type_label(field), flags(field)));
        if let Some(description) = &field.description {
            lines.push(format!("    {description}"));
        }
        for nested in field.nested_fields.iter().flatten() {
            lines.push(format!("    - {}: {}{}", nested.name, type_label(nested), flags(nested)));
        }
    }
    lines.push(String::new());
    lines.push("Values are placeholders.".to_string());
    lines.join("\n")
}

fn type_label(field: &MessageField) -> String {
    if field.is_repeated {
        format!("{}[]", field.field_type)
    } else {
        field.field_type.clone()
    }
}

fn flags(field: &MessageField) -> &'static str {
    match (field.is_optional, field.is_map) {
        (true, true) => " (optional, map)",
        (true, false) => " (optional)",
        (false, true) => " (map)",
        (false, false) => "",
    }
}
