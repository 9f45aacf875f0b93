//! Wire protocol plumbing for tool-provider sessions.
//!
//! Providers speak line-delimited JSON-RPC 2.0 over stdin/stdout: one JSON
//! object per line, requests matched to responses by numeric id. The
//! methods exchanged are `initialize`, `tools/list`, `tools/call` and
//! `shutdown`.
//!
//! Providers disagree about the shape of a `tools/list` result, so all
//! shape sniffing is concentrated in [`normalize_tool_list`]; every other
//! component only ever sees the canonical `Vec<ToolDescriptor>`.

use serde_json::{json, Value};

/// Key under which wrapper-object responses carry their tool array.
const TOOL_LIST_KEY: &str = "tools";

/// A named capability reported by a provider.
///
/// The metadata blob is kept opaque: it is whatever the provider sent for
/// this tool (description, input schema, annotations) and is passed along
/// untouched to upstream callers.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub metadata: Value,
}

/// Build a request line for the given method, params and id.
pub fn request_line(id: u64, method: &str, params: Value) -> String {
    let msg = json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params,
    });
    let mut line = msg.to_string();
    line.push('\n');
    line
}

/// Outcome of splitting a raw response object.
#[derive(Debug, Clone)]
pub enum Response {
    /// The `result` member, possibly `Value::Null` for ack-only replies.
    Result(Value),
    /// The `error` member, verbatim.
    Error(Value),
}

/// Split a raw response into its result or error member.
///
/// A response carrying neither member is treated as an empty result; some
/// providers ack `shutdown` with a bare envelope.
pub fn split_response(mut raw: Value) -> Response {
    if let Some(obj) = raw.as_object_mut() {
        if let Some(err) = obj.remove("error") {
            if !err.is_null() {
                return Response::Error(err);
            }
        }
        if let Some(result) = obj.remove("result") {
            return Response::Result(result);
        }
    }
    Response::Result(Value::Null)
}

/// Why a tool-list result could not be normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnexpectedShape(pub String);

impl std::fmt::Display for UnexpectedShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unexpected tools/list shape: {}", self.0)
    }
}

/// Normalize a `tools/list` result into the canonical tool vector.
///
/// Exactly three shapes are valid, zero-error outcomes:
/// - a bare array of tool objects,
/// - a wrapper object carrying the array under the `"tools"` key,
/// - an empty or absent result (`null`, `{}`, or a wrapper whose array is
///   empty), which yields zero tools.
///
/// Anything else is an [`UnexpectedShape`]; callers treat it as a soft
/// zero-tool outcome without failing the session.
pub fn normalize_tool_list(result: Value) -> Result<Vec<ToolDescriptor>, UnexpectedShape> {
    let items = match result {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove(TOOL_LIST_KEY) {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => return Ok(Vec::new()),
            Some(other) => {
                return Err(UnexpectedShape(format!(
                    "\"tools\" key holds {}",
                    type_name(&other)
                )))
            }
        },
        other => return Err(UnexpectedShape(type_name(&other).to_string())),
    };

    let mut tools = Vec::with_capacity(items.len());
    for item in items {
        let name = item
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| UnexpectedShape("tool entry without a name".to_string()))?
            .to_string();
        tools.push(ToolDescriptor {
            name,
            metadata: item,
        });
    }
    Ok(tools)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_bare_array() {
        let result = json!([
            {"name": "read_file", "description": "Read a file"},
            {"name": "write_file"},
        ]);
        let tools = normalize_tool_list(result).unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "read_file");
        assert_eq!(tools[1].name, "write_file");
    }

    #[test]
    fn test_normalize_wrapper_object() {
        let result = json!({"tools": [{"name": "search"}]});
        let tools = normalize_tool_list(result).unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "search");
    }

    #[test]
    fn test_normalize_empty_wrapper_is_zero_tools() {
        assert!(normalize_tool_list(json!({})).unwrap().is_empty());
        assert!(normalize_tool_list(json!({"tools": []})).unwrap().is_empty());
        assert!(normalize_tool_list(Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_normalize_rejects_scalar() {
        assert!(normalize_tool_list(json!(42)).is_err());
        assert!(normalize_tool_list(json!("tools")).is_err());
        assert!(normalize_tool_list(json!({"tools": "nope"})).is_err());
    }

    #[test]
    fn test_normalize_rejects_nameless_entry() {
        let result = json!([{"description": "anonymous"}]);
        assert!(normalize_tool_list(result).is_err());
    }

    #[test]
    fn test_metadata_kept_verbatim() {
        let entry = json!({"name": "search", "inputSchema": {"type": "object"}});
        let tools = normalize_tool_list(json!([entry.clone()])).unwrap();
        assert_eq!(tools[0].metadata, entry);
    }

    #[test]
    fn test_split_response_error_wins() {
        let raw = json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -1}, "result": {}});
        assert!(matches!(split_response(raw), Response::Error(_)));
    }

    #[test]
    fn test_split_response_bare_envelope_is_empty_result() {
        let raw = json!({"jsonrpc": "2.0", "id": 1});
        match split_response(raw) {
            Response::Result(v) => assert!(v.is_null()),
            Response::Error(_) => panic!("expected result"),
        }
    }
}
