//! Tool descriptors, invocation requests and results.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::Record;

/// Type of a tool parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    /// Non-negative integer
    Integer,
    Boolean,
}

impl ParamType {
    /// JSON Schema type name
    pub fn schema_name(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
        }
    }

    /// Whether a JSON value has this type
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => value.is_u64(),
            ParamType::Boolean => value.is_boolean(),
        }
    }
}

/// A single declared tool parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    pub description: String,
}

impl ParamSpec {
    fn new(name: &str, param_type: ParamType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            param_type,
            required: false,
            default: None,
            description: description.to_string(),
        }
    }

    /// Optional string parameter
    pub fn string(name: &str, description: &str) -> Self {
        Self::new(name, ParamType::String, description)
    }

    /// Optional integer parameter
    pub fn integer(name: &str, description: &str) -> Self {
        Self::new(name, ParamType::Integer, description)
    }

    /// Optional boolean parameter
    pub fn boolean(name: &str, description: &str) -> Self {
        Self::new(name, ParamType::Boolean, description)
    }

    /// Mark the parameter as required
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Set the value used when the caller omits the parameter
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// Describes a tool for capability discovery
///
/// Descriptors are immutable once registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique tool name (e.g., "pubmed_search")
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// Declared parameters, in display order
    pub parameters: Vec<ParamSpec>,
}

impl ToolDescriptor {
    /// Create a new descriptor
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    /// Add a parameter
    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.parameters.push(spec);
        self
    }

    /// Look up a parameter by name
    pub fn parameter(&self, name: &str) -> Option<&ParamSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Render the parameters as a JSON Schema object (for MCP advertising)
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.parameters {
            let mut property = json!({
                "type": param.param_type.schema_name(),
                "description": param.description,
            });
            if param.param_type == ParamType::Integer {
                property["minimum"] = json!(0);
            }
            if let Some(default) = &param.default {
                property["default"] = default.clone();
            }
            properties.insert(param.name.clone(), property);
        }

        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// A request to invoke one tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    /// Tool name
    pub tool: String,

    /// Arguments keyed by parameter name
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolRequest {
    /// Create a request with no arguments
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            arguments: Map::new(),
        }
    }

    /// Add an argument
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }
}

/// Error kinds reported in-band in a [`ToolResult`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "UnknownToolError")]
    UnknownTool,
    #[serde(rename = "InvalidArgumentError")]
    InvalidArgument,
    #[serde(rename = "UpstreamUnavailable")]
    UpstreamUnavailable,
    #[serde(rename = "UpstreamRateLimited")]
    UpstreamRateLimited,
    #[serde(rename = "UpstreamMalformedResponse")]
    UpstreamMalformedResponse,
    /// Wire name only. Adapters report a missing record as an empty success.
    #[serde(rename = "NotFound")]
    NotFound,
}

impl ErrorKind {
    /// Wire name of this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnknownTool => "UnknownToolError",
            ErrorKind::InvalidArgument => "InvalidArgumentError",
            ErrorKind::UpstreamUnavailable => "UpstreamUnavailable",
            ErrorKind::UpstreamRateLimited => "UpstreamRateLimited",
            ErrorKind::UpstreamMalformedResponse => "UpstreamMalformedResponse",
            ErrorKind::NotFound => "NotFound",
        }
    }

    /// Whether the caller must change the request before retrying
    pub fn is_caller_fault(&self) -> bool {
        matches!(self, ErrorKind::UnknownTool | ErrorKind::InvalidArgument)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error carried inside a [`ToolResult`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
}

impl ToolError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after_seconds: None,
        }
    }

    pub fn unknown_tool(name: &str) -> Self {
        Self::new(ErrorKind::UnknownTool, format!("Tool '{}' not found", name))
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn retry_after(mut self, seconds: Option<u64>) -> Self {
        self.retry_after_seconds = seconds;
        self
    }
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Uniform result of a tool invocation
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ToolResult {
    /// Records in the order the upstream API returned them
    pub records: Vec<Record>,

    /// Opaque token for fetching the next page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,

    /// Failure, if any; records are empty when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
}

impl ToolResult {
    /// Successful result
    pub fn success(records: Vec<Record>, cursor: Option<String>) -> Self {
        Self {
            records,
            cursor,
            error: None,
        }
    }

    /// Successful result with no records
    pub fn empty() -> Self {
        Self::default()
    }

    /// Failed result with no records
    pub fn failure(error: ToolError) -> Self {
        Self {
            records: Vec::new(),
            cursor: None,
            error: Some(error),
        }
    }

    /// Whether this result carries an error
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Error kind, if any
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}
