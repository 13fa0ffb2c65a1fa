//! Argument validation against a tool's declared parameters.

use serde_json::{Map, Value};

use crate::models::{ParamType, ToolDescriptor, ToolError};
use crate::sources::SourceError;

/// Tool arguments that passed validation, with defaults applied
///
/// Only declared parameters are kept; extra keys sent by the caller are
/// dropped during validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    values: Map<String, Value>,
}

impl Arguments {
    /// Validate `raw` against `descriptor`
    ///
    /// Missing required parameters, wrong JSON types and blank required
    /// strings are rejected with an `InvalidArgumentError`.
    pub fn validate(descriptor: &ToolDescriptor, raw: &Map<String, Value>) -> Result<Self, ToolError> {
        let mut values = Map::new();

        for param in &descriptor.parameters {
            let supplied = raw.get(&param.name).filter(|v| !v.is_null());

            let Some(value) = supplied else {
                if param.required {
                    return Err(ToolError::invalid_argument(format!(
                        "Missing required parameter '{}'",
                        param.name
                    )));
                }
                if let Some(default) = &param.default {
                    values.insert(param.name.clone(), default.clone());
                }
                continue;
            };

            if !param.param_type.matches(value) {
                let expected = match param.param_type {
                    ParamType::Integer => "a non-negative integer",
                    ParamType::String => "a string",
                    ParamType::Boolean => "a boolean",
                };
                return Err(ToolError::invalid_argument(format!(
                    "Parameter '{}' must be {}",
                    param.name, expected
                )));
            }

            let value = match value {
                Value::String(s) => {
                    let trimmed = s.trim();
                    if trimmed.is_empty() {
                        if param.required {
                            return Err(ToolError::invalid_argument(format!(
                                "Parameter '{}' must not be empty",
                                param.name
                            )));
                        }
                        continue;
                    }
                    Value::String(trimmed.to_string())
                }
                other => other.clone(),
            };

            values.insert(param.name.clone(), value);
        }

        for key in raw.keys() {
            if descriptor.parameter(key).is_none() {
                tracing::debug!(tool = %descriptor.name, "Ignoring unknown parameter '{}'", key);
            }
        }

        Ok(Self { values })
    }

    /// Wrap a map without validation
    pub fn from_map(values: Map<String, Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// String argument, if present
    pub fn str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }

    /// String argument that the descriptor marks as required
    pub fn required_str(&self, name: &str) -> Result<&str, SourceError> {
        self.str(name)
            .ok_or_else(|| SourceError::InvalidRequest(format!("Missing parameter '{}'", name)))
    }

    /// Integer argument, if present
    pub fn u64(&self, name: &str) -> Option<u64> {
        self.values.get(name).and_then(Value::as_u64)
    }

    pub fn u64_or(&self, name: &str, default: u64) -> u64 {
        self.u64(name).unwrap_or(default)
    }

    /// Integer argument as `usize`, saturating on overflow
    pub fn usize_or(&self, name: &str, default: usize) -> usize {
        self.u64(name)
            .map(|n| usize::try_from(n).unwrap_or(usize::MAX))
            .unwrap_or(default)
    }

    pub fn bool_or(&self, name: &str, default: bool) -> bool {
        self.values
            .get(name)
            .and_then(Value::as_bool)
            .unwrap_or(default)
    }

    /// The validated values
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ErrorKind, ParamSpec};
    use serde_json::json;

    fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new("pubmed_search", "Search PubMed")
            .param(ParamSpec::string("query", "Search terms").required())
            .param(ParamSpec::integer("limit", "Maximum records").default_value(10))
            .param(ParamSpec::string("year", "Year filter"))
    }

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_defaults_applied() {
        let validated = Arguments::validate(&descriptor(), &args(json!({"query": " crispr "}))).unwrap();

        assert_eq!(validated.str("query"), Some("crispr"));
        assert_eq!(validated.usize_or("limit", 0), 10);
        assert_eq!(validated.str("year"), None);
    }

    #[test]
    fn test_missing_required() {
        let err = Arguments::validate(&descriptor(), &args(json!({"limit": 5}))).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
        assert!(err.message.contains("query"));
    }

    #[test]
    fn test_null_counts_as_missing() {
        let err = Arguments::validate(&descriptor(), &args(json!({"query": null}))).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_blank_required_string() {
        let err = Arguments::validate(&descriptor(), &args(json!({"query": "   "}))).unwrap_err();
        assert!(err.message.contains("must not be empty"));
    }

    #[test]
    fn test_type_mismatch() {
        for bad in [json!("10"), json!(-1), json!(2.5)] {
            let err = Arguments::validate(&descriptor(), &args(json!({"query": "x", "limit": bad})))
                .unwrap_err();
            assert_eq!(err.kind, ErrorKind::InvalidArgument);
            assert!(err.message.contains("limit"));
        }
    }

    #[test]
    fn test_extra_parameters_ignored() {
        let validated = Arguments::validate(
            &descriptor(),
            &args(json!({"query": "x", "color": "blue"})),
        )
        .unwrap();

        assert!(validated.get("color").is_none());
        assert_eq!(validated.as_map().len(), 2);
    }
}
