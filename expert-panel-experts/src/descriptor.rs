//! Function-call descriptors offered to the coordinator

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name, description and JSON-Schema parameters of one callable function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl FunctionDescriptor {
    /// Descriptor taking a single required string argument `query`
    pub fn with_query(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The question to put to the expert"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    /// Names listed under `required` in the parameter schema
    pub fn required_params(&self) -> Vec<&str> {
        self.parameters
            .get("required")
            .and_then(|r| r.as_array())
            .map(|fields| fields.iter().filter_map(|f| f.as_str()).collect())
            .unwrap_or_default()
    }

    /// Check call arguments against the schema's `required` list
    pub fn validate_arguments(&self, arguments: &Value) -> Vec<String> {
        let Some(object) = arguments.as_object() else {
            return vec!["Parameters must be an object".to_string()];
        };

        self.required_params()
            .into_iter()
            .filter(|field| !object.contains_key(*field))
            .map(|field| format!("Missing required field: {}", field))
            .collect()
    }

    /// OpenAI `tools` array entry
    pub fn to_schema(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_schema_shape() {
        let descriptor = FunctionDescriptor::with_query("consult_teacher", "Ask the teacher");
        let schema = descriptor.to_schema();

        assert_eq!(schema["type"], "function");
        assert_eq!(schema["function"]["name"], "consult_teacher");
        assert_eq!(schema["function"]["parameters"]["required"][0], "query");
        assert_eq!(
            schema["function"]["parameters"]["properties"]["query"]["type"],
            "string"
        );
    }

    #[test]
    fn test_validate_arguments() {
        let descriptor = FunctionDescriptor::with_query("consult_teacher", "Ask the teacher");

        assert!(descriptor
            .validate_arguments(&serde_json::json!({"query": "x"}))
            .is_empty());
        assert_eq!(
            descriptor.validate_arguments(&serde_json::json!({})),
            vec!["Missing required field: query".to_string()]
        );
        assert_eq!(
            descriptor.validate_arguments(&serde_json::json!("query")),
            vec!["Parameters must be an object".to_string()]
        );
    }
}
