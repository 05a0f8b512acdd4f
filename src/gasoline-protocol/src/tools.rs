//! Tool types for the MCP protocol.

use std::collections::HashMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::content::Content;

/// MCP tool definition.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    /// Unique name for the tool.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: ToolInputSchema,
}

impl Tool {
    /// Create a new tool.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            input_schema: ToolInputSchema::object(),
        }
    }

    /// Set the input schema.
    pub fn with_schema(mut self, schema: ToolInputSchema) -> Self {
        self.input_schema = schema;
        self
    }
}

/// JSON Schema for tool input parameters.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ToolInputSchema {
    /// Schema type (always "object" for tool inputs).
    #[serde(rename = "type")]
    pub schema_type: String,
    /// Property definitions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<HashMap<String, PropertySchema>>,
    /// Required property names.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    /// Additional properties allowed.
    #[serde(
        skip_serializing_if = "Option::is_none",
        rename = "additionalProperties"
    )]
    pub additional_properties: Option<bool>,
}

impl ToolInputSchema {
    /// Create an object schema.
    pub fn object() -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: Some(HashMap::new()),
            required: None,
            additional_properties: Some(true),
        }
    }

    /// Add a property to an object schema.
    pub fn property(mut self, name: impl Into<String>, schema: PropertySchema) -> Self {
        if let Some(ref mut props) = self.properties {
            props.insert(name.into(), schema);
        }
        self
    }

    /// Set required properties.
    pub fn required(mut self, required: Vec<impl Into<String>>) -> Self {
        self.required = Some(required.into_iter().map(std::convert::Into::into).collect());
        self
    }
}

impl Default for ToolInputSchema {
    fn default() -> Self {
        Self::object()
    }
}

/// JSON Schema for a property.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct PropertySchema {
    /// Property type.
    #[serde(rename = "type")]
    pub schema_type: String,
    /// Property description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Enum values.
    #[serde(skip_serializing_if = "Option::is_none", rename = "enum")]
    pub enum_values: Option<Vec<String>>,
    /// Default value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Array item schema.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<PropertySchema>>,
}

impl PropertySchema {
    /// Create a string property.
    pub fn string() -> Self {
        Self {
            schema_type: "string".to_string(),
            ..Default::default()
        }
    }

    /// Create an integer property.
    pub fn integer() -> Self {
        Self {
            schema_type: "integer".to_string(),
            ..Default::default()
        }
    }

    /// Create a boolean property.
    pub fn boolean() -> Self {
        Self {
            schema_type: "boolean".to_string(),
            ..Default::default()
        }
    }

    /// Create an object property.
    pub fn object() -> Self {
        Self {
            schema_type: "object".to_string(),
            ..Default::default()
        }
    }

    /// Add a description.
    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Set enum values.
    pub fn enum_values(mut self, values: Vec<impl Into<String>>) -> Self {
        self.enum_values = Some(values.into_iter().map(std::convert::Into::into).collect());
        self
    }
}

/// List tools result.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
    /// Available tools.
    pub tools: Vec<Tool>,
}

impl ListToolsResult {
    /// Create a new result with tools.
    pub fn new(tools: Vec<Tool>) -> Self {
        Self { tools }
    }
}

/// Call tool request parameters.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CallToolParams {
    /// Tool name to call.
    pub name: String,
    /// Tool arguments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

/// Call tool result.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    /// Result content.
    pub content: Vec<Content>,
    /// Whether the result is an error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl CallToolResult {
    /// Create a success result with text content.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(text)],
            is_error: None,
        }
    }

    /// Create an error result.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(message)],
            is_error: Some(true),
        }
    }

    /// Create a result with multiple content items.
    pub fn with_content(content: Vec<Content>) -> Self {
        Self {
            content,
            is_error: None,
        }
    }

    /// Check if result is an error.
    pub fn is_error(&self) -> bool {
        self.is_error.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_creation() {
        let tool = Tool::new("observe", "Read captured telemetry").with_schema(
            ToolInputSchema::object()
                .property("what", PropertySchema::string().description("Kind"))
                .required(vec!["what"]),
        );

        assert_eq!(tool.name, "observe");
        assert!(tool.input_schema.properties.is_some());
    }

    #[test]
    fn test_call_tool_result() {
        let success = CallToolResult::text("done");
        assert!(!success.is_error());

        let error = CallToolResult::error("broken");
        assert!(error.is_error());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let tool = Tool::new("configure", "Change capture settings");
        let json = serde_json::to_string(&tool).expect("serialization should succeed");
        let parsed: Tool = serde_json::from_str(&json).expect("deserialization should succeed");
        assert_eq!(parsed.name, tool.name);
    }
}
