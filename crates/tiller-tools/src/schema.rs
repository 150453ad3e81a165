use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSchema {
    pub properties: Map<String, Value>,
    pub required: Vec<String>,
    #[serde(rename = "type")]
    pub schema_type: String,
}

impl Default for InputSchema {
    fn default() -> Self {
        Self {
            properties: Map::new(),
            required: Vec::new(),
            schema_type: "object".to_string(),
        }
    }
}

impl InputSchema {
    /// Summarize a raw JSON schema object as advertised by a capability provider.
    pub fn from_json_object(schema: &Map<String, Value>) -> Self {
        let required = schema
            .get("required")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        let schema_type = schema
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("object")
            .to_string();

        Self {
            properties: schema
                .get("properties")
                .and_then(|v| v.as_object())
                .cloned()
                .unwrap_or_default(),
            required,
            schema_type,
        }
    }
}

/// A callable tool as advertised by exactly one capability provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: InputSchema,
}

impl ToolSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: InputSchema::default(),
        }
    }

    pub fn with_input_schema(mut self, input_schema: InputSchema) -> Self {
        self.input_schema = input_schema;
        self
    }
}
