//! Tool schema and result types.
//!
//! Defines the schema sent to the decision engine plus the result type
//! produced by executing a tool call.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::ArtifactId;

// ─────────────────────────────────────────────────────────────────────────────
// Tool schema
// ─────────────────────────────────────────────────────────────────────────────

/// JSON Schema-compatible parameter definition for a tool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolParameterSchema {
    /// Top-level JSON Schema type (always `object` for tool parameters).
    #[serde(rename = "type")]
    pub schema_type: String,
    /// Property definitions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<Map<String, Value>>,
    /// Required property names.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
}

impl ToolParameterSchema {
    /// Schema for a tool that takes no arguments.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            schema_type: "object".into(),
            properties: None,
            required: None,
        }
    }

    /// Schema for an object with the given properties and required names.
    #[must_use]
    pub fn object(properties: Map<String, Value>, required: &[&str]) -> Self {
        Self {
            schema_type: "object".into(),
            properties: Some(properties),
            required: Some(required.iter().map(|s| (*s).to_owned()).collect()),
        }
    }
}

/// A tool definition sent to the decision engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name (unique within the contract).
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema for the tool's arguments.
    pub parameters: ToolParameterSchema,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool call and outcome
// ─────────────────────────────────────────────────────────────────────────────

/// A single tool invocation chosen by the decision engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool name.
    pub name: String,
    /// Argument mapping (JSON object).
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    /// Build a call from a name and argument map.
    #[must_use]
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// Result of executing one tool call, fed back into the transcript.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    /// Text fed back to the decision engine.
    pub content: String,
    /// Whether the execution failed in a way the engine should react to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
    /// Reference to a captured artifact, if the tool produced one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactId>,
}

/// Create a successful text outcome.
#[must_use]
pub fn text_outcome(content: impl Into<String>) -> ToolOutcome {
    ToolOutcome {
        content: content.into(),
        is_error: None,
        artifact: None,
    }
}

/// Create a failed outcome. The failure is a value, not a fault: it is
/// appended to the transcript so the decision engine can adapt.
#[must_use]
pub fn error_outcome(content: impl Into<String>) -> ToolOutcome {
    ToolOutcome {
        content: content.into(),
        is_error: Some(true),
        artifact: None,
    }
}

impl ToolOutcome {
    /// Attach an artifact reference.
    #[must_use]
    pub fn with_artifact(mut self, artifact: ArtifactId) -> Self {
        self.artifact = Some(artifact);
        self
    }

    /// Whether this outcome reports an execution failure.
    #[must_use]
    pub fn failed(&self) -> bool {
        self.is_error.unwrap_or(false)
    }
}
