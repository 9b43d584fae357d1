//! Tool call results in the MCP content shape.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// One content block of a tool result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

/// Successful (or tool-reported failed) outcome of a tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: Vec<ContentItem>,

    #[serde(rename = "isError", default, skip_serializing_if = "is_false")]
    pub is_error: bool,

    /// Set when the payload could not be serialized and a textual
    /// fallback was returned instead.
    #[serde(default, skip_serializing_if = "is_false")]
    pub degraded: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl ToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentItem {
                kind: "text".to_string(),
                text: text.into(),
            }],
            is_error: false,
            degraded: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::text(text)
        }
    }

    /// Pretty-printed JSON text result.
    ///
    /// Never fails: a value that cannot be serialized falls back to its
    /// `Debug` form with `degraded` set.
    pub fn json<T: Serialize + Debug>(value: &T) -> Self {
        match serde_json::to_string_pretty(value) {
            Ok(text) => Self::text(text),
            Err(e) => {
                tracing::warn!(error = %e, "tool result not serializable, returning debug text");
                Self {
                    degraded: true,
                    ..Self::text(format!("{:?}", value))
                }
            }
        }
    }

    /// Concatenated text of every content block.
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
