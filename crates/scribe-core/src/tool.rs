use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A complete tool invocation requested by the reporter model.
///
/// Built once the model's streamed fragments for the call have been
/// reassembled; `arguments` is always a JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Id the model assigned to the call.
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// Parsed arguments.
    pub arguments: Value,
}

impl ToolCall {
    /// A call of `name` with `arguments`.
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// The arguments as the compact JSON text chat APIs expect.
    pub fn arguments_text(&self) -> String {
        self.arguments.to_string()
    }
}

/// What a tool produced for a [`ToolCall`].
///
/// `output` is sent to the browser unchanged as the `result` of an `a`
/// frame; the model gets [`ToolResult::model_text`] instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Id of the call answered.
    pub call_id: String,
    /// The tool's output.
    pub output: Value,
    /// The tool failed; `output` holds the reason.
    pub is_error: bool,
}

impl ToolResult {
    /// A successful result.
    pub fn success(call_id: impl Into<String>, output: impl Into<Value>) -> Self {
        Self {
            call_id: call_id.into(),
            output: output.into(),
            is_error: false,
        }
    }

    /// A failed result carrying `reason`.
    pub fn error(call_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            output: Value::String(reason.into()),
            is_error: true,
        }
    }

    /// The output as message text: strings verbatim, anything else as JSON.
    pub fn model_text(&self) -> String {
        match &self.output {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_arguments_text_is_compact_json() {
        let call = ToolCall::new("call_1", "render_bar_chart_component", json!({"XAxis": "month"}));
        assert_eq!(call.arguments_text(), r#"{"XAxis":"month"}"#);
    }

    #[test]
    fn test_model_text() {
        assert_eq!(ToolResult::success("c1", "rendered").model_text(), "rendered");
        assert_eq!(
            ToolResult::success("c1", json!({"rows": 3})).model_text(),
            r#"{"rows":3}"#
        );
        let failed = ToolResult::error("c1", "bad XAxis");
        assert!(failed.is_error);
        assert_eq!(failed.output, json!("bad XAxis"));
    }
}
