use crate::llm::ToolSpec;
use async_trait::async_trait;
use scribe_core::{ScribeError, ScribeResult, ToolCall, ToolResult};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// A tool the reporter model may call.
#[async_trait]
pub trait Tool: Send + Sync {
    /// How the tool is advertised to the model.
    fn spec(&self) -> &ToolSpec;

    /// Runs `call`. Bad arguments are an error result, not an `Err`.
    async fn execute(&self, call: ToolCall) -> ScribeResult<ToolResult>;
}

/// The tools offered to the model, by name.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// A registry holding the built-in reporter tools.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(BarChartTool::new()));
        registry
    }

    /// Adds `tool`, replacing any tool of the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.spec().name.clone();
        info!(tool = %name, "Registered tool");
        self.tools.insert(name, tool);
    }

    /// The tool called `name`.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Specs of every registered tool, sorted by name.
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.tools.values().map(|t| t.spec().clone()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// Dispatches `call` by name; unknown tools are [`ScribeError::Tool`].
    pub async fn execute(&self, call: ToolCall) -> ScribeResult<ToolResult> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ScribeError::Tool(format!("Unknown tool: {}", call.name)))?;
        tool.execute(call).await
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// No tools registered.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Name of the built-in bar chart tool.
pub const BAR_CHART_TOOL: &str = "render_bar_chart_component";

const BAR_CHART_RENDERED: &str = "The bar chart has been rendered on the user's screen.";

/// Asks the browser to render a bar chart.
///
/// The tool itself draws nothing: the client renders the chart from the
/// call's arguments. Execution only checks that those arguments describe a
/// chart the client can draw.
pub struct BarChartTool {
    spec: ToolSpec,
}

impl BarChartTool {
    /// The tool with its JSON Schema.
    pub fn new() -> Self {
        Self {
            spec: ToolSpec {
                name: BAR_CHART_TOOL.to_string(),
                description: "Issue a command to render a bar chart React component. Once this \
                              executes correctly, a bar chart is displayed in the user's browser."
                    .to_string(),
                parameters_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "chartData": {
                            "type": "array",
                            "description": "Data shown in the chart; each element is one tick. Every element must have the same keys.",
                            "items": {
                                "type": "object",
                                "additionalProperties": {"type": ["integer", "string"]}
                            }
                        },
                        "dataKeys": {
                            "type": "array",
                            "description": "Fields of chartData plotted as bars",
                            "items": {"type": "string"}
                        },
                        "XAxis": {
                            "type": "string",
                            "description": "Field of chartData used as the x-axis label"
                        }
                    },
                    "required": ["chartData", "dataKeys", "XAxis"]
                }),
            },
        }
    }
}

impl Default for BarChartTool {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct BarChartArgs {
    #[serde(rename = "chartData")]
    chart_data: Vec<Map<String, Value>>,
    #[serde(rename = "dataKeys")]
    data_keys: Vec<String>,
    #[serde(rename = "XAxis")]
    x_axis: String,
}

impl BarChartArgs {
    fn validate(&self) -> Result<(), String> {
        let Some(first) = self.chart_data.first() else {
            return Err("chartData must contain at least one element.".to_string());
        };
        let keys: Vec<&String> = first.keys().collect();

        for element in &self.chart_data {
            let element_keys: Vec<&String> = element.keys().collect();
            if element_keys != keys {
                return Err(format!(
                    "The dict keys of each list element must be same. Key {element_keys:?} and Key {keys:?} are not equal."
                ));
            }
            if let Some((key, value)) = element
                .iter()
                .find(|(_, v)| !(v.is_i64() || v.is_u64() || v.is_string()))
            {
                return Err(format!("Value of {key} must be an integer or a string, got {value}."));
            }
        }

        if let Some(missing) = self.data_keys.iter().find(|k| !first.contains_key(k.as_str())) {
            return Err(format!("Key of data_keys {missing} not in chartData."));
        }
        if !first.contains_key(&self.x_axis) {
            return Err(format!("Key of x_axis_key {} not in chartData.", self.x_axis));
        }
        Ok(())
    }
}

#[async_trait]
impl Tool for BarChartTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn execute(&self, call: ToolCall) -> ScribeResult<ToolResult> {
        let args: BarChartArgs = match serde_json::from_value(call.arguments.clone()) {
            Ok(args) => args,
            Err(e) => {
                warn!(tool_call_id = %call.id, error = %e, "Malformed bar chart arguments");
                return Ok(ToolResult::error(&call.id, format!("Invalid arguments: {e}")));
            }
        };

        match args.validate() {
            Ok(()) => {
                info!(tool_call_id = %call.id, bars = args.chart_data.len(), "Bar chart accepted");
                Ok(ToolResult::success(&call.id, BAR_CHART_RENDERED))
            }
            Err(reason) => {
                warn!(tool_call_id = %call.id, %reason, "Bar chart rejected");
                Ok(ToolResult::error(&call.id, reason))
            }
        }
    }
}
