//! Tools: the named, JSON-parameterised operations a host can invoke.
//!
//! Each tool declares a typed parameter struct; the registry deserialises raw
//! JSON into it and publishes its JSON schema. Protocol messages
//! ([`crate::protocol::HarvestRequest`]) are executed through these tools.

pub mod click_downloads;
pub mod download_file;
pub mod expand_sections;
pub mod get_files;
pub mod navigate;
pub mod utils;

pub use click_downloads::ClickDownloadsTool;
pub use download_file::DownloadFileTool;
pub use expand_sections::ExpandSectionsTool;
pub use get_files::GetFilesTool;
pub use navigate::NavigateTool;

use crate::browser::{BrowserSession, CdpPage, HarvestConfig};
use crate::error::{HarvestError, Result};
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of a tool execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    /// Successful result carrying `data`
    pub fn success_with(data: Value) -> Self {
        Self { success: true, data: Some(data), error: None }
    }

    /// Successful result from any serializable payload
    pub fn success_from<T: Serialize>(payload: &T) -> Result<Self> {
        serde_json::to_value(payload)
            .map(Self::success_with)
            .map_err(|e| HarvestError::EvaluationFailed(format!("Failed to serialize result: {}", e)))
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self { success: false, data: None, error: Some(error.into()) }
    }
}

/// Everything a tool can reach while it runs
pub struct ToolContext<'a> {
    pub session: &'a BrowserSession,
}

impl<'a> ToolContext<'a> {
    pub fn new(session: &'a BrowserSession) -> Self {
        Self { session }
    }

    /// The active tab as a harvestable page
    pub fn page(&self) -> Result<CdpPage> {
        self.session.page()
    }

    pub fn config(&self) -> &HarvestConfig {
        self.session.config()
    }
}

/// A typed tool
pub trait Tool: Send + Sync {
    type Params: DeserializeOwned + JsonSchema;

    fn name(&self) -> &str;

    /// JSON schema of [`Tool::Params`]
    fn parameters_schema(&self) -> Value {
        serde_json::to_value(schemars::schema_for!(Self::Params)).unwrap_or(Value::Null)
    }

    fn execute_typed(&self, params: Self::Params, context: &mut ToolContext) -> Result<ToolResult>;

    /// Deserialize raw parameters and run
    fn execute(&self, params: Value, context: &mut ToolContext) -> Result<ToolResult> {
        let typed: Self::Params = serde_json::from_value(params)
            .map_err(|e| HarvestError::InvalidParams(format!("{}: {}", Tool::name(self), e)))?;
        self.execute_typed(typed, context)
    }
}

/// Object-safe view of [`Tool`] used by the registry
pub trait DynTool: Send + Sync {
    fn name(&self) -> &str;
    fn parameters_schema(&self) -> Value;
    fn execute(&self, params: Value, context: &mut ToolContext) -> Result<ToolResult>;
}

impl<T: Tool> DynTool for T {
    fn name(&self) -> &str {
        Tool::name(self)
    }

    fn parameters_schema(&self) -> Value {
        Tool::parameters_schema(self)
    }

    fn execute(&self, params: Value, context: &mut ToolContext) -> Result<ToolResult> {
        Tool::execute(self, params, context)
    }
}

/// Tools by name, in registration order
#[derive(Default)]
pub struct ToolRegistry {
    tools: IndexMap<String, Box<dyn DynTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in tool
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(NavigateTool);
        registry.register(GetFilesTool);
        registry.register(ClickDownloadsTool);
        registry.register(DownloadFileTool);
        registry.register(ExpandSectionsTool);
        registry
    }

    /// Add a tool, replacing any tool with the same name
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.tools.insert(Tool::name(&tool).to_string(), Box::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<&dyn DynTool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn execute(&self, name: &str, params: Value, context: &mut ToolContext) -> Result<ToolResult> {
        let tool = self.get(name).ok_or_else(|| HarvestError::ToolExecutionFailed {
            tool: name.to_string(),
            reason: "Unknown tool".to_string(),
        })?;
        tool.execute(params, context)
    }
}
