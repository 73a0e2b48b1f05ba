use crate::error::Result;
use crate::tools::{Tool, ToolContext, ToolResult, utils};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the navigate tool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NavigateParams {
    /// URL of the course page to open
    pub url: String,

    /// Wait for navigation to complete (default: true)
    #[serde(default = "default_wait")]
    pub wait_for_load: bool,

    /// Extra milliseconds to let the app render after load (default: 0)
    #[serde(default)]
    pub render_wait_ms: u64,
}

fn default_wait() -> bool {
    true
}

/// Opens a page in the active tab
#[derive(Default)]
pub struct NavigateTool;

impl Tool for NavigateTool {
    type Params = NavigateParams;

    fn name(&self) -> &str {
        "navigate"
    }

    fn execute_typed(&self, params: NavigateParams, context: &mut ToolContext) -> Result<ToolResult> {
        let url = utils::normalize_url(&params.url)?;
        context.session.navigate(&url)?;

        if params.wait_for_load {
            context.session.wait_for_navigation()?;
        }
        utils::render_wait(params.render_wait_ms);

        log::info!("Opened {}", url);
        Ok(ToolResult::success_with(serde_json::json!({
            "url": url,
            "waited": params.wait_for_load
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigate_params_default() {
        let params: NavigateParams = serde_json::from_value(serde_json::json!({ "url": "lms.test" })).unwrap();
        assert_eq!(params.url, "lms.test");
        assert!(params.wait_for_load);
        assert_eq!(params.render_wait_ms, 0);
    }

    #[test]
    fn test_navigate_params_explicit() {
        let params: NavigateParams = serde_json::from_value(serde_json::json!({
            "url": "https://lms.test",
            "wait_for_load": false,
            "render_wait_ms": 1500
        }))
        .unwrap();
        assert!(!params.wait_for_load);
        assert_eq!(params.render_wait_ms, 1500);
    }

    #[test]
    fn test_navigate_params_require_url() {
        assert!(serde_json::from_value::<NavigateParams>(serde_json::json!({})).is_err());
    }
}
