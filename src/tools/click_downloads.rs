use crate::error::Result;
use crate::harvest::Harvester;
use crate::tools::{Tool, ToolContext, ToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the click_downloads tool
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ClickDownloadsParams {
    /// Override how many menu triggers are opened at most
    #[serde(default)]
    pub overflow_limit: Option<usize>,
}

/// Activates every menu download action, then starts each anchor download
#[derive(Default)]
pub struct ClickDownloadsTool;

impl Tool for ClickDownloadsTool {
    type Params = ClickDownloadsParams;

    fn name(&self) -> &str {
        "click_downloads"
    }

    fn execute_typed(&self, params: ClickDownloadsParams, context: &mut ToolContext) -> Result<ToolResult> {
        let _run = context.session.begin_run()?;

        let mut config = context.config().clone();
        if let Some(limit) = params.overflow_limit {
            config = config.overflow_limit(limit);
        }

        let page = context.page()?;
        let response = Harvester::new(&page, &config).click_downloads(&page, &page)?;
        log::info!("Downloads started: {} files", response.total_started());
        ToolResult::success_from(&response)
    }
}
