use crate::error::Result;
use crate::harvest::Harvester;
use crate::tools::{Tool, ToolContext, ToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the get_files tool
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct GetFilesParams {
    /// Override the configured number of expansion passes
    #[serde(default)]
    pub max_passes: Option<usize>,
}

/// Expands the page, opens relevant menus and reports every file URL
#[derive(Default)]
pub struct GetFilesTool;

impl Tool for GetFilesTool {
    type Params = GetFilesParams;

    fn name(&self) -> &str {
        "get_files"
    }

    fn execute_typed(&self, params: GetFilesParams, context: &mut ToolContext) -> Result<ToolResult> {
        let _run = context.session.begin_run()?;

        let mut config = context.config().clone();
        if let Some(passes) = params.max_passes {
            config = config.max_passes(passes);
        }

        let page = context.page()?;
        let response = Harvester::new(&page, &config).get_files()?;
        log::info!("get_files found {} files", response.files.len());
        ToolResult::success_from(&response)
    }
}
