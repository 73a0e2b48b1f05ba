use crate::download::download_file;
use crate::error::{HarvestError, Result};
use crate::protocol::DownloadStarted;
use crate::tools::{Tool, ToolContext, ToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the download_file tool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DownloadFileParams {
    /// Absolute URL of the file
    pub url: String,
}

/// Starts one download under an inferred filename
#[derive(Default)]
pub struct DownloadFileTool;

impl Tool for DownloadFileTool {
    type Params = DownloadFileParams;

    fn name(&self) -> &str {
        "download_file"
    }

    fn execute_typed(&self, params: DownloadFileParams, context: &mut ToolContext) -> Result<ToolResult> {
        let url = params.url.trim();
        if url::Url::parse(url).is_err() {
            return Err(HarvestError::InvalidParams(format!("Not an absolute URL: {}", url)));
        }

        let page = context.page()?;
        let filename = download_file(&page, &page, url)?;
        ToolResult::success_from(&DownloadStarted { url: url.to_string(), filename })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_file_params() {
        let params: DownloadFileParams =
            serde_json::from_value(serde_json::json!({ "url": "https://lms.test/a.pdf" })).unwrap();
        assert_eq!(params.url, "https://lms.test/a.pdf");
        assert!(serde_json::from_value::<DownloadFileParams>(serde_json::json!({})).is_err());
    }
}
