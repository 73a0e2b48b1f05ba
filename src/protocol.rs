//! Request/response messages exchanged with a harvesting host.
//!
//! Messages are JSON objects tagged by `action`, with camelCase keys:
//!
//! ```json
//! {"action": "getFiles"}
//! {"action": "clickDownloads"}
//! {"action": "downloadFile", "url": "https://..."}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum HarvestRequest {
    /// Expand the page, open relevant menus and report every file URL
    GetFiles,

    /// Activate every menu "download" action and start each anchor download
    ClickDownloads,

    /// Start one download
    DownloadFile { url: String },
}

impl HarvestRequest {
    /// Tool name and parameters that carry out this request
    pub fn tool_call(&self) -> (&'static str, Value) {
        match self {
            Self::GetFiles => ("get_files", json!({})),
            Self::ClickDownloads => ("click_downloads", json!({})),
            Self::DownloadFile { url } => ("download_file", json!({ "url": url })),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetFilesResponse {
    pub files: Vec<String>,
}

/// Outcome of activating download actions through overflow menus
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuDownloadSummary {
    /// Visible menu triggers on the page
    pub total: usize,

    /// Triggers whose menu offered a download action that was activated
    pub started: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickDownloadsResponse {
    pub clicked: bool,
    pub menu: MenuDownloadSummary,
    pub anchor_started: usize,
}

impl ClickDownloadsResponse {
    /// Downloads started through menus and anchors together
    pub fn total_started(&self) -> usize {
        self.menu.started + self.anchor_started
    }
}

/// Result of a `downloadFile` request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadStarted {
    pub url: String,

    /// Inferred name; absent when the browser picks one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}
