//! # ultra-harvest
//!
//! Finds and downloads course files in single-page LMS front ends, driving
//! Chrome/Chromium over the Chrome DevTools Protocol (CDP).
//!
//! Course pages hide their files: sections load collapsed, attachments sit
//! behind "more options" menus and the app re-renders as you click. A
//! harvest run opens all of that up, reads the file links that appear and
//! reports each URL once.
//!
//! ## Features
//!
//! - **Expansion**: opens collapsed sections, then keeps watching DOM mutations until the page settles
//! - **Menu extraction**: opens file-related overflow menus one at a time and reads their links and download actions
//! - **Classification**: tells file URLs from navigation using extensions, LMS path patterns and CDN hosts
//! - **Downloads**: starts downloads under a filename inferred from response headers or the URL
//! - **Tool System**: every operation is a named tool taking JSON parameters
//!
//! ## Command line
//!
//! ```bash
//! # List the files on a course page
//! cargo run -- files https://learn.example.edu/ultra/courses/_1_1/outline
//!
//! # Answer JSON requests on stdin, one per line
//! cargo run -- serve --ws-endpoint ws://127.0.0.1:9222/devtools/browser/<id>
//! ```
//!
//! ## Library Usage
//!
//! ```rust,no_run
//! use ultra_harvest::{BrowserSession, HarvestRequest, LaunchOptions};
//!
//! # fn main() -> ultra_harvest::Result<()> {
//! let session = BrowserSession::launch(LaunchOptions::default())?;
//! session.navigate("https://learn.example.edu/ultra/courses/_1_1/outline")?;
//! session.wait_for_navigation()?;
//!
//! let result = session.handle(&HarvestRequest::GetFiles)?;
//! println!("{}", result.data.unwrap_or_default());
//! # Ok(())
//! # }
//! ```
//!
//! The harvesting logic only talks to a [`Page`], so it can run against any
//! implementation of that trait:
//!
//! ```rust,no_run
//! # use ultra_harvest::{BrowserSession, HarvestConfig, Harvester, LaunchOptions};
//! # fn main() -> ultra_harvest::Result<()> {
//! # let session = BrowserSession::launch(LaunchOptions::default())?;
//! let page = session.page()?;
//! let config = HarvestConfig::default().max_passes(3);
//! let run = Harvester::new(&page, &config).run()?;
//! println!("{} files, {} menu triggers opened", run.files().len(), run.triggers.opened);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - [`browser`]: Browser session, CDP-backed page and configuration
//! - [`dom`]: Page snapshots as an arena tree
//! - [`classify`]: File URL heuristics
//! - [`expand`]: Collapsed-section expansion and mutation observation
//! - [`menu`]: Overflow menu resolution
//! - [`dedup`]: Item-container de-duplication for menu triggers
//! - [`harvest`]: The harvest run and the download-everything path
//! - [`download`]: Filename inference and download start
//! - [`protocol`]: Request and response messages
//! - [`tools`]: Named tools over a [`BrowserSession`]
//! - [`error`]: Error types and result aliases

pub mod browser;
pub mod classify;
pub mod dedup;
pub mod dom;
pub mod download;
pub mod error;
pub mod expand;
pub mod harvest;
pub mod menu;
pub mod page;
pub mod protocol;
pub mod tools;

#[cfg(test)]
mod testing;

pub use browser::{
    BrowserSession, CdpPage, ConnectionOptions, DownloadTally, DownloadTracker, HarvestConfig, LaunchOptions,
    RelevancePolicy,
};
pub use classify::{Classification, classify, is_likely_file_url};
pub use dom::{BoundingBox, DomTree, ElementNode, NodeHandle};
pub use download::{DownloadRoute, DownloadSink, HeadFetcher, HeadInfo, download_file};
pub use error::{HarvestError, Result};
pub use expand::{DomExpander, ExpansionReport};
pub use harvest::{Candidate, HarvestRun, Harvester, Phase, ResultSet, Sentinel, TriggerStats};
pub use page::Page;
pub use protocol::{ClickDownloadsResponse, DownloadStarted, GetFilesResponse, HarvestRequest, MenuDownloadSummary};
pub use tools::{Tool, ToolContext, ToolRegistry, ToolResult};
