//! Browser session management, configuration, the CDP-backed page and download tracking

pub mod config;
pub mod page;
pub mod session;
pub mod tracker;

pub use config::{ConnectionOptions, HarvestConfig, LaunchOptions, RelevancePolicy};
pub use page::CdpPage;
pub use session::{BrowserSession, RunGuard};
pub use tracker::{DownloadState, DownloadTally, DownloadTracker};
