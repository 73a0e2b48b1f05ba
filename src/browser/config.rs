use crate::error::{HarvestError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Options for launching a new browser instance
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Run without a visible window
    pub headless: bool,

    /// Window width in pixels
    pub window_width: u32,

    /// Window height in pixels
    pub window_height: u32,

    /// Path to a Chrome/Chromium binary (auto-detected when unset)
    pub chrome_path: Option<PathBuf>,

    /// Persistent profile directory, so an existing LMS login is reused
    pub user_data_dir: Option<PathBuf>,

    /// Enable the Chrome sandbox
    pub sandbox: bool,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1280,
            window_height: 900,
            chrome_path: None,
            user_data_dir: None,
            sandbox: true,
        }
    }
}

impl LaunchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn window_size(mut self, width: u32, height: u32) -> Self {
        self.window_width = width;
        self.window_height = height;
        self
    }

    pub fn chrome_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.chrome_path = Some(path.into());
        self
    }

    pub fn user_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.user_data_dir = Some(dir.into());
        self
    }

    pub fn sandbox(mut self, sandbox: bool) -> Self {
        self.sandbox = sandbox;
        self
    }
}

/// Options for attaching to a browser that is already running
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// DevTools WebSocket URL, e.g. `ws://127.0.0.1:9222/devtools/browser/<id>`
    pub ws_url: String,

    /// Idle timeout in milliseconds before the connection is dropped
    pub timeout: u64,
}

impl ConnectionOptions {
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self { ws_url: ws_url.into(), timeout: 30_000 }
    }

    pub fn timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout = timeout_ms;
        self
    }
}

/// Which overflow-menu triggers are worth opening.
///
/// A trigger qualifies when its item holds a file-looking link or its text
/// mentions one of the keywords. Loosen it to open more menus, tighten it to
/// skip navigation menus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelevancePolicy {
    /// Lower-case words that mark an item as file-related
    pub keywords: Vec<String>,
}

impl Default for RelevancePolicy {
    fn default() -> Self {
        Self { keywords: vec!["download".into(), "attachment".into(), "file".into()] }
    }
}

/// Timing and limits for one harvest run. Durations are milliseconds in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Upper bound on click-everything expansion passes
    pub max_passes: usize,

    /// Pause after each expansion pass so the page can re-render
    #[serde(with = "millis")]
    pub settle_delay: Duration,

    /// Quiet window that closes a burst of mutations
    #[serde(with = "millis")]
    pub debounce: Duration,

    /// Hard ceiling on the mutation-observation phase
    #[serde(with = "millis")]
    pub observe_timeout: Duration,

    /// How long to wait for a menu to appear after activating its trigger
    #[serde(with = "millis")]
    pub menu_timeout: Duration,

    /// How long to wait for open menus to disappear
    #[serde(with = "millis")]
    pub menu_close_timeout: Duration,

    /// Polling period for menu and mutation waits
    #[serde(with = "millis")]
    pub poll_interval: Duration,

    /// Pause between two triggers
    #[serde(with = "millis")]
    pub trigger_gap: Duration,

    /// How many ancestors to inspect when looking for a trigger's item container
    pub container_depth: usize,

    /// Trigger cap for the activate-every-download path
    pub overflow_limit: usize,

    pub relevance: RelevancePolicy,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            max_passes: 5,
            settle_delay: Duration::from_millis(300),
            debounce: Duration::from_millis(500),
            observe_timeout: Duration::from_millis(3000),
            menu_timeout: Duration::from_millis(1500),
            menu_close_timeout: Duration::from_millis(1500),
            poll_interval: Duration::from_millis(100),
            trigger_gap: Duration::from_millis(200),
            container_depth: 8,
            overflow_limit: 100,
            relevance: RelevancePolicy::default(),
        }
    }
}

impl HarvestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load overrides from a JSON file; absent keys keep their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| HarvestError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        serde_json::from_str(&raw)
            .map_err(|e| HarvestError::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    pub fn max_passes(mut self, passes: usize) -> Self {
        self.max_passes = passes;
        self
    }

    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn debounce(mut self, window: Duration) -> Self {
        self.debounce = window;
        self
    }

    pub fn observe_timeout(mut self, timeout: Duration) -> Self {
        self.observe_timeout = timeout;
        self
    }

    pub fn menu_timeout(mut self, timeout: Duration) -> Self {
        self.menu_timeout = timeout;
        self
    }

    pub fn menu_close_timeout(mut self, timeout: Duration) -> Self {
        self.menu_close_timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn trigger_gap(mut self, gap: Duration) -> Self {
        self.trigger_gap = gap;
        self
    }

    pub fn container_depth(mut self, depth: usize) -> Self {
        self.container_depth = depth;
        self
    }

    pub fn overflow_limit(mut self, limit: usize) -> Self {
        self.overflow_limit = limit;
        self
    }

    pub fn relevance(mut self, policy: RelevancePolicy) -> Self {
        self.relevance = policy;
        self
    }

    /// Every wait shrunk to a few milliseconds, for scripted pages
    #[cfg(test)]
    pub(crate) fn fast() -> Self {
        Self::default()
            .settle_delay(Duration::from_millis(1))
            .debounce(Duration::from_millis(5))
            .observe_timeout(Duration::from_millis(60))
            .menu_timeout(Duration::from_millis(30))
            .menu_close_timeout(Duration::from_millis(10))
            .poll_interval(Duration::from_millis(1))
            .trigger_gap(Duration::from_millis(0))
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_options_builder() {
        let opts = LaunchOptions::new().headless(false).window_size(800, 600).sandbox(false).user_data_dir("/tmp/p");

        assert!(!opts.headless);
        assert_eq!(opts.window_width, 800);
        assert_eq!(opts.window_height, 600);
        assert!(!opts.sandbox);
        assert_eq!(opts.user_data_dir, Some(PathBuf::from("/tmp/p")));
    }

    #[test]
    fn test_harvest_config_defaults() {
        let config = HarvestConfig::default();
        assert_eq!(config.max_passes, 5);
        assert_eq!(config.menu_timeout, Duration::from_millis(1500));
        assert_eq!(config.container_depth, 8);
        assert_eq!(config.relevance.keywords, vec!["download", "attachment", "file"]);
    }

    #[test]
    fn test_harvest_config_partial_json() {
        let config: HarvestConfig =
            serde_json::from_str(r#"{"max_passes": 2, "debounce": 250, "relevance": {"keywords": ["handout"]}}"#)
                .unwrap();

        assert_eq!(config.max_passes, 2);
        assert_eq!(config.debounce, Duration::from_millis(250));
        assert_eq!(config.observe_timeout, Duration::from_millis(3000));
        assert_eq!(config.relevance.keywords, vec!["handout"]);
    }

    #[test]
    fn test_harvest_config_serializes_millis() {
        let json = serde_json::to_value(HarvestConfig::default()).unwrap();
        assert_eq!(json["settle_delay"], 300);
        assert_eq!(json["overflow_limit"], 100);
    }

    #[test]
    fn test_missing_config_file() {
        let err = HarvestConfig::from_json_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, HarvestError::Config(_)));
    }
}
