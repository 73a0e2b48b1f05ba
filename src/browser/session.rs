use crate::{browser::config::{ConnectionOptions, HarvestConfig, LaunchOptions},
            browser::page::CdpPage,
            browser::tracker::DownloadTracker,
            error::{HarvestError, Result},
            protocol::HarvestRequest,
            tools::{ToolContext, ToolRegistry, ToolResult}};
use headless_chrome::{Browser, Tab,
                      protocol::cdp::{Browser::{SetDownloadBehavior, SetDownloadBehaviorBehaviorOption},
                                      types::Event}};
use std::{ffi::OsStr,
          path::Path,
          sync::{Arc, Mutex, MutexGuard, TryLockError},
          time::Duration};

/// Admits one harvest run at a time
#[derive(Debug, Default)]
pub struct RunGuard(Mutex<()>);

impl RunGuard {
    /// Enter a run, or fail immediately if one is already in flight
    pub fn try_begin(&self) -> Result<MutexGuard<'_, ()>> {
        match self.0.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::WouldBlock) => Err(HarvestError::RunInProgress),
            // A panicked run leaves nothing behind worth protecting
            Err(TryLockError::Poisoned(poisoned)) => Ok(poisoned.into_inner()),
        }
    }
}

/// Browser session that manages a Chrome/Chromium instance
pub struct BrowserSession {
    /// The underlying headless_chrome Browser instance
    browser: Browser,

    /// Timing and limits applied to every harvest run
    config: HarvestConfig,

    /// Tool registry through which every request is executed
    tool_registry: ToolRegistry,

    run_guard: RunGuard,
}

impl BrowserSession {
    fn from_browser(browser: Browser) -> Self {
        Self {
            browser,
            config: HarvestConfig::default(),
            tool_registry: ToolRegistry::with_defaults(),
            run_guard: RunGuard::default(),
        }
    }

    /// Launch a new browser instance with the given options
    pub fn launch(options: LaunchOptions) -> Result<Self> {
        let mut launch_opts = headless_chrome::LaunchOptions::default();

        // LMS front ends refuse some automation-flagged browsers
        launch_opts.ignore_default_args.push(OsStr::new("--enable-automation"));
        launch_opts.args.push(OsStr::new("--disable-blink-features=AutomationControlled"));

        // A long harvest must not hit the default 30 second idle timeout
        launch_opts.idle_browser_timeout = Duration::from_secs(60 * 60);

        launch_opts.headless = options.headless;
        launch_opts.window_size = Some((options.window_width, options.window_height));
        launch_opts.path = options.chrome_path;
        launch_opts.user_data_dir = options.user_data_dir;
        launch_opts.sandbox = options.sandbox;

        let browser = Browser::new(launch_opts).map_err(|e| HarvestError::LaunchFailed(e.to_string()))?;

        browser.new_tab().map_err(|e| HarvestError::LaunchFailed(format!("Failed to create tab: {}", e)))?;

        log::info!("Browser launched ({})", if options.headless { "headless" } else { "headed" });
        Ok(Self::from_browser(browser))
    }

    /// Connect to an existing browser instance via WebSocket
    pub fn connect(options: ConnectionOptions) -> Result<Self> {
        let browser = Browser::connect_with_timeout(options.ws_url.clone(), Duration::from_millis(options.timeout))
            .map_err(|e| HarvestError::ConnectionFailed(e.to_string()))?;

        log::info!("Connected to browser at {}", options.ws_url);
        Ok(Self::from_browser(browser))
    }

    /// Launch a browser with default options
    pub fn new() -> Result<Self> {
        Self::launch(LaunchOptions::default())
    }

    /// Builder method: replace the harvest configuration
    pub fn with_config(mut self, config: HarvestConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    /// Get the active tab
    pub fn tab(&self) -> Result<Arc<Tab>> {
        self.get_active_tab()
    }

    /// Get all tabs
    pub fn get_tabs(&self) -> Result<Vec<Arc<Tab>>> {
        let tabs = self
            .browser
            .get_tabs()
            .lock()
            .map_err(|e| HarvestError::TabOperationFailed(format!("Failed to get tabs: {}", e)))?
            .clone();

        Ok(tabs)
    }

    fn tab_matches(tab: &Arc<Tab>, check: &str) -> bool {
        match tab.evaluate(check, false) {
            Ok(remote_object) => remote_object.value.and_then(|v| v.as_bool()).unwrap_or(false),
            Err(e) => {
                log::debug!("Failed to check tab status: {}", e);
                false
            }
        }
    }

    /// Get the currently active tab by checking the document visibility and focus state
    pub fn get_active_tab(&self) -> Result<Arc<Tab>> {
        let tabs = self.get_tabs()?;

        // Visible and focused is the strongest signal, visible alone the next best
        let checks = [
            "document.visibilityState === 'visible' && document.hasFocus()",
            "document.visibilityState === 'visible'",
        ];
        for check in checks {
            if let Some(tab) = tabs.iter().find(|tab| Self::tab_matches(tab, check)) {
                return Ok(tab.clone());
            }
        }

        // Headless tabs can report hidden; a lone tab is still the active one
        match tabs.as_slice() {
            [only] => Ok(only.clone()),
            _ => Err(HarvestError::TabOperationFailed("No active tab found".to_string())),
        }
    }

    /// The active tab seen through the harvesting interface
    pub fn page(&self) -> Result<CdpPage> {
        Ok(CdpPage::new(self.tab()?).with_browser(self.browser.clone()))
    }

    /// Get the underlying Browser instance
    pub fn browser(&self) -> &Browser {
        &self.browser
    }

    /// Navigate to a URL using the active tab
    pub fn navigate(&self, url: &str) -> Result<()> {
        self.tab()?
            .navigate_to(url)
            .map_err(|e| HarvestError::NavigationFailed(format!("Failed to navigate to {}: {}", url, e)))?;

        Ok(())
    }

    /// Wait for navigation to complete
    pub fn wait_for_navigation(&self) -> Result<()> {
        self.tab()?
            .wait_until_navigated()
            .map_err(|e| HarvestError::NavigationFailed(format!("Navigation timeout: {}", e)))?;

        Ok(())
    }

    /// Let the browser save downloads into `dir` without asking, and follow
    /// their progress through the returned tracker
    pub fn allow_downloads(&self, dir: impl AsRef<Path>) -> Result<DownloadTracker> {
        let dir = dir.as_ref();
        let tab = self.tab()?;
        tab.call_method(SetDownloadBehavior {
            behavior: SetDownloadBehaviorBehaviorOption::Allow,
            browser_context_id: None,
            download_path: Some(dir.display().to_string()),
            events_enabled: Some(true),
        })
        .map_err(|e| HarvestError::TabOperationFailed(format!("Failed to set download directory: {}", e)))?;

        let tracker = DownloadTracker::new();
        let listener = tracker.clone();
        tab.add_event_listener(Arc::new(move |event: &Event| listener.record(event)))
            .map_err(|e| HarvestError::TabOperationFailed(format!("Failed to follow downloads: {}", e)))?;

        log::info!("Downloads go to {}", dir.display());
        Ok(tracker)
    }

    /// Claim the session for one harvest run
    pub fn begin_run(&self) -> Result<MutexGuard<'_, ()>> {
        self.run_guard.try_begin()
    }

    /// Get the tool registry
    pub fn tool_registry(&self) -> &ToolRegistry {
        &self.tool_registry
    }

    /// Execute a tool by name
    pub fn execute_tool(&self, name: &str, params: serde_json::Value) -> Result<ToolResult> {
        let mut context = ToolContext::new(self);
        self.tool_registry.execute(name, params, &mut context)
    }

    /// Answer one protocol message
    pub fn handle(&self, request: &HarvestRequest) -> Result<ToolResult> {
        let (tool, params) = request.tool_call();
        log::debug!("Handling {:?} with tool '{}'", request, tool);
        self.execute_tool(tool, params)
    }

    /// Close the browser
    pub fn close(&self) -> Result<()> {
        // headless_chrome closes the browser when `Browser` drops; closing the tabs ends the session early
        let tabs = self.get_tabs()?;
        for tab in tabs {
            let _ = tab.close(false);
        }
        Ok(())
    }
}
