//! [`Page`], [`HeadFetcher`] and [`DownloadSink`] over a live CDP tab.
//!
//! Elements are addressed through the `data-harvest-id` stamp left by the
//! snapshot script, so every interaction first looks the element up again,
//! including inside same-origin frames.

use crate::dom::{DomTree, NodeHandle};
use crate::download::{DownloadRoute, DownloadSink, HeadFetcher, HeadInfo};
use crate::error::{HarvestError, Result};
use crate::page::Page;
use headless_chrome::{Browser, Tab, protocol::cdp::Target::CreateTarget};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

const LOOKUP_JS: &str = include_str!("lookup.js");
const ACTIVATE_JS: &str = include_str!("activate.js");
const MUTATIONS_JS: &str = include_str!("mutations.js");
const HEAD_JS: &str = include_str!("head.js");
const DOWNLOAD_JS: &str = include_str!("download.js");

/// A tab seen through the harvesting interface
#[derive(Clone)]
pub struct CdpPage {
    tab: Arc<Tab>,

    /// Opens background tabs for cross-origin downloads
    browser: Option<Browser>,
}

/// What `head.js` hands back: headers, or the reason fetch refused
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HeadReply {
    Failed { error: String },
    Info(HeadInfo),
}

/// Encode a Rust string as a JavaScript string literal
fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

fn selector(handle: NodeHandle) -> String {
    format!("[data-harvest-id=\"{}\"]", handle.0)
}

impl CdpPage {
    pub fn new(tab: Arc<Tab>) -> Self {
        Self { tab, browser: None }
    }

    /// Builder method: let downloads open tabs of their own in `browser`
    pub fn with_browser(mut self, browser: Browser) -> Self {
        self.browser = Some(browser);
        self
    }

    pub fn tab(&self) -> &Arc<Tab> {
        &self.tab
    }

    fn evaluate(&self, js: &str, await_promise: bool) -> Result<Value> {
        let result = self.tab.evaluate(js, await_promise).map_err(|e| HarvestError::EvaluationFailed(e.to_string()))?;
        result.value.ok_or_else(|| HarvestError::EvaluationFailed("No value returned from script".to_string()))
    }

    /// Run `body` with `el` bound to the element behind `handle`
    fn with_element(&self, handle: NodeHandle, body: &str) -> Result<Value> {
        let js = format!(
            "(function () {{ {} {} const el = harvestElement({}); {} }})()",
            LOOKUP_JS, ACTIVATE_JS, handle.0, body
        );
        self.evaluate(&js, false)
    }

    /// Navigate a fresh background tab to `url`; the download outlives the tab's blank page
    fn download_in_new_tab(&self, browser: &Browser, url: &str) -> Result<()> {
        browser
            .new_tab_with_options(CreateTarget {
                url: url.to_string(),
                left: None,
                top: None,
                width: None,
                height: None,
                window_state: None,
                browser_context_id: None,
                enable_begin_frame_control: None,
                new_window: None,
                background: Some(true),
                for_tab: None,
                hidden: None,
            })
            .map_err(|e| HarvestError::DownloadFailed(format!("{}: {}", url, e)))?;

        log::debug!("Started cross-origin download of {} in a background tab", url);
        Ok(())
    }

    /// Last resort: a real mouse click dispatched through CDP
    fn cdp_click(&self, handle: NodeHandle) -> Result<()> {
        let element = self
            .tab
            .find_element(&selector(handle))
            .map_err(|e| HarvestError::ElementNotFound(format!("{}: {}", handle, e)))?;
        element.click().map_err(|e| HarvestError::interaction(format!("click {}", handle), e))?;
        Ok(())
    }
}

impl Page for CdpPage {
    fn snapshot(&self) -> Result<DomTree> {
        DomTree::from_tab(&self.tab)
    }

    fn activate(&self, handle: NodeHandle) -> Result<()> {
        let outcome = self.with_element(handle, "return activate(el);")?;
        match outcome.as_str() {
            Some("missing") => Err(HarvestError::ElementNotFound(handle.to_string())),
            Some("failed") | None => {
                log::debug!("Scripted activation of {} failed, clicking through CDP", handle);
                self.cdp_click(handle)
            }
            Some(how) => {
                log::debug!("Activated {} ({})", handle, how);
                Ok(())
            }
        }
    }

    fn scroll_into_view(&self, handle: NodeHandle) -> Result<()> {
        let found = self.with_element(
            handle,
            "if (!el) { return false; } el.scrollIntoView({ block: 'center', inline: 'nearest' }); return true;",
        )?;
        if found.as_bool() == Some(true) {
            Ok(())
        } else {
            Err(HarvestError::ElementNotFound(handle.to_string()))
        }
    }

    fn dismiss_menus(&self) -> Result<()> {
        self.tab
            .press_key("Escape")
            .map_err(|e| HarvestError::interaction("press Escape", e))?;
        Ok(())
    }

    fn mutation_count(&self) -> Result<u64> {
        let count = self.evaluate(MUTATIONS_JS, false)?;
        count
            .as_u64()
            .or_else(|| count.as_f64().map(|f| f as u64))
            .ok_or_else(|| HarvestError::EvaluationFailed(format!("Unexpected mutation count: {}", count)))
    }
}

impl HeadFetcher for CdpPage {
    fn head(&self, url: &str) -> Result<HeadInfo> {
        let js = format!("({})({})", HEAD_JS.trim(), js_string(url));
        let reply = self.evaluate(&js, true).map_err(|e| HarvestError::HeadFailed(e.to_string()))?;
        let json = reply
            .as_str()
            .ok_or_else(|| HarvestError::HeadFailed(format!("Unexpected HEAD reply: {}", reply)))?;

        match serde_json::from_str(json).map_err(|e| HarvestError::HeadFailed(e.to_string()))? {
            HeadReply::Info(info) => Ok(info),
            HeadReply::Failed { error } => Err(HarvestError::HeadFailed(error)),
        }
    }
}

impl DownloadSink for CdpPage {
    fn start_download(&self, url: &str, filename: Option<&str>) -> Result<()> {
        let route = DownloadRoute::for_target(&self.tab.get_url(), url);
        if let (DownloadRoute::NewTab, Some(browser)) = (route, &self.browser) {
            // Chrome ignores the suggested name across origins; the response headers decide
            return self.download_in_new_tab(browser, url);
        }

        let js = format!(
            "({})({}, {}, {})",
            DOWNLOAD_JS.trim(),
            js_string(url),
            filename.map_or_else(|| "null".to_string(), js_string),
            route == DownloadRoute::NewTab
        );
        self.evaluate(&js, false).map_err(|e| HarvestError::DownloadFailed(format!("{}: {}", url, e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_js_string_escapes() {
        assert_eq!(js_string("a\"b"), r#""a\"b""#);
        assert_eq!(js_string("x</script>"), r#""x</script>""#);
    }

    #[test]
    fn test_selector() {
        assert_eq!(selector(NodeHandle(42)), r#"[data-harvest-id="42"]"#);
    }

    #[test]
    fn test_head_reply_shapes() {
        let info: HeadReply =
            serde_json::from_str(r#"{"ok":true,"status":200,"contentDisposition":null,"contentType":"text/csv"}"#)
                .unwrap();
        assert!(matches!(info, HeadReply::Info(HeadInfo { ok: true, status: 200, .. })));

        let failed: HeadReply = serde_json::from_str(r#"{"error":"Failed to fetch"}"#).unwrap();
        assert!(matches!(failed, HeadReply::Failed { error } if error == "Failed to fetch"));
    }
}
