use crate::error::{HarvestError, Result};
use std::time::Duration;
use url::Url;

/// Turn what a user typed into an absolute URL the browser can open.
///
/// A bare host gets `https://`, except loopback hosts which get `http://`.
pub fn normalize_url(input: &str) -> Result<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(HarvestError::InvalidParams("URL is empty".to_string()));
    }

    if let Ok(url) = Url::parse(trimmed) {
        if url.has_host() || matches!(url.scheme(), "about" | "data" | "file") {
            return Ok(url.to_string());
        }
    }

    let candidate = if trimmed.starts_with("localhost") || trimmed.starts_with("127.0.0.1") {
        format!("http://{}", trimmed)
    } else if trimmed.contains('.') && !trimmed.starts_with('.') && !trimmed.starts_with('/') {
        format!("https://{}", trimmed)
    } else {
        return Err(HarvestError::InvalidParams(format!("Not a page URL: {}", trimmed)));
    };

    Url::parse(&candidate)
        .map(|url| url.to_string())
        .map_err(|e| HarvestError::InvalidParams(format!("{}: {}", trimmed, e)))
}

/// Give a freshly loaded single-page app time to render its first view
pub fn render_wait(ms: u64) {
    if ms > 0 {
        log::debug!("Waiting {}ms for the page to render", ms);
        std::thread::sleep(Duration::from_millis(ms));
    }
}
