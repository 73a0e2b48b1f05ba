//! Starting downloads for discovered URLs.
//!
//! The HEAD request and the download itself belong to the host (the browser),
//! so both are collaborator traits. Everything in between is filename inference.

pub mod filename;

pub use filename::{content_disposition_filename, display_name, infer_filename, mime_extension};

use crate::error::Result;
use serde::{Deserialize, Serialize};
use url::Url;

/// The parts of a HEAD response that feed filename inference
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadInfo {
    /// Status was 2xx
    pub ok: bool,
    pub status: u16,
    #[serde(default)]
    pub content_disposition: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
}

/// Issues a credentialed HEAD request for a URL
pub trait HeadFetcher {
    fn head(&self, url: &str) -> Result<HeadInfo>;
}

/// Hands a URL to the browser's download manager
pub trait DownloadSink {
    /// Start downloading `url`. `None` lets the browser pick the name.
    fn start_download(&self, url: &str, filename: Option<&str>) -> Result<()>;
}

/// Where a download gets started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadRoute {
    /// A `download` anchor clicked inside the page
    Anchor,
    /// A background tab of its own, so the response cannot navigate the page away
    NewTab,
}

impl DownloadRoute {
    /// Pick the route for `target` as seen from a page at `page_url`.
    ///
    /// Chrome honours the `download` attribute only for same-origin, `blob:`
    /// and `data:` URLs; anything else is a plain navigation of the page.
    pub fn for_target(page_url: &str, target: &str) -> Self {
        let page = Url::parse(page_url).ok();
        let resolved = match &page {
            Some(page) => page.join(target).ok(),
            None => Url::parse(target).ok(),
        };

        match (page, resolved) {
            (_, Some(target)) if matches!(target.scheme(), "blob" | "data") => Self::Anchor,
            (Some(page), Some(target)) if page.origin() == target.origin() => Self::Anchor,
            (_, Some(_)) => Self::NewTab,
            // Unresolvable here; the page resolves it against its own base
            (_, None) => Self::Anchor,
        }
    }
}

/// Request headers, name and start one download. Returns the name that was used.
///
/// A failed HEAD request only costs the name its best source; a failure to start the
/// download is returned.
pub fn download_file<H, D>(fetcher: &H, sink: &D, url: &str) -> Result<Option<String>>
where
    H: HeadFetcher + ?Sized,
    D: DownloadSink + ?Sized,
{
    let head = match fetcher.head(url) {
        Ok(head) => Some(head),
        Err(e) => {
            log::debug!("HEAD request failed or blocked for {}, using URL heuristics: {}", url, e);
            None
        }
    };

    let filename = infer_filename(url, head.as_ref());
    sink.start_download(url, filename.as_deref())?;
    log::info!("Download initiated for {} as {}", url, filename.as_deref().unwrap_or("<browser default>"));
    Ok(filename)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HarvestError;
    use std::cell::RefCell;

    struct FixedHead(Option<HeadInfo>);

    impl HeadFetcher for FixedHead {
        fn head(&self, _url: &str) -> Result<HeadInfo> {
            self.0.clone().ok_or_else(|| HarvestError::HeadFailed("blocked by CORS".to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        started: RefCell<Vec<(String, Option<String>)>>,
        fail: bool,
    }

    impl DownloadSink for RecordingSink {
        fn start_download(&self, url: &str, filename: Option<&str>) -> Result<()> {
            if self.fail {
                return Err(HarvestError::DownloadFailed(url.to_string()));
            }
            self.started.borrow_mut().push((url.to_string(), filename.map(str::to_string)));
            Ok(())
        }
    }

    #[test]
    fn test_head_info_wire_shape() {
        let info: HeadInfo =
            serde_json::from_str(r#"{"ok":true,"status":200,"contentType":"application/pdf","contentDisposition":null}"#)
                .unwrap();
        assert!(info.ok);
        assert_eq!(info.content_type.as_deref(), Some("application/pdf"));
        assert_eq!(info.content_disposition, None);
    }

    #[test]
    fn test_download_uses_head() {
        let fetcher = FixedHead(Some(HeadInfo {
            ok: true,
            status: 200,
            content_disposition: Some("attachment; filename=\"Syllabus.pdf\"".into()),
            content_type: None,
        }));
        let sink = RecordingSink::default();

        let name = download_file(&fetcher, &sink, "https://lms.test/bbcswebdav/xid-7_1").unwrap();

        assert_eq!(name.as_deref(), Some("Syllabus.pdf"));
        assert_eq!(
            sink.started.borrow().as_slice(),
            &[("https://lms.test/bbcswebdav/xid-7_1".to_string(), Some("Syllabus.pdf".to_string()))]
        );
    }

    #[test]
    fn test_head_failure_degrades_name_only() {
        let sink = RecordingSink::default();
        let name = download_file(&FixedHead(None), &sink, "https://lms.test/files/a.docx").unwrap();
        assert_eq!(name.as_deref(), Some("a.docx"));
        assert_eq!(sink.started.borrow().len(), 1);
    }

    #[test]
    fn test_same_origin_downloads_stay_in_page() {
        let page = "https://lms.test/ultra/courses/_1_1/outline";
        assert_eq!(DownloadRoute::for_target(page, "https://lms.test/bbcswebdav/a.pdf"), DownloadRoute::Anchor);
        assert_eq!(DownloadRoute::for_target(page, "/bbcswebdav/a.pdf"), DownloadRoute::Anchor);
        assert_eq!(DownloadRoute::for_target(page, "blob:https://lms.test/5f1c"), DownloadRoute::Anchor);
        assert_eq!(DownloadRoute::for_target(page, "data:text/plain,hi"), DownloadRoute::Anchor);
    }

    #[test]
    fn test_cross_origin_downloads_get_their_own_tab() {
        let page = "https://lms.test/ultra/courses/_1_1/outline";
        let cdn = "https://cdn.lms-files.test/1/a.pdf?response-content-disposition=attachment";
        assert_eq!(DownloadRoute::for_target(page, cdn), DownloadRoute::NewTab);
        assert_eq!(DownloadRoute::for_target(page, "http://lms.test/a.pdf"), DownloadRoute::NewTab);
        assert_eq!(DownloadRoute::for_target("about:blank", "https://lms.test/a.pdf"), DownloadRoute::NewTab);
    }

    #[test]
    fn test_sink_failure_is_reported() {
        let sink = RecordingSink { fail: true, ..Default::default() };
        let err = download_file(&FixedHead(None), &sink, "https://lms.test/a.pdf").unwrap_err();
        assert!(matches!(err, HarvestError::DownloadFailed(_)));
    }
}
