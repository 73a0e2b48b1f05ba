//! URL classification: decides whether a link points at a file worth downloading.
//!
//! Rules are evaluated in a fixed order and the first match wins. Navigation
//! surfaces are excluded before any inclusion rule is consulted, so a profile
//! page ending in `.html` is still navigation.

use url::Url;

/// Extensions treated as downloadable documents, archives, media and images
pub const FILE_EXTENSIONS: &[&str] = &[
    ".pdf", ".doc", ".docx", ".ppt", ".pptx", ".xls", ".xlsx", ".txt", ".zip", ".rar", ".7z", ".csv", ".mp3",
    ".mp4", ".jpg", ".jpeg", ".png", ".gif", ".webp", ".html", ".htm", ".rtf", ".odt", ".ods", ".odp",
];

/// Extensions that mark an item as file-like when judging menu triggers
pub const DOCUMENT_EXTENSIONS: &[&str] = &[
    ".pdf", ".doc", ".docx", ".ppt", ".pptx", ".xls", ".xlsx", ".zip", ".rar", ".7z", ".mp4", ".mp3", ".csv",
];

/// Path fragments of application surfaces that never serve files
const NAVIGATION_PATTERNS: &[&str] = &[
    "/ultra/institution-page",
    "/ultra/profile",
    "/ultra/stream",
    "/ultra/calendar",
    "/ultra/messages",
    "/ultra/grades",
    "/ultra/tools",
    "/ultra/logout",
    "/groups/enrollments",
    "/achievements",
];

/// Course sub-pages that are navigation rather than content
const COURSE_NAVIGATION_PATTERNS: &[&str] = &[
    "/outline",
    "/roster",
    "/description",
    "/attendancegrade",
    "/booksandtools",
    "/announcements",
    "/engagement",
];

const CDN_HOST: &str = "blackboardcdn.com";
const DISPOSITION_PARAM: &str = "response-content-disposition";
const CACHE_DOWNLOAD: &str = "filecachedownload";
const COURSE_CONTENT_PREFIX: &str = "/ultra/course";

/// Outcome of classifying a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Points at a downloadable resource
    File,
    /// A known navigation surface
    Excluded,
    /// No rule matched
    Unmatched,
}

impl Classification {
    pub fn is_file(self) -> bool {
        self == Classification::File
    }
}

/// Classify an absolute URL
pub fn classify(url: &str) -> Classification {
    classify_with_base(url, None)
}

/// Classify a possibly-relative URL, resolving it against `base` first
pub fn classify_with_base(url: &str, base: Option<&Url>) -> Classification {
    match parse(url, base) {
        Some(parsed) => classify_parsed(&parsed),
        None => classify_raw(url),
    }
}

/// Shorthand for `classify(url).is_file()`
pub fn is_likely_file_url(url: &str) -> bool {
    classify(url).is_file()
}

fn parse(url: &str, base: Option<&Url>) -> Option<Url> {
    let url = url.trim();
    match base {
        Some(base) => base.join(url).ok(),
        None => Url::parse(url).ok(),
    }
}

fn classify_parsed(url: &Url) -> Classification {
    let path = url.path().to_ascii_lowercase();
    let href = url.as_str().to_ascii_lowercase();

    if NAVIGATION_PATTERNS.iter().any(|p| path.contains(p)) {
        log::debug!("Excluded navigation URL: {}", href);
        return Classification::Excluded;
    }

    if has_file_extension(&path) {
        log::debug!("Included file with extension: {}", href);
        return Classification::File;
    }

    if href.contains(CDN_HOST) && cdn_disposition_matches(url) {
        log::debug!("Included CDN URL: {}", href);
        return Classification::File;
    }

    if path.contains("/outline/file/") {
        log::debug!("Included outline file URL: {}", href);
        return Classification::File;
    }

    let is_file_store = path.contains("/bbcswebdav/")
        || path.contains("/xid-")
        || (path.contains("/courses/") && path.contains("/file/"))
        || href.contains(CACHE_DOWNLOAD);
    if is_file_store {
        log::debug!("Included file store URL: {}", href);
        return Classification::File;
    }

    if path.contains(COURSE_CONTENT_PREFIX) {
        if COURSE_NAVIGATION_PATTERNS.iter().any(|p| path.contains(p)) {
            log::debug!("Excluded course navigation URL: {}", href);
            return Classification::Excluded;
        }
        log::debug!("Included potential course content URL: {}", href);
        return Classification::File;
    }

    Classification::Unmatched
}

fn cdn_disposition_matches(url: &Url) -> bool {
    url.query_pairs()
        .find(|(k, _)| k == DISPOSITION_PARAM)
        .map(|(_, v)| v.to_ascii_lowercase())
        .is_some_and(|v| v.contains("attachment") || v.contains("inline"))
}

/// Substring checks for strings that do not parse as URLs
fn classify_raw(url: &str) -> Classification {
    log::debug!("Classifying unparseable URL: {}", url);
    let lower = url.trim().to_ascii_lowercase();

    let known = [CDN_HOST, "/outline/file/", "/bbcswebdav/", "/xid-", CACHE_DOWNLOAD];
    if known.iter().any(|p| lower.contains(p)) || has_file_extension(&lower) {
        Classification::File
    } else {
        Classification::Unmatched
    }
}

fn has_file_extension(path: &str) -> bool {
    FILE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Lower-cased address ends in one of [`DOCUMENT_EXTENSIONS`]
pub fn has_document_extension(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    DOCUMENT_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Resolve `raw` against `base` and serialize it in canonical form.
///
/// Returns `None` for empty and `javascript:` addresses. Addresses that do not
/// parse are returned trimmed and otherwise untouched.
pub fn normalize_url(raw: &str, base: Option<&Url>) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.to_ascii_lowercase().starts_with("javascript:") {
        return None;
    }

    match parse(trimmed, base) {
        Some(url) => Some(url.to_string()),
        None => Some(trimmed.to_string()),
    }
}
