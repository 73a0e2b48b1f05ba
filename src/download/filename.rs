//! Filename inference for downloads and list labels.

use super::HeadInfo;
use std::borrow::Cow;
use url::Url;

/// Content types with a well-known extension. `application/octet-stream` says nothing.
const MIME_EXTENSIONS: &[(&str, &str)] = &[
    ("application/pdf", ".pdf"),
    ("application/msword", ".doc"),
    ("application/vnd.openxmlformats-officedocument.wordprocessingml.document", ".docx"),
    ("application/vnd.ms-powerpoint", ".ppt"),
    ("application/vnd.openxmlformats-officedocument.presentationml.presentation", ".pptx"),
    ("application/vnd.ms-excel", ".xls"),
    ("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet", ".xlsx"),
    ("text/plain", ".txt"),
    ("application/zip", ".zip"),
    ("application/x-rar-compressed", ".rar"),
    ("application/x-7z-compressed", ".7z"),
    ("text/csv", ".csv"),
    ("audio/mpeg", ".mp3"),
    ("video/mp4", ".mp4"),
    ("image/jpeg", ".jpg"),
    ("image/png", ".png"),
    ("image/gif", ".gif"),
    ("application/octet-stream", ""),
];

const DISPOSITION_PARAM: &str = "response-content-disposition";
const NAME_PARAMS: &[&str] = &["filename", "file", "name"];
const FALLBACK_STEM: &str = "download";
const UNNAMED: &str = "Unnamed file";

/// Percent-decode, keeping the input when it does not decode to UTF-8
fn decode(raw: &str) -> String {
    urlencoding::decode(raw).map(Cow::into_owned).unwrap_or_else(|_| raw.to_string())
}

fn strip_quotes(value: &str) -> &str {
    value.trim().trim_matches(|c| c == '"' || c == '\'')
}

/// Ends in `.` followed by ASCII letters or digits
fn has_extension(name: &str) -> bool {
    match name.rsplit_once('.') {
        Some((_, ext)) => !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()),
        None => false,
    }
}

/// Extension registered for a `Content-Type` value (parameters ignored)
pub fn mime_extension(content_type: &str) -> Option<&'static str> {
    let essence = content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    MIME_EXTENSIONS
        .iter()
        .find(|(mime, _)| *mime == essence)
        .map(|(_, ext)| *ext)
        .filter(|ext| !ext.is_empty())
}

/// Filename from a `Content-Disposition` header.
///
/// `filename*` wins over `filename`; a charset/language prefix such as
/// `UTF-8''` is dropped. The value is percent-decoded, unquoted, and `+`
/// becomes a space.
pub fn content_disposition_filename(header: &str) -> Option<String> {
    let params: Vec<(String, &str)> = header
        .split(';')
        .filter_map(|part| part.split_once('='))
        .map(|(key, value)| (key.trim().to_ascii_lowercase(), value))
        .collect();

    let extended = params.iter().find(|(key, _)| key == "filename*").map(|(_, value)| {
        let value = strip_quotes(value);
        match value.splitn(3, '\'').collect::<Vec<_>>().as_slice() {
            [_charset, _lang, name] => *name,
            _ => value,
        }
    });
    let raw = extended.or_else(|| params.iter().find(|(key, _)| key == "filename").map(|(_, v)| *v))?;

    let name = strip_quotes(&decode(strip_quotes(raw))).replace('+', " ");
    (!name.is_empty()).then_some(name)
}

/// `filename=` inside the `response-content-disposition` query parameter of signed CDN links
fn query_disposition_filename(url: &Url) -> Option<String> {
    let (_, disposition) = url.query_pairs().find(|(key, _)| key == DISPOSITION_PARAM)?;
    let lower = disposition.to_ascii_lowercase();
    let start = lower.find("filename=")? + "filename=".len();

    let value = disposition[start..].trim_start_matches(['"', '\'']);
    let end = value.find(['"', '\'', ';']).unwrap_or(value.len());
    let name = value[..end].trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// Last path segment, percent-decoded
fn last_segment(url: &Url) -> String {
    let segment = url.path_segments().and_then(|mut s| s.next_back()).unwrap_or_default();
    decode(segment)
}

/// Last segment of a string that does not parse as a URL
fn raw_last_segment(raw: &str) -> &str {
    let tail = raw.rsplit('/').next().unwrap_or(raw);
    tail.split('?').next().unwrap_or(tail)
}

/// Extension hinted by `filename`, `file` or `name` query parameters
fn query_extension(url: &Url) -> Option<String> {
    let hint = NAME_PARAMS.iter().find_map(|param| {
        url.query_pairs()
            .find(|(key, _)| key == param)
            .map(|(_, value)| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })?;
    if !has_extension(&hint) {
        return None;
    }
    hint.rsplit('.').next().map(str::to_string)
}

/// Name to save `url` under, or `None` to let the download mechanism pick one.
///
/// Tiers, first non-empty wins: the HEAD response's `Content-Disposition`;
/// its `Content-Type` mapped to an extension and appended to the last path
/// segment; the `response-content-disposition` query parameter; the last path
/// segment. A result without an extension finally borrows one from a
/// `filename`/`file`/`name` query parameter.
pub fn infer_filename(url: &str, head: Option<&HeadInfo>) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok();
    let head = head.filter(|h| h.ok);

    let from_head = head.and_then(|h| {
        let by_disposition = h.content_disposition.as_deref().and_then(content_disposition_filename);
        by_disposition.or_else(|| {
            let ext = h.content_type.as_deref().and_then(mime_extension)?;
            let mut base = parsed.as_ref().map(last_segment).unwrap_or_default();
            if base.is_empty() {
                base = FALLBACK_STEM.to_string();
            }
            if !has_extension(&base) {
                base.push_str(ext);
            }
            Some(base.replace('+', " "))
        })
    });

    let mut filename = match (from_head, &parsed) {
        (Some(name), _) => name,
        (None, Some(parsed)) => query_disposition_filename(parsed)
            .map(|name| decode(&name))
            .unwrap_or_else(|| last_segment(parsed)),
        (None, None) => raw_last_segment(url).to_string(),
    };

    if !filename.is_empty() && !has_extension(&filename) {
        if let Some(ext) = parsed.as_ref().and_then(query_extension) {
            log::debug!("Borrowed extension .{} from query for {}", ext, url);
            filename = format!("{}.{}", filename, ext);
        }
    }

    (!filename.is_empty()).then_some(filename)
}

/// Human label for a discovered file URL
pub fn display_name(url: &str) -> String {
    let name = match Url::parse(url.trim()) {
        Ok(parsed) => {
            let segment = parsed.path_segments().and_then(|mut s| s.next_back()).unwrap_or_default();
            query_disposition_filename(&parsed).unwrap_or_else(|| segment.to_string())
        }
        Err(_) => match raw_last_segment(url) {
            "" => url.to_string(),
            tail => tail.to_string(),
        },
    };

    let name = decode(&name).replace('+', " ");
    if name.trim().is_empty() { UNNAMED.to_string() } else { name }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head(disposition: Option<&str>, content_type: Option<&str>) -> HeadInfo {
        HeadInfo {
            ok: true,
            status: 200,
            content_disposition: disposition.map(str::to_string),
            content_type: content_type.map(str::to_string),
        }
    }

    #[test]
    fn test_disposition_header() {
        assert_eq!(content_disposition_filename("attachment; filename=\"Week 1.pdf\"").as_deref(), Some("Week 1.pdf"));
        assert_eq!(content_disposition_filename("inline; FILENAME=notes+v2.docx").as_deref(), Some("notes v2.docx"));
        assert_eq!(
            content_disposition_filename("attachment; filename=\"fallback.pdf\"; filename*=UTF-8''R%C3%A9sum%C3%A9.pdf")
                .as_deref(),
            Some("Résumé.pdf")
        );
        assert_eq!(content_disposition_filename("attachment"), None);
        assert_eq!(content_disposition_filename("attachment; filename=\"\""), None);
    }

    #[test]
    fn test_mime_table() {
        assert_eq!(mime_extension("application/pdf"), Some(".pdf"));
        assert_eq!(mime_extension("Text/CSV; charset=utf-8"), Some(".csv"));
        assert_eq!(mime_extension("application/octet-stream"), None);
        assert_eq!(mime_extension("application/json"), None);
    }

    #[test]
    fn test_head_disposition_wins() {
        let info = head(Some("attachment; filename=\"Lecture%203.pptx\""), Some("application/pdf"));
        assert_eq!(
            infer_filename("https://lms.test/bbcswebdav/xid-1_1", Some(&info)).as_deref(),
            Some("Lecture 3.pptx")
        );
    }

    #[test]
    fn test_head_content_type_appends_extension() {
        let info = head(None, Some("application/pdf"));
        assert_eq!(infer_filename("https://lms.test/bbcswebdav/xid-1_1", Some(&info)).as_deref(), Some("xid-1_1.pdf"));
        assert_eq!(infer_filename("https://lms.test/", Some(&info)).as_deref(), Some("download.pdf"));
        assert_eq!(
            infer_filename("https://lms.test/files/My+Notes.docx", Some(&info)).as_deref(),
            Some("My Notes.docx")
        );
    }

    #[test]
    fn test_failed_head_is_ignored() {
        let mut info = head(Some("attachment; filename=ignored.pdf"), None);
        info.ok = false;
        info.status = 403;
        assert_eq!(infer_filename("https://lms.test/files/real.pdf", Some(&info)).as_deref(), Some("real.pdf"));
    }

    #[test]
    fn test_cdn_query_disposition() {
        let url = "https://x.blackboardcdn.com/file?response-content-disposition=attachment%3Bfilename%3D%22a.pdf%22";
        assert_eq!(infer_filename(url, None).as_deref(), Some("a.pdf"));
        assert_eq!(display_name(url), "a.pdf");
    }

    #[test]
    fn test_last_segment_and_query_extension() {
        assert_eq!(infer_filename("https://lms.test/files/Week%201.pdf?x=1", None).as_deref(), Some("Week 1.pdf"));
        assert_eq!(
            infer_filename("https://lms.test/webapps/fileCacheDownload?filename=report.xlsx", None).as_deref(),
            Some("fileCacheDownload.xlsx")
        );
        assert_eq!(
            infer_filename("https://lms.test/blob/123?name=&file=slides.PPTX", None).as_deref(),
            Some("123.PPTX")
        );
    }

    #[test]
    fn test_empty_name_lets_browser_choose() {
        assert_eq!(infer_filename("https://lms.test/", None), None);
        assert_eq!(infer_filename("https://lms.test/?filename=a.pdf", None), None);
    }

    #[test]
    fn test_unparseable_url() {
        assert_eq!(infer_filename("files/plain.txt?dl=1", None).as_deref(), Some("plain.txt"));
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("https://lms.test/files/Lab+Sheet%202.pdf"), "Lab Sheet 2.pdf");
        assert_eq!(display_name("https://lms.test/"), "Unnamed file");
        assert_eq!(display_name("not a url/thing.doc?x"), "thing.doc");
    }
}
