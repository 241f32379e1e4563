//! Page scraping for the publishing-history, version and build pages.
//!
//! Launchpad markup is stable enough that targeted regexes over the known
//! element ids do the job without a DOM.

use std::sync::LazyLock;

use glix_schema::VersionId;
use regex::Regex;

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static scraping regex is valid")
}

static RESULT_COUNT: LazyLock<Regex> = LazyLock::new(|| re(r"of\s+([\d,]+)\s+results?"));
static TAG_EDGE: LazyLock<Regex> =
    LazyLock::new(|| re(r"<(/?)([A-Za-z][A-Za-z0-9]*)\b[^>]*?(/?)>"));
static ROW: LazyLock<Regex> = LazyLock::new(|| re(r"(?s)<tr\b[^>]*>(.*?)</tr>"));
static ANCHOR: LazyLock<Regex> = LazyLock::new(|| re(r"(?s)<a\b([^>]*)>(.*?)</a>"));
static HREF: LazyLock<Regex> = LazyLock::new(|| re(r#"href\s*=\s*"([^"]*)""#));
static TAG: LazyLock<Regex> = LazyLock::new(|| re(r"(?s)<[^>]*>"));
static PARAGRAPH: LazyLock<Regex> = LazyLock::new(|| re(r"(?s)<p\b[^>]*>(.*?)</p>"));
static LIST: LazyLock<Regex> = LazyLock::new(|| re(r"(?s)<ul\b[^>]*>(.*?)</ul>"));
static FILE_ITEM: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?s)<li\b[^>]*>\s*<a\b([^>]*)>(.*?)</a>([^<]*)"));

/// An architecture-labelled link on a version page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildLink {
    pub href: String,
    pub label: String,
}

/// A downloadable file on a build page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub href: String,
    pub filename: String,
    /// Raw annotation after the link, e.g. `22.6 KiB`.
    pub size_text: String,
}

impl FileEntry {
    /// Debian package name: the filename up to the first `_`.
    pub fn package_name(&self) -> &str {
        self.filename.split('_').next().unwrap_or("")
    }
}

/// Total record count from the batch navigation (`1 → 300 of 1,234 results`).
pub fn parse_result_count(html: &str) -> Option<usize> {
    RESULT_COUNT
        .captures(html)
        .and_then(|c| c[1].replace(',', "").parse().ok())
}

/// Version strings from the publishing-history table, one per row at most.
///
/// Rows whose links contain no valid version (headers, deleted records) are
/// skipped. Order follows the page; deduplication is the caller's job.
pub fn parse_listing_versions(html: &str) -> Vec<String> {
    let Some(table) = element_by_id(html, "publishing-summary") else {
        return Vec::new();
    };

    ROW.captures_iter(table)
        .filter_map(|row| {
            ANCHOR
                .captures_iter(&row[1])
                .map(|a| text_of(&a[2]))
                .find(|t| VersionId::is_valid(t))
        })
        .collect()
}

/// Architecture build links from a version page.
pub fn parse_build_links(html: &str) -> Vec<BuildLink> {
    let Some(section) = element_by_id(html, "source-builds") else {
        return Vec::new();
    };

    let mut links = Vec::new();
    for p in PARAGRAPH.captures_iter(section) {
        for a in ANCHOR.captures_iter(&p[1]) {
            let Some(href) = HREF.captures(&a[1]) else {
                continue;
            };
            let label = text_of(&a[2]);
            if label.is_empty() {
                continue;
            }
            links.push(BuildLink {
                href: decode_entities(&href[1]),
                label,
            });
        }
    }
    links
}

/// Built files from a build page. Empty if the `files` portlet has no list.
pub fn parse_file_entries(html: &str) -> Vec<FileEntry> {
    let Some(list) = element_by_id(html, "files").and_then(|files| LIST.captures(files)) else {
        return Vec::new();
    };

    FILE_ITEM
        .captures_iter(&list[1])
        .filter_map(|item| {
            let href = decode_entities(&HREF.captures(&item[1])?[1]);
            if href.is_empty() {
                return None;
            }
            let filename = crate::filename_from_url(&href).to_string();
            let size_text = item[3]
                .trim()
                .trim_start_matches('(')
                .trim_end_matches(')')
                .trim()
                .to_string();
            Some(FileEntry {
                href,
                filename,
                size_text,
            })
        })
        .collect()
}

/// Convert a `"<number> <unit>"` size annotation to bytes.
///
/// Both `KB` and `KiB` spellings are binary. Empty, malformed or
/// unrecognized input yields 0.
///
/// ```
/// use glix_core::catalog::parse_size;
///
/// assert_eq!(parse_size("22.6 KiB"), 23142);
/// assert_eq!(parse_size("5 XB"), 0);
/// ```
pub fn parse_size(size: &str) -> u64 {
    let cleaned = size.trim().trim_start_matches('(').trim_end_matches(')');
    let parts: Vec<&str> = cleaned.split_whitespace().collect();
    let [number, unit] = parts.as_slice() else {
        return 0;
    };

    let Ok(number) = number.parse::<f64>() else {
        return 0;
    };
    if !number.is_finite() || number < 0.0 {
        return 0;
    }

    let multiplier: u64 = match unit.to_uppercase().as_str() {
        "B" => 1,
        "KB" | "KIB" => 1024,
        "MB" | "MIB" => 1024 * 1024,
        "GB" | "GIB" => 1024 * 1024 * 1024,
        _ => return 0,
    };

    (number * multiplier as f64).round() as u64
}

/// Inner markup of the element carrying `id="<id>"`, up to its own closing
/// tag. Nested elements of the same name are balanced; an unclosed element
/// runs to the end of the document.
fn element_by_id<'a>(html: &'a str, id: &str) -> Option<&'a str> {
    let at = html.find(&format!("id=\"{id}\""))?;
    let open = html[..at].rfind('<')?;

    let mut edges = TAG_EDGE.captures_iter(&html[open..]);
    let first = edges.next()?;
    let name = first.get(2)?.as_str();
    let body = open + first.get(0)?.end();
    let mut depth = 1usize;

    for edge in edges {
        if !edge[2].eq_ignore_ascii_case(name) || &edge[3] == "/" {
            continue;
        }
        if &edge[1] == "/" {
            depth -= 1;
            if depth == 0 {
                return Some(&html[body..open + edge.get(0)?.start()]);
            }
        } else {
            depth += 1;
        }
    }
    Some(&html[body..])
}

fn text_of(fragment: &str) -> String {
    decode_entities(TAG.replace_all(fragment, "").trim())
}

fn decode_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}
