//! Stable identity keys for postings.

use url::Url;

use crate::models::compute_hash;

/// Query parameters that only carry attribution and never select content.
const TRACKING_PARAMS: &[&str] = &[
    "ref",
    "refid",
    "trk",
    "trackingid",
    "fbclid",
    "gclid",
    "source",
    "src",
];

fn is_tracking_param(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    name.starts_with("utm_") || TRACKING_PARAMS.contains(&name.as_str())
}

/// Canonical form of a posting URL.
///
/// Unparseable input falls back to its trimmed, lowercased text.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(url) = Url::parse(trimmed) else {
        return trimmed.to_lowercase();
    };
    if !url.has_host() {
        return trimmed.to_lowercase();
    }

    let host = url
        .host_str()
        .map(|h| h.to_ascii_lowercase())
        .unwrap_or_default();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();

    let path = url.path().trim_end_matches('/').to_string();

    let mut out = format!("https://{host}");
    if let Some(port) = url.port().filter(|p| *p != 80 && *p != 443) {
        out.push_str(&format!(":{port}"));
    }
    out.push_str(&path);
    if !pairs.is_empty() {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs.iter())
            .finish();
        out.push('?');
        out.push_str(&query);
    }
    out
}

/// Lowercase, collapse every non-alphanumeric run to one space, trim.
pub fn normalize_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut gap = false;
    for c in raw.chars() {
        if c.is_alphanumeric() {
            if gap && !out.is_empty() {
                out.push(' ');
            }
            gap = false;
            out.extend(c.to_lowercase());
        } else {
            gap = true;
        }
    }
    out
}

/// Identity key for a posting, or `None` when there is not enough to build one.
///
/// Keyed by `(source, normalized url)` when a url exists, else by
/// `(source, title, company, location)`, all three required.
pub fn identity_key(
    source: &str,
    url: Option<&str>,
    title: &str,
    company: &str,
    location: &str,
) -> Option<String> {
    if let Some(url) = url.map(str::trim).filter(|u| !u.is_empty()) {
        return Some(compute_hash(&format!("url|{source}|{}", normalize_url(url))));
    }

    let (title, company, location) = (
        normalize_text(title),
        normalize_text(company),
        normalize_text(location),
    );
    if title.is_empty() || company.is_empty() || location.is_empty() {
        return None;
    }
    Some(compute_hash(&format!("tcl|{source}|{title}|{company}|{location}")))
}
