//! Anti-bot response classification.
//!
//! Pure heuristics, no I/O. A 200 can still be a challenge page, so the
//! escalation controller consults this on every successful fetch. The
//! transport consults [`check_rejection`] on 401, 403 and 429 answers
//! before reporting them as plain HTTP errors.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::traits::FetchResponse;

/// Markers that identify a challenge page on their own.
const CHALLENGE_MARKERS: &[&str] = &[
    "cf-browser-verification",
    "cf_chl_",
    "cf-challenge",
    "challenge-platform",
    "just a moment...",
    "attention required! | cloudflare",
    "checking your browser before accessing",
    "sorry, you have been blocked",
    "you have been blocked",
    "px-captcha",
    "perimeterx",
    "captcha-delivery.com",
    "datadome",
    "_incapsula_resource",
    "request unsuccessful. incapsula",
    "distil_r_captcha",
    "verify you are a human",
    "verify you are human",
    "access to this page has been denied",
    "please enable js and disable any ad blocker",
];

/// Phrases that only count on small pages; real listings can mention them.
const BLOCK_PHRASES: &[&str] = &[
    "captcha",
    "access denied",
    "unusual traffic",
    "are you a robot",
    "not a robot",
    "too many requests",
    "temporarily blocked",
    "request blocked",
];

/// Path segments of known challenge/interstitial endpoints.
const CHALLENGE_SEGMENTS: &[&str] = &[
    "captcha",
    "challenge",
    "challenge-platform",
    "sorry",
    "blocked",
];

/// Segment prefixes for endpoints that append a token to a fixed stem.
const CHALLENGE_SEGMENT_PREFIXES: &[&str] = &["distil_r_", "cf_chl_"];

/// Bodies at or above this size are judged by strong markers only.
const WEAK_MARKER_LIMIT: usize = 20 * 1024;

/// What kind of payload a strategy expects, which sets the floor for body size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageKind {
    Feed,
    Api,
    Document,
    Rendered,
}

impl PageKind {
    pub fn min_body_len(&self) -> usize {
        match self {
            PageKind::Feed => 64,
            PageKind::Api => 2,
            PageKind::Document | PageKind::Rendered => 512,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    ChallengeMarker(&'static str),
    BlockPhrase(&'static str),
    ShortBody { len: usize, min: usize },
    RedirectTrap(String),
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::ChallengeMarker(m) => write!(f, "challenge marker '{m}'"),
            BlockReason::BlockPhrase(p) => write!(f, "block phrase '{p}'"),
            BlockReason::ShortBody { len, min } => {
                write!(f, "body of {len} bytes is below the {min}-byte floor")
            }
            BlockReason::RedirectTrap(target) => write!(f, "redirect trap at {target}"),
        }
    }
}

/// Returns true if `status` + `body` look like an anti-bot response for a
/// content page.
pub fn is_blocked(status: u16, body: &str) -> bool {
    classify(status, body, None, PageKind::Document).is_some()
}

/// Full classification for a fetched response.
pub fn check_response(response: &FetchResponse, kind: PageKind) -> Option<BlockReason> {
    classify(
        response.status,
        &response.body,
        Some(&response.final_url),
        kind,
    )
}

/// Classify a 401, 403 or 429 answer. Any other status yields `None`.
///
/// 401 and 403 are judged like a document page, so an empty or challenge
/// body is a block. A 429 stays a retryable rate limit unless it carries a
/// strong challenge marker.
pub fn check_rejection(response: &FetchResponse) -> Option<BlockReason> {
    match response.status {
        401 | 403 => check_response(response, PageKind::Document),
        429 => {
            let lower = response.body.to_lowercase();
            CHALLENGE_MARKERS
                .iter()
                .copied()
                .find(|m| lower.contains(m))
                .map(BlockReason::ChallengeMarker)
        }
        _ => None,
    }
}

fn is_challenge_path(path: &str) -> bool {
    path.split('/').filter(|s| !s.is_empty()).any(|segment| {
        CHALLENGE_SEGMENTS.contains(&segment)
            || CHALLENGE_SEGMENT_PREFIXES.iter().any(|p| segment.starts_with(p))
    })
}

pub fn classify(
    status: u16,
    body: &str,
    final_url: Option<&str>,
    kind: PageKind,
) -> Option<BlockReason> {
    if (300..400).contains(&status) {
        return Some(BlockReason::RedirectTrap(
            final_url.unwrap_or("<unknown>").to_string(),
        ));
    }

    if let Some(url) = final_url {
        let path = url::Url::parse(url)
            .map(|u| u.path().to_lowercase())
            .unwrap_or_default();
        if is_challenge_path(&path) {
            return Some(BlockReason::RedirectTrap(url.to_string()));
        }
    }

    let lower = body.to_lowercase();
    if let Some(marker) = CHALLENGE_MARKERS.iter().copied().find(|m| lower.contains(m)) {
        return Some(BlockReason::ChallengeMarker(marker));
    }

    if body.len() < WEAK_MARKER_LIMIT
        && let Some(phrase) = BLOCK_PHRASES.iter().copied().find(|p| lower.contains(p))
    {
        return Some(BlockReason::BlockPhrase(phrase));
    }

    let judged_on_size = (200..300).contains(&status) || matches!(status, 401 | 403 | 429);
    let len = body.trim().len();
    let min = kind.min_body_len();
    if judged_on_size && len < min {
        return Some(BlockReason::ShortBody { len, min });
    }

    None
}
