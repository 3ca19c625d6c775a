//! Text utilities for video metadata
//!
//! Small parsing helpers shared by the platform client and the enrichment
//! pipeline: ISO-8601 duration parsing, hashtag extraction and removal,
//! and query-language detection for search localization.

use regex::Regex;
use std::sync::OnceLock;

fn duration_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^PT(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?$").unwrap())
}

fn hashtag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#[\w\-]+").unwrap())
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// Parses an ISO-8601 duration string (e.g. "PT3M34S") into seconds.
///
/// Returns None for empty or malformed input. Durations longer than a day
/// are not produced by the platform and are not supported.
pub fn parse_iso8601_duration(duration: &str) -> Option<u32> {
    if duration.is_empty() {
        return None;
    }

    let caps = duration_re().captures(duration)?;
    let hours: u32 = caps.get(1).map_or(0, |m| m.as_str().parse().unwrap_or(0));
    let minutes: u32 = caps.get(2).map_or(0, |m| m.as_str().parse().unwrap_or(0));
    let seconds: u32 = caps.get(3).map_or(0, |m| m.as_str().parse().unwrap_or(0));

    Some(hours * 3600 + minutes * 60 + seconds)
}

/// Extracts hashtags from free text.
///
/// Tags are returned without the leading `#`, lowercased, and deduplicated
/// while preserving first-seen order.
pub fn extract_tags(text: &str) -> Vec<String> {
    let mut tags = Vec::new();
    for m in hashtag_re().find_iter(text) {
        let tag = m.as_str()[1..].to_lowercase();
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

/// Removes hashtags from free text, collapsing the whitespace left behind.
pub fn strip_tags(text: &str) -> String {
    let stripped = hashtag_re().replace_all(text, "");
    whitespace_re()
        .replace_all(stripped.as_ref(), " ")
        .trim()
        .to_string()
}

/// Merges platform-provided tags with tags extracted from the title and
/// description.
///
/// Platform tags keep their original casing; extracted tags are appended
/// only when not already present case-insensitively.
pub fn merge_tags(existing: &[String], title: &str, description: &str) -> Vec<String> {
    let mut all: Vec<String> = existing.to_vec();
    let mut seen: Vec<String> = existing.iter().map(|t| t.to_lowercase()).collect();

    for tag in extract_tags(title).into_iter().chain(extract_tags(description)) {
        if !seen.contains(&tag) {
            seen.push(tag.clone());
            all.push(tag);
        }
    }
    all
}

/// Returns true if the query contains Cyrillic characters.
///
/// Used to pick the relevance language and region code for search calls.
pub fn is_cyrillic_query(query: &str) -> bool {
    query.chars().any(|c| ('\u{0400}'..='\u{04FF}').contains(&c))
}
