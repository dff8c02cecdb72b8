// src/ingest/mod.rs
pub mod dates;
pub mod external;
pub mod internal;
pub mod memory;
pub mod normalize;
pub mod types;

use metrics::describe_counter;
use once_cell::sync::OnceCell;

/// Longest derived excerpt, in chars, before the ellipsis.
pub const EXCERPT_MAX_CHARS: usize = 200;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "ingest_items_total",
            "Canonical items produced by normalization."
        );
        describe_counter!(
            "ingest_dropped_total",
            "Raw records dropped because no usable title could be derived."
        );
        describe_counter!(
            "ingest_source_errors_total",
            "Source fetches that degraded to an empty contribution."
        );
    });
}

/// Normalize text: decode entities, strip tags, fold quotes, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out.trim().to_string()
}

/// Cut `s` to at most `max` chars, appending `...` only when something was cut.
pub fn truncate_with_ellipsis(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max).collect();
    format!("{}...", cut.trim_end())
}

/// Excerpt derived from body content: plain text, capped at `EXCERPT_MAX_CHARS`.
pub fn derive_excerpt(content: &str) -> String {
    truncate_with_ellipsis(&normalize_text(content), EXCERPT_MAX_CHARS)
}
