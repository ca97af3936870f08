//! Small text and file system helpers shared by the pipeline.
//!
//! - Whitespace collapsing for text pulled out of HTML
//! - Character-safe truncation, both for stored summaries and for log lines
//! - Output directory validation for the JSON export and the file store

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

/// Collapse every run of whitespace (including newlines and tabs left over
/// from markup) into a single space and trim both ends.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(collapse_whitespace("  Breaking:\n\t news  "), "Breaking: news");
/// ```
pub fn collapse_whitespace(s: &str) -> String {
    WHITESPACE.replace_all(s.trim(), " ").into_owned()
}

/// Truncate `s` to at most `max` characters, ending with `marker` when the
/// input was longer than `max`.
///
/// The marker counts toward `max`, so the result never exceeds `max`
/// characters. Counting is done in `char`s so multi-byte text is never split.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_with_marker("short", 10, "..."), "short");
/// assert_eq!(truncate_with_marker("abcdefghijkl", 10, "..."), "abcdefg...");
/// ```
pub fn truncate_with_marker(s: &str, max: usize, marker: &str) -> String {
    let len = s.chars().count();
    if len <= max {
        return s.to_string();
    }
    let marker_len = marker.chars().count();
    if max <= marker_len {
        return marker.chars().take(max).collect();
    }
    let keep = max - marker_len;
    let mut out: String = s.chars().take(keep).collect();
    // Avoid "word ..." with a dangling space before the marker.
    let trimmed_len = out.trim_end().len();
    out.truncate(trimmed_len);
    out.push_str(marker);
    out
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to `max` characters with an ellipsis and a count of
/// the dropped bytes appended. Used for HTML previews in warnings.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((cut, _)) => format!("{}…(+{} bytes)", &s[..cut], s.len() - cut),
    }
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then writes and removes a probe file.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let probe_path = path.join("..__probe_write__");
    stdfs::File::create(&probe_path)?;
    let _ = stdfs::remove_file(&probe_path);
    info!("Directory is writable");
    Ok(())
}
