//! JSON export of stored records as [`NewsView`]s.

use crate::models::{NewsRecord, NewsView};
use crate::utils::ensure_writable_dir;
use itertools::Itertools;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

pub const ALL_FILE: &str = "news.json";

/// What [`write_views`] produced.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub records: usize,
    pub files: Vec<PathBuf>,
}

/// File name used for `category`. Anything outside `[a-z0-9_-]` becomes `_`.
pub fn category_file_name(category: &str) -> String {
    let stem: String = category
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '-' | '_' => c,
            'A'..='Z' => c.to_ascii_lowercase(),
            _ => '_',
        })
        .collect();
    let stem = if stem.is_empty() { "_".to_string() } else { stem };
    format!("{stem}.json")
}

async fn write_json(path: &Path, views: &[NewsView]) -> Result<(), Box<dyn Error>> {
    let json = serde_json::to_string_pretty(views)?;
    if let Err(e) = fs::write(path, json).await {
        error!(path = %path.display(), error = %e, "Failed writing JSON");
        return Err(e.into());
    }
    info!(path = %path.display(), count = views.len(), "Wrote JSON API file");
    Ok(())
}

/// Write `records` to `output_dir` as `news.json` plus one file per
/// category.
///
/// # Arguments
///
/// * `records` - Stored records, in any order
/// * `output_dir` - Target directory, created if missing
///
/// # Returns
///
/// An [`ExportSummary`] listing the files written. Each file holds a JSON
/// array of [`NewsView`]s, newest first.
///
/// # Errors
///
/// Fails when the directory is not writable, or a file cannot be written.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir.display()))]
pub async fn write_views(
    records: &[NewsRecord],
    output_dir: &Path,
) -> Result<ExportSummary, Box<dyn Error>> {
    ensure_writable_dir(output_dir).await?;

    let views: Vec<NewsView> = records
        .iter()
        .sorted_by(|a, b| b.collected_at.cmp(&a.collected_at))
        .map(NewsView::from)
        .collect();

    let mut summary = ExportSummary {
        records: views.len(),
        files: Vec::new(),
    };

    let all_path = output_dir.join(ALL_FILE);
    write_json(&all_path, &views).await?;
    summary.files.push(all_path);

    let by_category = views
        .iter()
        .cloned()
        .into_group_map_by(|v| v.category.clone());
    for (category, group) in by_category.into_iter().sorted_by(|a, b| a.0.cmp(&b.0)) {
        let path = output_dir.join(category_file_name(&category));
        write_json(&path, &group).await?;
        summary.files.push(path);
    }

    Ok(summary)
}
