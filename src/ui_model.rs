use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::element::TreeRow;

const MAX_NAME_CHARS: usize = 80;

fn normalize_windows_display(text: &str) -> String {
    #[cfg(windows)]
    {
        if let Some(rest) = text.strip_prefix(r"\\?\UNC\") {
            return format!(r"\\{}", rest);
        }
        if let Some(rest) = text.strip_prefix(r"\\?\") {
            return rest.to_string();
        }
    }
    text.to_string()
}

fn normalize_windows_path(path: &Path) -> PathBuf {
    #[cfg(windows)]
    {
        let raw = path.to_string_lossy();
        if let Some(rest) = raw.strip_prefix(r"\\?\UNC\") {
            return PathBuf::from(format!(r"\\{}", rest));
        }
        if let Some(rest) = raw.strip_prefix(r"\\?\") {
            return PathBuf::from(rest);
        }
    }
    path.to_path_buf()
}

pub fn normalize_path_for_display(path: &Path) -> String {
    let normalized = normalize_windows_path(path);
    normalize_windows_display(&normalized.to_string_lossy())
}

/// Path of `path` relative to `root`, or the full path when it lies outside.
pub fn display_path(path: &Path, root: &Path) -> String {
    let normalized_path = normalize_windows_path(path);
    let normalized_root = normalize_windows_path(root);
    let raw = normalized_path
        .strip_prefix(&normalized_root)
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| normalized_path.to_string_lossy().to_string());
    normalize_windows_display(&raw)
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}

fn entry_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| normalize_path_for_display(path))
}

/// One visible row as printed by `--json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowRecord {
    pub path: String,
    pub name: String,
    pub depth: usize,
    pub is_dir: bool,
    pub collapsible: bool,
    pub collapsed: bool,
}

impl RowRecord {
    pub fn from_row(row: &TreeRow<PathBuf>, root: &Path) -> Self {
        Self {
            path: display_path(&row.element, root),
            name: entry_name(&row.element),
            depth: row.depth,
            is_dir: row.element.is_dir(),
            collapsible: row.collapsible,
            collapsed: row.collapsed,
        }
    }
}

/// Indented text line for a row: two spaces per level, a `[D]`/`[F]` marker
/// and the entry name.
pub fn format_row(row: &TreeRow<PathBuf>) -> String {
    let indent = "  ".repeat(row.depth.saturating_sub(1));
    let marker = if row.element.is_dir() { "[D]" } else { "[F]" };
    let name = truncate_chars(&entry_name(&row.element), MAX_NAME_CHARS);
    if row.collapsible && row.collapsed {
        format!("{indent}{marker} {name} (collapsed)")
    } else {
        format!("{indent}{marker} {name}")
    }
}

pub fn render_rows(rows: &[TreeRow<PathBuf>]) -> Vec<String> {
    rows.iter().map(format_row).collect()
}

pub fn rows_to_json(rows: &[TreeRow<PathBuf>], root: &Path) -> Result<String> {
    let records: Vec<RowRecord> = rows.iter().map(|row| RowRecord::from_row(row, root)).collect();
    serde_json::to_string_pretty(&records).context("failed to serialize rows")
}
