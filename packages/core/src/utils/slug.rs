//! Slug normalization for category URLs

use regex::Regex;
use std::sync::LazyLock;

/// Whitespace and underscores become dashes
static SEPARATOR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\s_]+").unwrap());

/// Anything that is not URL-safe is dropped
static UNSAFE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9-]").unwrap());

static DASH_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-{2,}").unwrap());

/// Normalize a submitted slug into its URL-safe form
///
/// Lower-cases, turns whitespace and `_` into `-`, drops every character
/// outside `[a-z0-9-]`, collapses dash runs and trims leading/trailing dashes.
/// The result may be empty; callers fall back to the title in that case.
///
/// # Examples
///
/// ```
/// use category_tree_core::utils::normalize_slug;
///
/// assert_eq!(normalize_slug("  Rust & Go_Tips "), "rust-go-tips");
/// assert_eq!(normalize_slug("!!!"), "");
/// ```
pub fn normalize_slug(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let separated = SEPARATOR_RE.replace_all(&lowered, "-");
    let safe = UNSAFE_RE.replace_all(&separated, "");
    let collapsed = DASH_RUN_RE.replace_all(&safe, "-");
    collapsed.trim_matches('-').to_string()
}

/// Trim a submitted title; `None` when nothing is left
pub fn normalize_title(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
