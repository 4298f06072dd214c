//! Utility functions for the category tree
//!
//! This module provides common utility functions used across the codebase.

mod slug;

pub use slug::{normalize_slug, normalize_title};
