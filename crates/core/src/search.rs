//! Pagination constants and helpers for listing endpoints.
//!
//! This module lives in `core` (zero internal deps) so it can be used by
//! both the repository layer and any future CLI or admin tooling.

/// Default number of results per page.
pub const DEFAULT_SEARCH_LIMIT: i64 = 50;

/// Maximum number of results per page.
pub const MAX_SEARCH_LIMIT: i64 = 500;

/// Clamp a user-provided limit into `[1, max]`, falling back to `default`.
pub fn clamp_limit(limit: Option<i64>, default: i64, max: i64) -> i64 {
    limit.unwrap_or(default).max(1).min(max)
}

/// Clamp a user-provided offset to non-negative.
pub fn clamp_offset(offset: Option<i64>) -> i64 {
    offset.unwrap_or(0).max(0)
}
