//! Utility functions for identifiers, timestamps and artifact names.

pub mod timestamps;

pub use timestamps::Timestamp;

use regex::Regex;
use std::sync::OnceLock;
use uuid::Uuid;

/// Generates a time-ordered run identifier.
#[must_use]
pub fn generate_run_id() -> Uuid {
    Uuid::now_v7()
}

fn unsafe_file_chars() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"[\s/\\:*?"<>|]"#).unwrap_or_else(|e| unreachable!("invalid pattern: {e}"))
    })
}

/// Makes a market name safe to embed in a file name.
///
/// Whitespace, path separators and reserved characters become `_`. An empty
/// result falls back to `unnamed`.
#[must_use]
pub fn safe_file_component(name: &str) -> String {
    let replaced = unsafe_file_chars().replace_all(name.trim(), "_");
    if replaced.is_empty() || replaced.chars().all(|c| c == '.') {
        "unnamed".to_string()
    } else {
        replaced.into_owned()
    }
}
