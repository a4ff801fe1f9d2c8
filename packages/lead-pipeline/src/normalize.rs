//! Response-shape normalization for the campaign API.
//!
//! The source nests its record arrays under a handful of different keys
//! depending on endpoint and version. Every caller goes through these
//! two pure functions instead of re-deriving the shape locally.

use serde_json::Value;

/// Pull the record array out of an API response, trying a fixed
/// precedence of known shapes. Total: anything unrecognized degrades to
/// an empty list rather than erroring.
pub fn records_array(response: &Value) -> Vec<Value> {
    if let Value::Array(items) = response {
        return items.clone();
    }
    for path in [&["items"][..], &["data", "items"], &["data"], &["results"]] {
        let mut node = response;
        let mut found = true;
        for key in path {
            match node.get(key) {
                Some(next) => node = next,
                None => {
                    found = false;
                    break;
                }
            }
        }
        if found {
            if let Value::Array(items) = node {
                return items.clone();
            }
        }
    }
    Vec::new()
}

/// Derive the pagination cursor from a response. `None` means "no more
/// pages".
///
/// Precedence: an explicit `next_starting_after` (top-level or under
/// `data`), then the id of the last record in the page.
pub fn next_cursor(response: &Value) -> Option<String> {
    for path in [&["next_starting_after"][..], &["data", "next_starting_after"]] {
        let mut node = response;
        let mut found = true;
        for key in path {
            match node.get(key) {
                Some(next) => node = next,
                None => {
                    found = false;
                    break;
                }
            }
        }
        if found {
            if let Some(cursor) = node.as_str().filter(|s| !s.is_empty()) {
                return Some(cursor.to_string());
            }
        }
    }

    records_array(response)
        .last()
        .and_then(|record| record.get("id").and_then(|v| v.as_str()).map(str::to_string))
}
