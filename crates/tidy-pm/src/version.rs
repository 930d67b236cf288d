//! Version range narrowing
//!
//! The registry serves a manifest for `<name>/<tag>` where the tag is
//! `latest`, an exact version, or a major-only tag like `1.x`. Project
//! manifests carry arbitrary range strings; this module narrows them to a
//! single fetchable tag. It is deliberately not a range solver: a range
//! picks its first alternative, a hyphen range its lower bound.

/// Tag accepted by the registry for "whatever is newest".
pub const LATEST: &str = "latest";

/// Narrow a range string to a single tag the registry accepts.
///
/// Idempotent: normalizing an already-normalized tag returns it unchanged.
pub fn normalize(range: &str) -> String {
    let range = range.trim();

    if is_wildcard(range) {
        return LATEST.to_string();
    }

    // npm:<alias>@<range> aliases resolve to whatever follows the last `@`.
    if let Some(rest) = range.strip_prefix("npm:") {
        return match rest.rfind('@') {
            Some(at) => normalize(&rest[at + 1..]),
            None => LATEST.to_string(),
        };
    }

    // Alternatives: keep only the first.
    if let Some((first, _)) = range.split_once("||") {
        return normalize(first);
    }

    // Hyphen ranges: keep only the lower bound.
    if let Some((low, _)) = range.split_once(" - ") {
        return normalize(low);
    }

    let stripped = strip_operators(range);

    if is_wildcard(stripped) {
        return LATEST.to_string();
    }

    let segments: Vec<&str> = stripped.split('.').collect();

    match segments.as_slice() {
        [major] if is_digits(major) => format!("{}.x", major),
        [major, minor] if is_wildcard_segment(minor) => format!("{}.x", major),
        _ => {
            if segments.iter().any(|s| is_wildcard_segment(s)) {
                segments
                    .iter()
                    .map(|s| if is_wildcard_segment(s) { "0" } else { *s })
                    .collect::<Vec<_>>()
                    .join(".")
            } else {
                stripped.to_string()
            }
        }
    }
}

fn is_wildcard(range: &str) -> bool {
    matches!(range, "" | "*" | "x" | "X" | "latest")
}

fn is_wildcard_segment(segment: &str) -> bool {
    matches!(segment, "x" | "X" | "*")
}

fn is_digits(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}

/// Strip leading comparison operators and a `v` prefix, repeatedly, so
/// forms like `>=v1.2.3` reduce to the bare version.
fn strip_operators(range: &str) -> &str {
    let mut rest = range;

    loop {
        let trimmed = rest.trim_start();
        let after = ["^", "~", ">=", "<=", ">", "<", "=", "v"]
            .iter()
            .find_map(|prefix| trimmed.strip_prefix(prefix));

        match after {
            Some(stripped) => rest = stripped,
            None => return trimmed.trim_end(),
        }
    }
}
