//! Regex-OR matcher used for event-code filtering.
use log::warn;
use regex::Regex;

pub const DEFAULT_SEPARATOR: char = ',';

/// Returns true when `target` matches any of the provided patterns.
///
/// Patterns are independent regular expressions, matched case-sensitively and
/// unanchored; a single match is enough. When the pattern set is empty (no
/// non-blank elements) `when_empty` is returned instead. Patterns that fail
/// to compile are skipped with a warning rather than failing the call.
pub fn match_any_pattern(target: &str, patterns: &str, when_empty: bool) -> bool {
    match_any_of(target, patterns.split(DEFAULT_SEPARATOR), when_empty)
}

/// Same as [`match_any_pattern`], over an explicit pattern sequence.
pub fn match_any_of<'a, I>(target: &str, patterns: I, when_empty: bool) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen_any = false;
    for pattern in patterns {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            continue;
        }
        seen_any = true;
        match Regex::new(pattern) {
            Ok(regex) => {
                if regex.is_match(target) {
                    return true;
                }
            }
            Err(err) => {
                warn!("Skipping invalid event pattern '{pattern}': {err}");
            }
        }
    }
    if seen_any {
        false
    } else {
        when_empty
    }
}
