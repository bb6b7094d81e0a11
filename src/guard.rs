//! Guard markers in the target document.
//!
//! A bundled snippet is wrapped by `cargo codesnip` in guard comments so that
//! bundling a second snippet into the same file can skip what is already
//! there. Each line of the form
//!
//! ```text
//! // codesnip-guard: TOKEN
//! ```
//!
//! where TOKEN is one or more ASCII word characters (`A-Z`, `a-z`, `0-9`,
//! `_`) and nothing else is on the line, names one excluded item.

const GUARD_PREFIX: &str = "// codesnip-guard: ";

/// Collect guard tokens in document order.
///
/// Duplicates are kept. Lines may end in LF or CRLF. Matching is
/// case-sensitive and anchored at both ends of the line.
pub fn scan_guards(text: &str) -> Vec<String> {
    text.lines().filter_map(guard_token).map(str::to_string).collect()
}

fn guard_token(line: &str) -> Option<&str> {
    let token = line.strip_prefix(GUARD_PREFIX)?;
    let is_word = |c: char| c.is_ascii_alphanumeric() || c == '_';
    (!token.is_empty() && token.chars().all(is_word)).then_some(token)
}
