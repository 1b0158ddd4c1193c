//! Fuzzy matching of entry names.
//!
//! A pattern matches when all of its characters appear in the name in order,
//! ignoring case. Matched characters can be wrapped in highlight markers.

/// Returns true if every character of `pattern` occurs in `name` in order.
pub fn fuzzy_matches(pattern: &str, name: &str) -> bool {
    match_positions(pattern, name).is_some()
}

/// Wraps each run of matched characters in `start`/`end` markers.
///
/// Returns `None` if the pattern does not match.
pub fn highlight(pattern: &str, name: &str, start: &str, end: &str) -> Option<String> {
    let positions = match_positions(pattern, name)?;
    let mut out = String::with_capacity(name.len() + positions.len() * (start.len() + end.len()));
    let mut matched = positions.iter().peekable();
    let mut in_run = false;
    for (index, ch) in name.char_indices() {
        let is_match = matched.next_if(|&&pos| pos == index).is_some();
        if is_match && !in_run {
            out.push_str(start);
            in_run = true;
        } else if !is_match && in_run {
            out.push_str(end);
            in_run = false;
        }
        out.push(ch);
    }
    if in_run {
        out.push_str(end);
    }
    Some(out)
}

/// Byte offsets in `name` of the greedily matched pattern characters.
fn match_positions(pattern: &str, name: &str) -> Option<Vec<usize>> {
    let mut wanted = pattern.chars().filter(|c| !c.is_whitespace()).peekable();
    let mut positions = Vec::new();
    for (index, ch) in name.char_indices() {
        let Some(&next) = wanted.peek() else {
            break;
        };
        if ch.to_lowercase().eq(next.to_lowercase()) {
            positions.push(index);
            wanted.next();
        }
    }
    wanted.peek().is_none().then_some(positions)
}
