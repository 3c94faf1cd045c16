//! Ignore-pattern matching
//!
//! The differ only needs to ask "does this pattern match this label?". The
//! [`LabelMatcher`] trait is that seam; [`GlobMatcher`] is the default engine.
//!
//! Grammar of [`GlobMatcher`] patterns, where labels are dot-separated:
//!
//! - `*` matches any run of characters within one label segment
//! - `**` matches any run of characters, dots included, so `**.dev` needs
//!   at least one segment before `.dev` while `foo**` matches `foo.bar`
//! - `?` matches exactly one character
//! - `[abc]`, `[a-z]`, `[!a]` match one character from a class
//! - `{a,b}` matches either alternative (may nest)
//!
//! Matching is case-insensitive.

use glob::{MatchOptions, Pattern};

use crate::error::{Error, Result};

/// Decides whether an ignore pattern covers a label or target
pub trait LabelMatcher: Send + Sync {
    /// True if `candidate` matches `pattern`; invalid patterns match nothing
    fn matches(&self, pattern: &str, candidate: &str) -> bool;

    /// Reject a pattern that cannot be compiled
    fn check_pattern(&self, _pattern: &str) -> Result<()> {
        Ok(())
    }
}

/// Glob matcher over dot-separated DNS labels
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobMatcher;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// One alternative, split at each `**` into single-segment globs
type Pieces = Vec<Pattern>;

impl GlobMatcher {
    fn compile(pattern: &str) -> Result<Vec<Pieces>> {
        let alternatives = expand_braces(pattern)
            .map_err(|reason| Error::config(format!("ignore pattern '{}': {}", pattern, reason)))?;

        alternatives
            .iter()
            .map(|alt| {
                split_double_star(alt)
                    .iter()
                    .map(|piece| {
                        Pattern::new(&segments_to_path(piece)).map_err(|e| {
                            Error::config(format!("ignore pattern '{}': {}", pattern, e.msg))
                        })
                    })
                    .collect::<Result<Pieces>>()
            })
            .collect()
    }
}

impl LabelMatcher for GlobMatcher {
    fn matches(&self, pattern: &str, candidate: &str) -> bool {
        let Ok(compiled) = Self::compile(pattern) else {
            return false;
        };
        let candidate = candidate.replace('.', "/");
        compiled
            .iter()
            .any(|pieces| matches_pieces(pieces, &candidate))
    }

    fn check_pattern(&self, pattern: &str) -> Result<()> {
        Self::compile(pattern).map(|_| ())
    }
}

/// Match `candidate` against pieces joined by `**`
///
/// The first piece must match a prefix, each `**` then swallows any run of
/// characters (separators included) before the next piece.
fn matches_pieces(pieces: &[Pattern], candidate: &str) -> bool {
    let Some((first, rest)) = pieces.split_first() else {
        return candidate.is_empty();
    };
    if rest.is_empty() {
        return first.matches_with(candidate, MATCH_OPTIONS);
    }

    let boundaries = |s: &str| (0..=s.len()).filter(|&i| s.is_char_boundary(i)).collect::<Vec<_>>();
    boundaries(candidate).into_iter().any(|prefix| {
        first.matches_with(&candidate[..prefix], MATCH_OPTIONS)
            && boundaries(&candidate[prefix..])
                .into_iter()
                .any(|skip| matches_pieces(rest, &candidate[prefix + skip..]))
    })
}

/// Split an alternative at every `**` outside a character class
fn split_double_star(pattern: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut in_class = false;
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '[' if !in_class => in_class = true,
            ']' if in_class => in_class = false,
            '*' if !in_class && chars.peek() == Some(&'*') => {
                // Runs of three or more stars collapse into one `**`
                while chars.peek() == Some(&'*') {
                    chars.next();
                }
                pieces.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    pieces.push(current);
    pieces
}

/// Map label separators onto the path separator the glob engine understands
///
/// Dots inside a character class are literal and stay untouched.
fn segments_to_path(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut in_class = false;
    for c in pattern.chars() {
        match c {
            '[' if !in_class => {
                in_class = true;
                out.push(c);
            }
            ']' if in_class => {
                in_class = false;
                out.push(c);
            }
            '.' if !in_class => out.push('/'),
            _ => out.push(c),
        }
    }
    out
}

/// Expand `{a,b}` alternation groups into plain patterns
fn expand_braces(pattern: &str) -> std::result::Result<Vec<String>, String> {
    let mut depth = 0usize;
    let mut start = None;
    let mut in_class = false;

    for (i, c) in pattern.char_indices() {
        match c {
            '[' if !in_class => in_class = true,
            ']' if in_class => in_class = false,
            '{' if !in_class => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if !in_class => {
                if depth == 0 {
                    return Err("unbalanced '}'".to_string());
                }
                depth -= 1;
                if let (0, Some(open)) = (depth, start) {
                    let prefix = &pattern[..open];
                    let body = &pattern[open + 1..i];
                    let suffix = &pattern[i + 1..];

                    let mut expanded = Vec::new();
                    for alt in split_alternatives(body) {
                        expanded.extend(expand_braces(&format!("{}{}{}", prefix, alt, suffix))?);
                    }
                    return Ok(expanded);
                }
            }
            _ => {}
        }
    }

    if depth != 0 {
        return Err("unbalanced '{'".to_string());
    }
    Ok(vec![pattern.to_string()])
}

/// Split a group body on commas that are not inside a nested group
fn split_alternatives(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut last = 0;
    for (i, c) in body.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&body[last..i]);
                last = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&body[last..]);
    parts
}
