//! Case-insensitive glob matching for tool patterns.
//!
//! Patterns use fnmatch-style globs (`*`, `?`, `[...]`). Both sides are
//! case-folded before matching. Pattern syntax is validated at document load;
//! a pattern that still fails to compile here matches nothing.

/// True iff `pattern` matches `value`, ignoring case.
pub fn glob_match(pattern: &str, value: &str) -> bool {
    match glob::Pattern::new(&pattern.to_lowercase()) {
        Ok(compiled) => compiled.matches(&value.to_lowercase()),
        Err(_) => false,
    }
}

/// True iff any of `patterns` matches `value`.
pub fn any_match(patterns: &[String], value: &str) -> bool {
    patterns.iter().any(|p| glob_match(p, value))
}
