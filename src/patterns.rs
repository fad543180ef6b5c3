//! Compiled regex cache backed by a [`GrowOnlyTable`].
//!
//! Patterns compile once and stay cached for the lifetime of the cache.
//! Lookups of cached patterns take no lock, so one cache can serve every
//! sanitizer in the process.

use crate::grow_only_table::GrowOnlyTable;
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

#[derive(Debug, thiserror::Error)]
#[error("invalid pattern `{pattern}`: {source}")]
pub struct PatternError {
    pattern: String,
    #[source]
    source: regex::Error,
}

impl PatternError {
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

static GLOBAL: Lazy<PatternCache> = Lazy::new(PatternCache::new);

#[derive(Debug, Default)]
pub struct PatternCache {
    compiled: GrowOnlyTable<String, Regex>,
}

impl PatternCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide cache.
    pub fn global() -> &'static PatternCache {
        &GLOBAL
    }

    pub fn compile(&self, pattern: &str) -> Result<&Regex, PatternError> {
        if let Some(re) = self.compiled.get(pattern) {
            return Ok(re);
        }
        self.compiled
            .get_or_try_insert_with(pattern.to_owned(), || {
                log::trace!("compiling pattern `{pattern}`");
                Regex::new(pattern).map_err(|source| PatternError {
                    pattern: pattern.to_owned(),
                    source,
                })
            })
    }

    /// Replace every match of `pattern` in `text`. `$name` and `$1` in
    /// `replacement` expand to capture groups.
    pub fn replace_all<'t>(
        &self,
        pattern: &str,
        text: &'t str,
        replacement: &str,
    ) -> Result<Cow<'t, str>, PatternError> {
        Ok(self.compile(pattern)?.replace_all(text, replacement))
    }

    /// Number of cached patterns.
    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Invariant: compiling the same source twice yields the cached instance.
    #[test]
    fn compiles_once() {
        let cache = PatternCache::new();
        let a = cache.compile(r"\d+").unwrap() as *const Regex;
        let b = cache.compile(r"\d+").unwrap() as *const Regex;
        assert_eq!(a, b);
        assert_eq!(cache.len(), 1);
    }

    /// Invariant: a bad pattern is reported and not cached.
    #[test]
    fn invalid_pattern_is_not_cached() {
        let cache = PatternCache::new();
        let err = cache.compile("(unclosed").unwrap_err();
        assert_eq!(err.pattern(), "(unclosed");
        assert!(err.to_string().starts_with("invalid pattern `(unclosed`"));
        assert!(cache.is_empty());
    }

    #[test]
    fn replace_all_expands_groups() {
        let cache = PatternCache::new();
        let out = cache
            .replace_all(r"(\w+)@(\w+)", "me@host you@there", "$2:$1")
            .unwrap();
        assert_eq!(out, "host:me there:you");
        let untouched = cache.replace_all("z+", "abc", "").unwrap();
        assert!(matches!(untouched, Cow::Borrowed("abc")));
    }

    #[test]
    fn global_is_shared() {
        let a = PatternCache::global() as *const PatternCache;
        let b = PatternCache::global() as *const PatternCache;
        assert_eq!(a, b);
        assert!(PatternCache::global().compile("a|b").is_ok());
    }
}
