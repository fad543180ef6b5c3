//! Whitelist-driven HTML sanitizing.
//!
//! Three independent passes over untrusted text:
//! - [`escape`] escapes every markup character, no whitelist.
//! - [`HtmlSanitizer::escape_unsafe`] tokenizes tags and lets whitelisted
//!   tags and attributes through, escaping everything else. Dangling safe
//!   tags are closed at the end.
//! - [`HtmlSanitizer::filter_unsafe_html`] strips markup with regexes after
//!   shielding the whitelisted tags.
//!
//! Callers may layer them. [`convert_to_plain_text`] drops markup entirely.
//!
//! Malformed tags never fail a call: they are logged at debug level and
//! escaped as text.

mod attributes;
mod config;
mod entities;
mod escape_unsafe;
mod filter;
mod plain_text;
mod tag;

pub use config::{ConfigError, SanitizerConfig};
pub use tag::TagError;

use crate::patterns::PatternCache;
use regex::Regex;
use std::borrow::Cow;
use std::sync::Arc;

/// Output that stays borrowed from the source until the first edit.
pub(crate) struct Rewrite<'a> {
    src: &'a str,
    out: Option<String>,
    copied: usize,
}

impl<'a> Rewrite<'a> {
    pub(crate) fn new(src: &'a str) -> Self {
        Self {
            src,
            out: None,
            copied: 0,
        }
    }

    /// Replace `len` source bytes at `at` with `with`. Edits must be made in
    /// source order and must not overlap.
    pub(crate) fn replace(&mut self, at: usize, len: usize, with: &str) {
        let src = self.src;
        let out = self
            .out
            .get_or_insert_with(|| String::with_capacity(src.len() + src.len() / 8 + 8));
        out.push_str(&src[self.copied..at]);
        out.push_str(with);
        self.copied = at + len;
    }

    /// Append after the whole source.
    pub(crate) fn append(&mut self, with: &str) {
        self.replace(self.src.len(), 0, with);
    }

    pub(crate) fn finish(self) -> Cow<'a, str> {
        match self.out {
            None => Cow::Borrowed(self.src),
            Some(mut out) => {
                out.push_str(&self.src[self.copied..]);
                Cow::Owned(out)
            }
        }
    }
}

/// Compile a pattern that ships with the crate. These are constants, so a
/// failure is a bug in the crate.
#[track_caller]
pub(crate) fn builtin<'c>(cache: &'c PatternCache, pattern: &str) -> &'c Regex {
    match cache.compile(pattern) {
        Ok(re) => re,
        Err(e) => panic!("built-in pattern failed to compile: {e}"),
    }
}

/// Escape `& < > " '`. With `newlines_as_breaks`, `\n`, `\r\n` and `\r`
/// become `<br/>`.
pub fn escape(text: &str, newlines_as_breaks: bool) -> Cow<'_, str> {
    let bytes = text.as_bytes();
    let mut out = Rewrite::new(text);
    let mut i = 0;
    while i < bytes.len() {
        let (len, with) = match bytes[i] {
            b'&' => (1, "&amp;"),
            b'<' => (1, "&lt;"),
            b'>' => (1, "&gt;"),
            b'"' => (1, "&quot;"),
            b'\'' => (1, "&#39;"),
            b'\r' if newlines_as_breaks => {
                let len = if bytes.get(i + 1) == Some(&b'\n') { 2 } else { 1 };
                (len, "<br/>")
            }
            b'\n' if newlines_as_breaks => (1, "<br/>"),
            _ => {
                i += 1;
                continue;
            }
        };
        out.replace(i, len, with);
        i += len;
    }
    out.finish()
}

/// Strip all markup from `text`, keeping line structure, using the
/// process-wide pattern cache.
pub fn convert_to_plain_text(text: &str) -> String {
    plain_text::convert(text, PatternCache::global())
}

/// Sanitizer bound to one whitelist.
#[derive(Clone, Debug, Default)]
pub struct HtmlSanitizer {
    config: SanitizerConfig,
    // `None` uses the process-wide cache.
    patterns: Option<Arc<PatternCache>>,
}

impl HtmlSanitizer {
    pub fn new(config: SanitizerConfig) -> Self {
        Self {
            config,
            patterns: None,
        }
    }

    pub fn with_pattern_cache(config: SanitizerConfig, patterns: Arc<PatternCache>) -> Self {
        Self {
            config,
            patterns: Some(patterns),
        }
    }

    pub fn config(&self) -> &SanitizerConfig {
        &self.config
    }

    /// Replace the whitelist.
    pub fn set_config(&mut self, config: SanitizerConfig) {
        self.config = config;
    }

    fn patterns(&self) -> &PatternCache {
        self.patterns.as_deref().unwrap_or_else(|| PatternCache::global())
    }

    /// Escape everything except whitelisted tags with whitelisted, harmless
    /// attributes. Also collapses space runs to `&nbsp;`, turns newlines into
    /// `<br/>` and closes safe tags left open. Sanitized output is a fixed
    /// point.
    pub fn escape_unsafe<'a>(&self, text: &'a str) -> Cow<'a, str> {
        escape_unsafe::escape_unsafe(text, &self.config)
    }

    /// Regex strip pass: comments, `script`/`style`/`iframe` blocks and every
    /// non-whitelisted tag are removed (inner text kept), as are leftover
    /// `name="value"` and `on*=` pairs.
    pub fn filter_unsafe_html(&self, text: &str) -> String {
        filter::filter_unsafe_html(text, &self.config, self.patterns())
    }

    /// Like [`convert_to_plain_text`], using this sanitizer's pattern cache.
    pub fn convert_to_plain_text(&self, text: &str) -> String {
        plain_text::convert(text, self.patterns())
    }
}
