//! Regex strip pass, as three pure stages: protect, strip, restore.
//!
//! Whitelisted tags are re-encoded with private-use characters so that the
//! strip patterns cannot see them, then decoded back.

use super::attributes::{self, Attribute};
use super::builtin;
use super::config::SanitizerConfig;
use crate::patterns::PatternCache;
use regex::Captures;

const MARK_LT: char = '\u{E000}';
const MARK_GT: char = '\u{E001}';
const MARK_QUOTE: char = '\u{E002}';
const MARK_EQ: char = '\u{E003}';
const MARK_APOS: char = '\u{E004}';

const TAG: &str = r"<(/?)([A-Za-z][A-Za-z0-9:-]*)([^<>]*)>";
const COMMENT: &str = r"(?s)<!--.*?(?:-->|$)";
const BLOCKS: &[&str] = &[
    r"(?is)<script\b[^>]*>.*?(?:</script\s*>|$)",
    r"(?is)<style\b[^>]*>.*?(?:</style\s*>|$)",
    r"(?is)<iframe\b[^>]*>.*?(?:</iframe\s*>|$)",
];
const ANY_TAG: &str = r"<[^>]*>";
const STRAY_BRACKET: &str = r"[<>]";
const QUOTED_PAIR: &str = r#"(?i)\b[a-z][a-z0-9_:-]*\s*=\s*(?:"[^"]*"|'[^']*')"#;
const EVENT_PAIR: &str = r"(?i)\bon[a-z]+\s*=\s*\S*";

pub(crate) fn filter_unsafe_html(text: &str, config: &SanitizerConfig, cache: &PatternCache) -> String {
    let text = scrub(text);
    let text = protect(&text, config, cache);
    let text = strip(&text, cache);
    restore(&text)
}

fn is_marker(c: char) -> bool {
    (MARK_LT..=MARK_APOS).contains(&c)
}

/// Remove marker characters so input cannot forge protected markup.
fn scrub(text: &str) -> String {
    text.chars().filter(|c| !is_marker(*c)).collect()
}

fn push_marked(out: &mut String, value: &str) {
    for c in value.chars() {
        out.push(match c {
            '"' => MARK_QUOTE,
            '\'' => MARK_APOS,
            '=' => MARK_EQ,
            c => c,
        });
    }
}

fn protect_tag(caps: &Captures<'_>, config: &SanitizerConfig) -> String {
    let whole = &caps[0];
    let closing = !caps[1].is_empty();
    let name = &caps[2];
    let rest = &caps[3];
    let separated = rest.is_empty() || rest.starts_with(|c: char| c.is_ascii_whitespace() || c == '/');
    if !separated || !(name.eq_ignore_ascii_case("br") || config.is_safe_tag(name)) {
        return whole.to_owned();
    }

    let mut out = String::with_capacity(whole.len());
    out.push(MARK_LT);
    if closing {
        out.push('/');
    }
    out.push_str(name);
    let trimmed = rest.trim_end();
    let (attrs, self_closing) = match trimmed.strip_suffix('/') {
        Some(attrs) => (attrs, true),
        None => (trimmed, false),
    };
    if !closing {
        let kept = attributes::scan(attrs)
            .map_while(Result::ok)
            .filter(|a| {
                config.is_safe_attr(a.name)
                    && !a.value.is_some_and(|v| attributes::is_dangerous(a.name, v))
            });
        for Attribute { name: attr, value, quote } in kept {
            out.push(' ');
            out.push_str(attr);
            if let Some(value) = value {
                // The value keeps its own delimiter; the other quote kind is
                // plain text inside it.
                let mark = match quote {
                    Some('\'') => MARK_APOS,
                    _ => MARK_QUOTE,
                };
                out.push(MARK_EQ);
                out.push(mark);
                push_marked(&mut out, value);
                out.push(mark);
            }
        }
    }
    if self_closing && !closing {
        out.push('/');
    }
    out.push(MARK_GT);
    out
}

/// Re-encode whitelisted tags, keeping only whitelisted, harmless attributes.
fn protect(text: &str, config: &SanitizerConfig, cache: &PatternCache) -> String {
    builtin(cache, TAG)
        .replace_all(text, |caps: &Captures<'_>| protect_tag(caps, config))
        .into_owned()
}

fn strip(text: &str, cache: &PatternCache) -> String {
    let mut text = builtin(cache, COMMENT).replace_all(text, "").into_owned();
    for block in BLOCKS {
        text = builtin(cache, block).replace_all(&text, "").into_owned();
    }
    for pattern in [ANY_TAG, STRAY_BRACKET, QUOTED_PAIR, EVENT_PAIR] {
        text = builtin(cache, pattern).replace_all(&text, "").into_owned();
    }
    text
}

fn restore(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            MARK_LT => '<',
            MARK_GT => '>',
            MARK_QUOTE => '"',
            MARK_EQ => '=',
            MARK_APOS => '\'',
            c => c,
        })
        .collect()
}
