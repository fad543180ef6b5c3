//! Tag syntax: splitting `<...>` into name and attributes, and the
//! recoverable syntax errors the scanners report.

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TagError {
    #[error("tag has no closing `>`")]
    Unterminated,
    #[error("`<` inside a tag")]
    NestedOpen,
    #[error("comment has no closing `-->`")]
    UnterminatedComment,
    #[error("comment closes early with `<!-->`, `<!--->` or `--!>`")]
    AbruptComment,
    #[error("closing tag `{found}` does not match open tag `{expected}`")]
    MismatchedClose { expected: String, found: String },
    #[error("closing tag `{0}` with nothing open")]
    UnopenedClose(String),
    #[error("closing tag `{0}` carries attributes")]
    AttributesOnClose(String),
    #[error("unmatched quote in attribute `{0}`")]
    UnmatchedQuote(String),
    #[error("quote inside unquoted value of attribute `{0}`")]
    QuoteInUnquotedValue(String),
    #[error("attribute `{0}` is not allowed")]
    UnsafeAttribute(String),
    #[error("attribute `{0}` has a dangerous value")]
    DangerousValue(String),
    #[error("malformed attribute list near `{0}`")]
    Malformed(String),
}

/// Elements that never take a closing tag.
const VOID: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

pub(crate) fn is_void(name: &str) -> bool {
    VOID.iter().any(|v| v.eq_ignore_ascii_case(name))
}

/// The text between `<` and `>` of one tag.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct TagParts<'a> {
    pub(crate) name: &'a str,
    pub(crate) closing: bool,
    pub(crate) self_closing: bool,
    /// Everything after the name, without a trailing `/`.
    pub(crate) attrs: &'a str,
}

impl<'a> TagParts<'a> {
    /// `None` when no name follows the `<` (or `</`) directly.
    pub(crate) fn parse(inner: &'a str) -> Option<Self> {
        let (closing, body) = match inner.strip_prefix('/') {
            Some(body) => (true, body),
            None => (false, inner),
        };
        let name_len = body
            .find(|c: char| c.is_ascii_whitespace() || c == '/')
            .unwrap_or(body.len());
        let name = &body[..name_len];
        if name.is_empty() || !name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b':') {
            return None;
        }
        let rest = &body[name_len..];
        let (self_closing, attrs) = match rest.trim_end().strip_suffix('/') {
            Some(attrs) if !closing => (true, attrs),
            _ => (false, rest),
        };
        Some(Self {
            name,
            closing,
            self_closing,
            attrs,
        })
    }
}
