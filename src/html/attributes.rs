//! Attribute sub-scanner for tags already known to be safe.

use super::config::SanitizerConfig;
use super::entities::decode_for_check;
use super::tag::TagError;

/// Value fragments that make an attribute unsafe, matched after comment
/// stripping, entity decoding, whitespace removal and lowercasing.
const DANGEROUS: &[&str] = &["javascript:", "vbscript:", "url(", "expression("];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Attribute<'a> {
    pub(crate) name: &'a str,
    pub(crate) value: Option<&'a str>,
    /// `'"'` or `'\''` for quoted values.
    pub(crate) quote: Option<char>,
}

/// Iterates `name`, `name=value`, `name="value"` and `name='value'` items.
/// Stops after the first error.
pub(crate) struct AttrScanner<'a> {
    src: &'a str,
    pos: usize,
}

pub(crate) fn scan(src: &str) -> AttrScanner<'_> {
    AttrScanner { src, pos: 0 }
}

impl<'a> AttrScanner<'a> {
    fn skip_ws(&mut self) {
        let bytes = self.src.as_bytes();
        while self.pos < bytes.len() && bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn run(&mut self, stop: impl Fn(u8) -> bool) -> &'a str {
        let src = self.src;
        let start = self.pos;
        let bytes = src.as_bytes();
        while self.pos < bytes.len() && !stop(bytes[self.pos]) {
            self.pos += 1;
        }
        &src[start..self.pos]
    }

    fn attribute(&mut self) -> Result<Attribute<'a>, TagError> {
        let name = self.run(|b| b.is_ascii_whitespace() || b == b'=');
        if name.is_empty() || name.bytes().any(|b| matches!(b, b'"' | b'\'' | b'`' | b'<')) {
            return Err(TagError::Malformed(self.src[self.pos..].trim().to_owned()));
        }
        self.skip_ws();
        if self.src.as_bytes().get(self.pos) != Some(&b'=') {
            return Ok(Attribute {
                name,
                value: None,
                quote: None,
            });
        }
        self.pos += 1;
        self.skip_ws();
        let src = self.src;
        let bytes = src.as_bytes();
        match bytes.get(self.pos) {
            Some(&q @ (b'"' | b'\'')) => {
                self.pos += 1;
                let value = self.run(|b| b == q);
                if self.pos >= bytes.len() {
                    return Err(TagError::UnmatchedQuote(name.to_owned()));
                }
                self.pos += 1;
                Ok(Attribute {
                    name,
                    value: Some(value),
                    quote: Some(q as char),
                })
            }
            Some(_) => {
                let value = self.run(|b| b.is_ascii_whitespace());
                if value.bytes().any(|b| matches!(b, b'"' | b'\'' | b'`')) {
                    return Err(TagError::QuoteInUnquotedValue(name.to_owned()));
                }
                Ok(Attribute {
                    name,
                    value: Some(value),
                    quote: None,
                })
            }
            None => Err(TagError::Malformed(name.to_owned())),
        }
    }
}

impl<'a> Iterator for AttrScanner<'a> {
    type Item = Result<Attribute<'a>, TagError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.skip_ws();
        if self.pos >= self.src.len() {
            return None;
        }
        let item = self.attribute();
        if item.is_err() {
            self.pos = self.src.len();
        }
        Some(item)
    }
}

fn strip_css_comments(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        rest = match rest[start + 2..].find("*/") {
            Some(end) => &rest[start + 2 + end + 2..],
            None => "",
        };
    }
    out.push_str(rest);
    out
}

/// Whether `value` of attribute `name` can carry script or remote content.
pub(crate) fn is_dangerous(name: &str, value: &str) -> bool {
    let value = if name.eq_ignore_ascii_case("style") {
        strip_css_comments(value)
    } else {
        value.to_owned()
    };
    let compact: String = decode_for_check(&value)
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .flat_map(char::to_lowercase)
        .collect();
    DANGEROUS.iter().any(|p| compact.contains(p))
}

/// Accept the attribute list of a safe tag, or report why it is rejected.
pub(crate) fn check(attrs: &str, config: &SanitizerConfig) -> Result<(), TagError> {
    for attr in scan(attrs) {
        let attr = attr?;
        if !config.is_safe_attr(attr.name) {
            return Err(TagError::UnsafeAttribute(attr.name.to_owned()));
        }
        if attr.value.is_some_and(|v| is_dangerous(attr.name, v)) {
            return Err(TagError::DangerousValue(attr.name.to_owned()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SanitizerConfig {
        SanitizerConfig::from_lists("a", "href,title,style,checked").unwrap()
    }

    #[test]
    fn scans_all_value_forms() {
        let attrs: Vec<_> = scan(r#" href="x y" title='t' checked style=color:red "#)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            attrs,
            vec![
                Attribute { name: "href", value: Some("x y"), quote: Some('"') },
                Attribute { name: "title", value: Some("t"), quote: Some('\'') },
                Attribute { name: "checked", value: None, quote: None },
                Attribute { name: "style", value: Some("color:red"), quote: None },
            ]
        );
    }

    #[test]
    fn spaces_around_equals() {
        let attrs: Vec<_> = scan("href = 'x'").collect::<Result<_, _>>().unwrap();
        assert_eq!(attrs[0].value, Some("x"));
    }

    #[test]
    fn unmatched_quote_is_rejected() {
        assert_eq!(
            check(r#" href="x"#, &config()),
            Err(TagError::UnmatchedQuote("href".into()))
        );
    }

    #[test]
    fn quote_in_unquoted_value_is_rejected() {
        assert_eq!(
            check(" title=a\"b", &config()),
            Err(TagError::QuoteInUnquotedValue("title".into()))
        );
    }

    #[test]
    fn unknown_attribute_is_rejected() {
        assert_eq!(
            check(" onclick=\"go()\"", &config()),
            Err(TagError::UnsafeAttribute("onclick".into()))
        );
    }

    #[test]
    fn dangerous_values_are_rejected() {
        let c = config();
        for attrs in [
            " href=\"javascript:alert(1)\"",
            " href=\"JaVaScRiPt:alert(1)\"",
            " href=\"java\tscript:x\"",
            " href=\"&#106;avascript:x\"",
            " href=\"vbscript:x\"",
            " style=\"background:url(evil)\"",
            " style=\"width:expr/**/ession(alert(1))\"",
            " href=\"java&Tab;script:x\"",
            " href=\"javascript&colon;x\"",
            " style=\"background:url&lpar;evil&rpar;\"",
            " href=\"vb&NewLine;script&colon;x\"",
        ] {
            assert!(
                matches!(check(attrs, &c), Err(TagError::DangerousValue(_))),
                "{attrs} accepted"
            );
        }
        assert_eq!(check(" href=\"https://example.com\" checked", &c), Ok(()));
    }
}
