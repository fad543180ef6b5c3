//! Single-pass whitelist escaper.

use super::attributes;
use super::config::SanitizerConfig;
use super::entities::reference_len;
use super::tag::{is_void, TagError, TagParts};
use super::Rewrite;
use std::borrow::Cow;

/// Scan the tag starting at `src[at] == '<'`. `Ok(Some(next))` copies the
/// tag through and resumes at `next`; `Ok(None)` means the tag is not
/// whitelisted and its `<` gets escaped like text.
fn scan_tag(
    src: &str,
    at: usize,
    config: &SanitizerConfig,
    open: &mut Vec<String>,
) -> Result<Option<usize>, TagError> {
    let rest = &src[at..];
    if let Some(comment) = rest.strip_prefix("<!--") {
        // `<!-->`, `<!--->` and `--!>` also end a comment.
        if comment.starts_with('>') || comment.starts_with("->") {
            return Err(TagError::AbruptComment);
        }
        return match comment.find("-->") {
            Some(end) if comment[..end].contains("--!>") => Err(TagError::AbruptComment),
            Some(end) => Ok(Some(at + 4 + end + 3)),
            None => Err(TagError::UnterminatedComment),
        };
    }

    let inner_len = match rest[1..].find(['<', '>']) {
        None => return Err(TagError::Unterminated),
        Some(n) if rest.as_bytes()[1 + n] == b'<' => return Err(TagError::NestedOpen),
        Some(n) => n,
    };
    let next = at + inner_len + 2;
    let Some(tag) = TagParts::parse(&rest[1..1 + inner_len]) else {
        return Ok(None);
    };
    // `br` is what newlines turn into, so it always survives a second pass.
    if !(tag.name.eq_ignore_ascii_case("br") || config.is_safe_tag(tag.name)) {
        return Ok(None);
    }

    let name = tag.name.to_ascii_lowercase();
    if tag.closing {
        if !tag.attrs.trim().is_empty() {
            return Err(TagError::AttributesOnClose(name));
        }
        return match open.last() {
            Some(top) if *top == name => {
                open.pop();
                Ok(Some(next))
            }
            Some(top) => Err(TagError::MismatchedClose {
                expected: top.clone(),
                found: name,
            }),
            None => Err(TagError::UnopenedClose(name)),
        };
    }

    attributes::check(tag.attrs, config)?;
    if !tag.self_closing && !is_void(&name) {
        open.push(name);
    }
    Ok(Some(next))
}

pub(crate) fn escape_unsafe<'a>(src: &'a str, config: &SanitizerConfig) -> Cow<'a, str> {
    let bytes = src.as_bytes();
    let mut out = Rewrite::new(src);
    let mut open = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        i = match bytes[i] {
            b'<' => match scan_tag(src, i, config, &mut open) {
                Ok(Some(next)) => next,
                Ok(None) => {
                    out.replace(i, 1, "&lt;");
                    i + 1
                }
                Err(e) => {
                    log::debug!("escaping malformed tag at byte {i}: {e}");
                    out.replace(i, 1, "&lt;");
                    i + 1
                }
            },
            b'>' => {
                out.replace(i, 1, "&gt;");
                i + 1
            }
            b'&' => match reference_len(&src[i..]) {
                Some(len) => i + len,
                None => {
                    out.replace(i, 1, "&amp;");
                    i + 1
                }
            },
            b' ' => {
                if i > 0 && bytes[i - 1] == b' ' {
                    out.replace(i, 1, "&nbsp;");
                }
                i + 1
            }
            b'\r' => {
                let len = if bytes.get(i + 1) == Some(&b'\n') { 2 } else { 1 };
                out.replace(i, len, "<br/>");
                i + len
            }
            b'\n' => {
                out.replace(i, 1, "<br/>");
                i + 1
            }
            _ => i + 1,
        };
    }
    while let Some(name) = open.pop() {
        out.append(&format!("</{name}>"));
    }
    out.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(safe_tags: &str, safe_attrs: &str, text: &str) -> String {
        let config = SanitizerConfig::from_lists(safe_tags, safe_attrs).unwrap();
        escape_unsafe(text, &config).into_owned()
    }

    #[test]
    fn safe_tags_pass_through() {
        assert_eq!(run("b", "", "<b>hi</b>"), "<b>hi</b>");
        assert_eq!(run("b", "", "<B>hi</b>"), "<B>hi</b>");
    }

    #[test]
    fn unsafe_tags_are_escaped() {
        assert_eq!(
            run("", "", "<script>alert(1)</script>"),
            "&lt;script&gt;alert(1)&lt;/script&gt;"
        );
    }

    #[test]
    fn dangling_tags_close_in_reverse_order() {
        assert_eq!(run("div,b", "", "<div><b>text"), "<div><b>text</b></div>");
    }

    #[test]
    fn mismatched_close_is_escaped() {
        assert_eq!(
            run("b,i", "", "<b><i>x</b></i>"),
            "<b><i>x&lt;/b&gt;</i></b>"
        );
        assert_eq!(run("b", "", "x</b>"), "x&lt;/b&gt;");
    }

    #[test]
    fn space_runs_collapse() {
        assert_eq!(run("", "", "a   b"), "a &nbsp;&nbsp;b");
        assert_eq!(run("", "", "a b"), "a b");
    }

    #[test]
    fn newlines_become_breaks() {
        assert_eq!(run("", "", "a\nb\r\nc\rd"), "a<br/>b<br/>c<br/>d");
    }

    #[test]
    fn entities() {
        assert_eq!(run("", "", "&amp; &nbsp;&#39; & &bogus;"), "&amp; &nbsp;&#39; &amp; &amp;bogus;");
    }

    #[test]
    fn comments_pass_verbatim() {
        assert_eq!(run("", "", "a<!-- <script> -->b"), "a<!-- <script> -->b");
        assert_eq!(run("", "", "a<!-- open"), "a&lt;!-- open");
    }

    /// Invariant: markup after an early comment close is scanned, not copied.
    #[test]
    fn abrupt_comments_are_escaped() {
        assert_eq!(
            run("", "", "<!--><script>x</script>-->"),
            "&lt;!--&gt;&lt;script&gt;x&lt;/script&gt;--&gt;"
        );
        assert_eq!(
            run("", "", "<!---><script>x</script>-->"),
            "&lt;!---&gt;&lt;script&gt;x&lt;/script&gt;--&gt;"
        );
        assert_eq!(
            run("", "", "<!-- a --!><script>x</script>-->"),
            "&lt;!-- a --!&gt;&lt;script&gt;x&lt;/script&gt;--&gt;"
        );
        assert_eq!(run("", "", "<!-- a - b -->"), "<!-- a - b -->");
    }

    #[test]
    fn syntax_errors_escape_only_the_bracket() {
        assert_eq!(run("b", "", "a < b"), "a &lt; b");
        assert_eq!(run("b", "", "<b<b>x</b>"), "&lt;b<b>x</b>");
    }

    #[test]
    fn attributes_are_checked() {
        assert_eq!(
            run("a", "href", r#"<a href="https://x">l</a>"#),
            r#"<a href="https://x">l</a>"#
        );
        assert_eq!(
            run("a", "href", r#"<a href="javascript:go()">l</a>"#),
            r#"&lt;a href="javascript:go()"&gt;l&lt;/a&gt;"#
        );
        assert_eq!(
            run("a", "href", r#"<a onclick="go()">l</a>"#),
            r#"&lt;a onclick="go()"&gt;l&lt;/a&gt;"#
        );
    }

    #[test]
    fn void_and_self_closing_tags_stay_off_the_stack() {
        assert_eq!(run("img,p", "src", "<p><img src=a.png>x"), "<p><img src=a.png>x</p>");
        assert_eq!(run("p", "", "<p/>x<br>"), "<p/>x<br>");
    }

    #[test]
    fn nameless_tags_are_text() {
        assert_eq!(run("p", "", "< /p>"), "&lt; /p&gt;");
    }

    /// Invariant: clean input is returned without allocating.
    #[test]
    fn clean_input_is_borrowed() {
        let config = SanitizerConfig::from_lists("b", "").unwrap();
        assert!(matches!(
            escape_unsafe("<b>ok</b> fine", &config),
            Cow::Borrowed(_)
        ));
    }

    #[test]
    fn output_is_a_fixed_point() {
        let config = SanitizerConfig::from_lists("b,i,div,a", "href").unwrap();
        for text in [
            "<b>hi</b>",
            "<div><b>open",
            "a   b\nc",
            "<script>x</script> & <i>y</b>",
            "<a href='javascript:x'>z</a><!-- c -->",
        ] {
            let once = escape_unsafe(text, &config).into_owned();
            let twice = escape_unsafe(&once, &config).into_owned();
            assert_eq!(once, twice, "not idempotent for {text:?}");
        }
    }
}
