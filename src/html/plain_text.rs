//! Markup to plain text.

use super::builtin;
use super::entities::decode_basic;
use crate::patterns::PatternCache;

const COMMENT: &str = r"(?s)<!--.*?(?:-->|$)";
const SCRIPT: &str = r"(?is)<script\b[^>]*>.*?(?:</script\s*>|$)";
const STYLE: &str = r"(?is)<style\b[^>]*>.*?(?:</style\s*>|$)";
const LINE_BREAK: &str = r"(?i)<br\s*/?>";
const BLOCK_END: &str =
    r"(?i)</(?:p|div|li|tr|h[1-6]|blockquote|pre|table|ul|ol|dl|dt|dd|section|article)\s*>";
const ANY_TAG: &str = r"<[^>]*>";

pub(crate) fn convert(text: &str, cache: &PatternCache) -> String {
    let mut text = text.to_owned();
    for pattern in [COMMENT, SCRIPT, STYLE] {
        text = builtin(cache, pattern).replace_all(&text, "").into_owned();
    }
    for pattern in [LINE_BREAK, BLOCK_END] {
        text = builtin(cache, pattern).replace_all(&text, "\n").into_owned();
    }
    let text = builtin(cache, ANY_TAG).replace_all(&text, "");
    decode_basic(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(text: &str) -> String {
        convert(text, &PatternCache::new())
    }

    #[test]
    fn breaks_and_blocks_become_newlines() {
        assert_eq!(run("a<br>b<BR/>c<p>d</p>e"), "a\nb\ncd\ne");
        assert_eq!(run("<ul><li>one</li><li>two</li></ul>"), "one\ntwo\n\n");
    }

    #[test]
    fn drops_scripts_styles_and_comments() {
        assert_eq!(run("a<script>x()</script><style>p{}</style><!-- c -->b"), "ab");
    }

    #[test]
    fn decodes_entities() {
        assert_eq!(run("<b>1 &lt; 2 &amp;&amp; 3 &gt; 2</b>"), "1 < 2 && 3 > 2");
    }

    /// Invariant: decoded `&lt;` cannot reintroduce tags into the result
    /// because tags are stripped before decoding.
    #[test]
    fn decoding_happens_last() {
        assert_eq!(run("&lt;i&gt;x&lt;/i&gt;"), "<i>x</i>");
    }
}
