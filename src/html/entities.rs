//! Character references the sanitizer lets through unchanged.

/// Named references passed through verbatim. Sorted for binary search.
const NAMED: &[&str] = &[
    "amp", "apos", "bull", "cent", "copy", "deg", "divide", "euro", "frac12", "frac14",
    "frac34", "gt", "hellip", "iexcl", "iquest", "laquo", "ldquo", "lsquo", "lt", "mdash",
    "middot", "nbsp", "ndash", "para", "plusmn", "pound", "quot", "raquo", "rdquo", "reg",
    "rsquo", "sect", "sup2", "sup3", "times", "trade", "yen",
];

const MAX_DIGITS: usize = 7;

/// Length of the known character reference at the start of `s`, which
/// begins with `&`. Covers the named set and `&#NNN;` / `&#xHHH;` forms.
pub(crate) fn reference_len(s: &str) -> Option<usize> {
    let body = s.strip_prefix('&')?;
    let end = body.bytes().take(MAX_DIGITS + 2).position(|b| b == b';')?;
    let name = &body[..end];
    let known = if let Some(num) = name.strip_prefix('#') {
        match num.strip_prefix(['x', 'X']) {
            Some(hex) => !hex.is_empty() && hex.bytes().all(|b| b.is_ascii_hexdigit()),
            None => !num.is_empty() && num.bytes().all(|b| b.is_ascii_digit()),
        }
    } else {
        NAMED.binary_search(&name).is_ok()
    };
    known.then_some(end + 2)
}

/// Decode the references plain text needs: the markup-significant ones,
/// `&nbsp;`, and numeric forms. Anything else stays as written.
pub(crate) fn decode_basic(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(at) = rest.find('&') {
        out.push_str(&rest[..at]);
        rest = &rest[at..];
        let decoded = reference_len(rest).and_then(|len| {
            let ch = decode_one(&rest[1..len - 1])?;
            Some((ch, len))
        });
        match decoded {
            Some((ch, len)) => {
                out.push(ch);
                rest = &rest[len..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_one(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let num = name.strip_prefix('#')?;
            let code = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

/// Decode numeric references only. Used to unmask attribute values such as
/// `&#106;avascript:` before pattern checks.
pub(crate) fn decode_numeric(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(at) = rest.find("&#") {
        out.push_str(&rest[..at]);
        rest = &rest[at + 2..];
        let (digits, radix) = match rest.strip_prefix(['x', 'X']) {
            Some(hex) => (hex, 16),
            None => (rest, 10),
        };
        let len = digits
            .bytes()
            .take_while(|b| (*b as char).is_digit(radix))
            .count();
        let ch = u32::from_str_radix(&digits[..len], radix)
            .ok()
            .and_then(char::from_u32);
        match ch {
            Some(ch) if len > 0 => {
                out.push(ch);
                rest = &digits[len..];
                rest = rest.strip_prefix(';').unwrap_or(rest);
            }
            _ => out.push_str("&#"),
        }
    }
    out.push_str(rest);
    out
}

/// Named references browsers decode in attribute values that can spell a
/// scheme separator, a call or a gap inside a scheme name.
const UNMASK: &[(&str, &str)] = &[
    ("&NewLine;", "\n"),
    ("&Tab;", "\t"),
    ("&colon;", ":"),
    ("&lpar;", "("),
    ("&rpar;", ")"),
];

/// Numeric references plus the [`UNMASK`] set, ahead of the danger check.
pub(crate) fn decode_for_check(s: &str) -> String {
    let mut out = decode_numeric(s);
    for (name, with) in UNMASK {
        if out.contains(name) {
            out = out.replace(name, with);
        }
    }
    out
}
