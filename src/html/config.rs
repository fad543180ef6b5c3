//! Whitelist configuration held by a sanitizer instance.

use hashbrown::HashSet;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("empty name in safe {kind} list")]
    EmptyName { kind: &'static str },
    #[error("invalid character in safe {kind} name `{name}`")]
    InvalidName { kind: &'static str, name: String },
}

/// Tag and attribute names allowed through the sanitizer. Names are stored
/// lowercase and matched case-insensitively.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "ConfigLists")
)]
pub struct SanitizerConfig {
    safe_tags: HashSet<String>,
    safe_attrs: HashSet<String>,
}

#[cfg(feature = "serde")]
#[derive(serde::Deserialize, Default)]
#[serde(default)]
struct ConfigLists {
    safe_tags: Vec<String>,
    safe_attrs: Vec<String>,
}

#[cfg(feature = "serde")]
impl TryFrom<ConfigLists> for SanitizerConfig {
    type Error = ConfigError;

    fn try_from(lists: ConfigLists) -> Result<Self, ConfigError> {
        Self::new(lists.safe_tags, lists.safe_attrs)
    }
}

fn normalize<I>(names: I, kind: &'static str) -> Result<HashSet<String>, ConfigError>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    names
        .into_iter()
        .map(|name| {
            let name = name.as_ref().trim();
            if name.is_empty() {
                return Err(ConfigError::EmptyName { kind });
            }
            if !name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b':'))
            {
                return Err(ConfigError::InvalidName {
                    kind,
                    name: name.to_owned(),
                });
            }
            Ok(name.to_ascii_lowercase())
        })
        .collect()
}

fn contains_folded(set: &HashSet<String>, name: &str) -> bool {
    if name.bytes().any(|b| b.is_ascii_uppercase()) {
        set.contains(name.to_ascii_lowercase().as_str())
    } else {
        set.contains(name)
    }
}

impl SanitizerConfig {
    pub fn new<T, A>(tags: T, attrs: A) -> Result<Self, ConfigError>
    where
        T: IntoIterator,
        T::Item: AsRef<str>,
        A: IntoIterator,
        A::Item: AsRef<str>,
    {
        Ok(Self {
            safe_tags: normalize(tags, "tag")?,
            safe_attrs: normalize(attrs, "attribute")?,
        })
    }

    /// Comma-separated lists, e.g. `from_lists("b,i,a", "href,title")`.
    /// An empty string yields an empty list.
    pub fn from_lists(tags: &str, attrs: &str) -> Result<Self, ConfigError> {
        fn split(list: &str) -> impl Iterator<Item = &str> {
            let list = list.trim();
            list.split(',').filter(move |_| !list.is_empty())
        }
        Self::new(split(tags), split(attrs))
    }

    pub fn is_safe_tag(&self, name: &str) -> bool {
        contains_folded(&self.safe_tags, name)
    }

    pub fn is_safe_attr(&self, name: &str) -> bool {
        contains_folded(&self.safe_attrs, name)
    }

    pub fn safe_tags(&self) -> impl Iterator<Item = &str> + '_ {
        self.safe_tags.iter().map(String::as_str)
    }

    pub fn safe_attrs(&self) -> impl Iterator<Item = &str> + '_ {
        self.safe_attrs.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_match_case_insensitively() {
        let c = SanitizerConfig::new(["B", "div"], ["HREF"]).unwrap();
        assert!(c.is_safe_tag("b"));
        assert!(c.is_safe_tag("DIV"));
        assert!(c.is_safe_attr("href"));
        assert!(!c.is_safe_tag("script"));
    }

    #[test]
    fn from_lists_splits_and_trims() {
        let c = SanitizerConfig::from_lists(" b, i ,a", "").unwrap();
        let mut tags: Vec<_> = c.safe_tags().collect();
        tags.sort_unstable();
        assert_eq!(tags, ["a", "b", "i"]);
        assert_eq!(c.safe_attrs().count(), 0);
    }

    #[test]
    fn rejects_bad_names() {
        assert_eq!(
            SanitizerConfig::from_lists("b,,i", ""),
            Err(ConfigError::EmptyName { kind: "tag" })
        );
        assert_eq!(
            SanitizerConfig::new(["b"], ["on click"]),
            Err(ConfigError::InvalidName {
                kind: "attribute",
                name: "on click".into()
            })
        );
    }
}
