//! Name maps
//!
//! Ordered `PATTERN=TEMPLATE` rewrite rules. Each pattern is an anchored
//! regex; `{0}`..`{N}` in the template refer to its capture groups. The first
//! matching rule wins.

use std::fmt;
use std::str::FromStr;

use regex::Regex;

use crate::error::{Error, Result};

/// A single rewrite rule
#[derive(Debug, Clone)]
pub struct NameMapItem {
    pattern: Regex,
    template: String,
    source: String,
}

impl NameMapItem {
    pub fn parse(rule: &str) -> Result<Self> {
        let mut parts = rule.split('=');
        let (Some(pattern), Some(template), None) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::NameMap {
                rule: rule.to_string(),
                reason: "expected exactly one '=' between pattern and template".to_string(),
            });
        };

        let pattern = Regex::new(&format!("^(?:{pattern})$")).map_err(|err| Error::NameMap {
            rule: rule.to_string(),
            reason: err.to_string(),
        })?;

        Ok(Self {
            pattern,
            template: template.to_string(),
            source: rule.to_string(),
        })
    }

    /// Rewrite `input` if the rule matches it.
    pub fn apply(&self, input: &str) -> Option<String> {
        let captures = self.pattern.captures(input)?;
        let mut result = self.template.clone();
        for group in 1..captures.len() {
            let value = captures.get(group).map(|m| m.as_str()).unwrap_or("");
            result = result.replace(&format!("{{{}}}", group - 1), value);
        }
        Some(result)
    }

    pub fn matches(&self, input: &str) -> bool {
        self.pattern.is_match(input)
    }
}

impl fmt::Display for NameMapItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for NameMapItem {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// An ordered list of rules
#[derive(Debug, Clone, Default)]
pub struct NameMap {
    items: Vec<NameMapItem>,
}

impl NameMap {
    pub fn new(items: Vec<NameMapItem>) -> Self {
        Self { items }
    }

    pub fn from_rules<S: AsRef<str>>(rules: &[S]) -> Result<Self> {
        let items = rules
            .iter()
            .map(|rule| NameMapItem::parse(rule.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { items })
    }

    /// Result of the first matching rule
    pub fn apply(&self, input: &str) -> Option<String> {
        self.items.iter().find_map(|item| item.apply(input))
    }

    pub fn matches(&self, input: &str) -> bool {
        self.items.iter().any(|item| item.matches(input))
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_first_match() {
        let map =
            NameMap::from_rules(&["/definitions/([^/]*)/?={0}", "/components/schemas/(.*)=Api{0}"])
                .unwrap();
        assert_eq!(map.apply("/definitions/Foo"), Some("Foo".to_string()));
        assert_eq!(map.apply("/components/schemas/Bar"), Some("ApiBar".to_string()));
        assert_eq!(map.apply("/other/Baz"), None);
    }

    #[test]
    fn test_pattern_is_anchored() {
        let map = NameMap::from_rules(&["a(b)=x{0}"]).unwrap();
        assert!(map.matches("ab"));
        assert!(!map.matches("zab"));
        assert!(!map.matches("abz"));
    }

    #[test]
    fn test_multiple_groups() {
        let item: NameMapItem = "schemas/(.*)/(.*)\\.yaml=ns/{0}/{1}".parse().unwrap();
        assert_eq!(item.apply("schemas/api/types.yaml"), Some("ns/api/types".to_string()));
    }

    #[test]
    fn test_malformed_rules() {
        assert!(matches!(NameMapItem::parse("no-equals"), Err(Error::NameMap { .. })));
        assert!(matches!(NameMapItem::parse("a=b=c"), Err(Error::NameMap { .. })));
        assert!(matches!(NameMapItem::parse("(unclosed=x"), Err(Error::NameMap { .. })));
    }
}
