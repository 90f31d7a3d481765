//! Canonical search query strings.

use std::collections::BTreeMap;
use std::fmt;
use url::form_urlencoded;

/// A parsed query string whose serialized form is independent of parameter order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CanonicalQuery {
    params: BTreeMap<String, Vec<String>>,
}

impl CanonicalQuery {
    /// Parse `application/x-www-form-urlencoded` text. A leading `?` and empty
    /// `&` segments are ignored; repeated keys keep every value.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim().trim_start_matches('?');
        let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for (key, value) in form_urlencoded::parse(trimmed.as_bytes()) {
            if key.is_empty() {
                continue;
            }
            params
                .entry(key.into_owned())
                .or_default()
                .push(value.into_owned());
        }

        Self { params }
    }

    /// Drop every parameter whose name matches one of `keys`, ignoring case.
    pub fn without_keys<S: AsRef<str>>(mut self, keys: &[S]) -> Self {
        self.params
            .retain(|name, _| !keys.iter().any(|k| k.as_ref().eq_ignore_ascii_case(name)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.params.get(key).map(Vec::as_slice)
    }
}

impl fmt::Display for CanonicalQuery {
    /// Keys in ordinal order, each key's values in ordinal order, no leading `?`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, values) in &self.params {
            let mut sorted: Vec<&String> = values.iter().collect();
            sorted.sort();
            for value in sorted {
                serializer.append_pair(key, value);
            }
        }
        f.write_str(&serializer.finish())
    }
}

/// Canonical text of `raw` with the paging/sorting `remove_keys` stripped.
pub fn canonicalize_query<S: AsRef<str>>(raw: &str, remove_keys: &[S]) -> String {
    CanonicalQuery::parse(raw).without_keys(remove_keys).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_KEYS: &[&str] = &[];

    #[test]
    fn test_order_and_noise_invariant() {
        let q1 = canonicalize_query("a=b&a=c&d=e&f=g&g=h", NO_KEYS);
        let q2 = canonicalize_query("?a=b&a=c&d=e&f=g&g=h&", NO_KEYS);
        let q3 = canonicalize_query("&d=e&f=g&a=b&a=c&g=h&&&&", NO_KEYS);
        let q4 = canonicalize_query("&g=h&a=c&d=e&f=g&a=b&", NO_KEYS);

        assert_eq!(q1, "a=b&a=c&d=e&f=g&g=h");
        assert!([&q2, &q3, &q4].iter().all(|q| **q == q1));
    }

    #[test]
    fn test_paging_keys_removed_case_insensitively() {
        let keys = ["pagenumber", "pagesize", "sort"];
        let a = canonicalize_query("?name=bob&PageNumber=2&pagesize=20", &keys);
        let b = canonicalize_query("sort=name&name=bob", &keys);
        assert_eq!(a, "name=bob");
        assert_eq!(a, b);
    }

    #[test]
    fn test_spaces_are_encoded() {
        let q = canonicalize_query("?Keywords=&RegisteredOfficeLocations=United+Kingdom", NO_KEYS);
        assert_eq!(q, "Keywords=&RegisteredOfficeLocations=United+Kingdom");
        assert!(!q.contains(' '));

        let parsed = CanonicalQuery::parse(&q);
        assert_eq!(parsed.get("RegisteredOfficeLocations"), Some(&["United Kingdom".to_string()][..]));
    }

    #[test]
    fn test_empty_query() {
        assert_eq!(canonicalize_query("", NO_KEYS), "");
        assert_eq!(canonicalize_query("?", NO_KEYS), "");
        assert!(CanonicalQuery::parse("&&").is_empty());
    }
}
