//! Tag sets
//!
//! Each record carries a set of string flags in its `tags` column, stored as
//! a JSON array of distinct strings. Mutations validate against the record
//! kind's permitted vocabulary before touching the set, so a rejected call
//! leaves the prior state intact. A NULL column always decodes to the empty
//! set; callers never see an absent tag set.

use std::collections::BTreeSet;

use crate::{Error, Result};

/// A set of tag strings owned by one record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet {
    tags: BTreeSet<String>,
}

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// True if any of the given tags is present
    pub fn has_any<'a, I>(&self, tags: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        tags.into_iter().any(|t| self.contains(t))
    }

    /// Add tags after validating every one against the permitted vocabulary.
    ///
    /// `allowed` is `None` when the record kind enforces no restriction;
    /// otherwise every incoming tag must be a member. On rejection the set
    /// is left unchanged.
    pub fn insert_checked<I, S>(&mut self, tags: I, allowed: Option<&[&str]>) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let incoming: Vec<String> = tags.into_iter().map(Into::into).collect();
        if let Some(allowed) = allowed {
            let rejected: Vec<String> = incoming
                .iter()
                .filter(|t| !allowed.contains(&t.as_str()))
                .cloned()
                .collect();
            if !rejected.is_empty() {
                return Err(Error::InvalidTag {
                    tags: rejected,
                    allowed: allowed.iter().map(|t| t.to_string()).collect(),
                });
            }
        }
        self.tags.extend(incoming);
        Ok(())
    }

    /// Remove tags; absent ones are ignored
    pub fn remove<'a, I>(&mut self, tags: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for tag in tags {
            self.tags.remove(tag);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    /// Wire format: a JSON array of distinct strings, sorted
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.tags)?)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let tags: BTreeSet<String> = serde_json::from_str(raw)?;
        Ok(Self { tags })
    }
}

impl FromIterator<String> for TagSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self { tags: iter.into_iter().collect() }
    }
}

impl<'a> FromIterator<&'a str> for TagSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        iter.into_iter().map(String::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_within_vocabulary() {
        let mut tags = TagSet::new();
        tags.insert_checked(["FOO"], Some(&["FOO", "BAR"])).unwrap();
        assert!(tags.contains("FOO"));
        assert!(!tags.contains("BAR"));
    }

    #[test]
    fn test_rejected_insert_leaves_set_unchanged() {
        let mut tags = TagSet::new();
        tags.insert_checked(["FOO"], Some(&["FOO"])).unwrap();

        let err = tags.insert_checked(["FOO", "BAZ"], Some(&["FOO"])).unwrap_err();
        match err {
            Error::InvalidTag { tags: rejected, allowed } => {
                assert_eq!(rejected, vec!["BAZ".to_string()]);
                assert_eq!(allowed, vec!["FOO".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(tags.contains("FOO"));
        assert!(!tags.contains("BAZ"));
        assert_eq!(tags.len(), 1);
    }

    #[test]
    fn test_unrestricted_kind_accepts_anything() {
        let mut tags = TagSet::new();
        tags.insert_checked(["ANYTHING"], None).unwrap();
        assert!(tags.contains("ANYTHING"));
    }

    #[test]
    fn test_empty_vocabulary_rejects_all() {
        let mut tags = TagSet::new();
        assert!(tags.insert_checked(["FOO"], Some(&[])).is_err());
        assert!(tags.is_empty());
    }

    #[test]
    fn test_remove_ignores_absent() {
        let mut tags: TagSet = ["A", "B"].into_iter().collect();
        tags.remove(["B", "MISSING"]);
        assert!(tags.contains("A"));
        assert!(!tags.contains("B"));
    }

    #[test]
    fn test_json_round_trip() {
        let tags: TagSet = ["FOO", "BAR"].into_iter().collect();
        let json = tags.to_json().unwrap();
        assert_eq!(json, r#"["BAR","FOO"]"#);
        assert_eq!(TagSet::from_json(&json).unwrap(), tags);
    }

    #[test]
    fn test_has_any() {
        let tags: TagSet = ["FOO"].into_iter().collect();
        assert!(tags.has_any(["BAZ", "FOO"]));
        assert!(!tags.has_any(["BAZ", "QUX"]));
    }
}
