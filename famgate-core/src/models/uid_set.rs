//! Ordered, duplicate-free list of user ids.
//!
//! Membership arrays on profiles and families are stored as JSON arrays.
//! All mutation goes through [`UidSet::insert`] and [`UidSet::remove`] so
//! repeated adds and removes are idempotent.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct UidSet(Vec<String>);

impl UidSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends `uid` unless it is already present. Returns true if added.
    pub fn insert(&mut self, uid: impl Into<String>) -> bool {
        let uid = uid.into();
        if self.contains(&uid) {
            return false;
        }
        self.0.push(uid);
        true
    }

    /// Removes `uid` if present. Returns true if removed.
    pub fn remove(&mut self, uid: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|u| u != uid);
        before != self.0.len()
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.0.iter().any(|u| u == uid)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of times `uid` occurs. Always 0 or 1.
    pub fn count(&self, uid: &str) -> usize {
        self.0.iter().filter(|u| *u == uid).count()
    }
}

impl TryFrom<Vec<String>> for UidSet {
    type Error = String;

    fn try_from(values: Vec<String>) -> Result<Self, Self::Error> {
        let mut set = UidSet::new();
        for value in values {
            if !set.insert(value.clone()) {
                return Err(format!("duplicate uid '{}' in membership list", value));
            }
        }
        Ok(set)
    }
}

impl From<UidSet> for Vec<String> {
    fn from(set: UidSet) -> Self {
        set.0
    }
}

impl<S: Into<String>> FromIterator<S> for UidSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = UidSet::new();
        for uid in iter {
            set.insert(uid);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_is_idempotent() {
        let mut set = UidSet::new();
        assert!(set.insert("a"));
        assert!(!set.insert("a"));
        assert!(set.insert("b"));

        assert_eq!(set.len(), 2);
        assert_eq!(set.count("a"), 1);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut set: UidSet = ["a", "b"].into_iter().collect();
        assert!(!set.remove("z"));
        assert!(set.remove("a"));
        assert!(!set.remove("a"));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn test_deserialize_rejects_duplicates() {
        let result: Result<UidSet, _> = serde_json::from_str(r#"["a","b","a"]"#);
        let err = result.unwrap_err();
        assert!(err.to_string().contains("duplicate uid 'a'"));
    }

    #[test]
    fn test_serializes_as_plain_array() {
        let set: UidSet = ["x", "y"].into_iter().collect();
        assert_eq!(serde_json::to_string(&set).unwrap(), r#"["x","y"]"#);
    }
}
