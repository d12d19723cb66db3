//! User identifiers and ordered id sets.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::commons::storage::Segment;

//------------ UserId --------------------------------------------------------

/// An opaque user identifier issued by the identity provider.
///
/// No structure beyond nonemptiness is assumed; ids travel through the
/// system as-is and only get sanitized when they become path segments.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        UserId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_segment(&self) -> Segment {
        Segment::parse_lossy(&self.0)
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for UserId {
    type Err = ParseUserIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            Err(ParseUserIdError)
        } else {
            Ok(UserId(s.to_string()))
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParseUserIdError;

impl Display for ParseUserIdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("user ids must be nonempty")
    }
}

impl std::error::Error for ParseUserIdError {}

//------------ IdSet ---------------------------------------------------------

/// An insertion-ordered set of user ids.
///
/// Serialized as a plain JSON array. Membership is what matters:
/// insert and remove are idempotent and report whether they changed
/// anything, and duplicate ids arriving from outside collapse to a
/// single element on deserialization.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct IdSet {
    ids: Vec<UserId>,
}

impl IdSet {
    pub fn new() -> Self {
        IdSet::default()
    }

    /// Adds the id unless present. Returns whether the set changed.
    pub fn insert(&mut self, id: UserId) -> bool {
        if self.contains(&id) {
            false
        } else {
            self.ids.push(id);
            true
        }
    }

    /// Removes the id if present. Returns whether the set changed.
    pub fn remove(&mut self, id: &UserId) -> bool {
        let before = self.ids.len();
        self.ids.retain(|member| member != id);
        self.ids.len() != before
    }

    pub fn contains(&self, id: &UserId) -> bool {
        self.ids.iter().any(|member| member == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &UserId> {
        self.ids.iter()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl FromIterator<UserId> for IdSet {
    fn from_iter<T: IntoIterator<Item = UserId>>(iter: T) -> Self {
        let mut set = IdSet::new();
        for id in iter {
            set.insert(id);
        }
        set
    }
}

impl<'a> IntoIterator for &'a IdSet {
    type Item = &'a UserId;
    type IntoIter = std::slice::Iter<'a, UserId>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.iter()
    }
}

impl IntoIterator for IdSet {
    type Item = UserId;
    type IntoIter = std::vec::IntoIter<UserId>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.into_iter()
    }
}

impl<'de> Deserialize<'de> for IdSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ids = Vec::<UserId>::deserialize(deserializer)?;
        Ok(ids.into_iter().collect())
    }
}

//------------ Tests ---------------------------------------------------------
