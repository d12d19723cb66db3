//! Typed addressing of documents in the store.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use log::warn;

//------------ Segment -------------------------------------------------------

/// A single component of a [`DocPath`].
///
/// A nonempty string that does not start or end with whitespace and does
/// not contain the path separator.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Segment(String);

impl Segment {
    pub fn parse(value: &str) -> Result<Self, ParsePathError> {
        if value.is_empty() {
            Err(ParsePathError::EmptySegment)
        } else if value.trim() != value {
            Err(ParsePathError::Whitespace(value.to_string()))
        } else if value.contains(DocPath::SEPARATOR) {
            Err(ParsePathError::Separator(value.to_string()))
        } else {
            Ok(Segment(value.to_string()))
        }
    }

    /// Parses a segment out of an externally supplied string, replacing
    /// anything that would break pathing rather than failing.
    pub fn parse_lossy(value: &str) -> Self {
        match Segment::parse(value) {
            Ok(segment) => segment,
            Err(error) => {
                let sanitized = value.trim().replace(DocPath::SEPARATOR, "+");
                let nonempty = if sanitized.is_empty() {
                    "EMPTY".to_string()
                } else {
                    sanitized
                };
                let segment = Segment(nonempty);
                warn!("'{}' is not a valid path segment: {}. Using '{}' instead.", value, error, segment);
                segment
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Segment {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Segment {
    type Err = ParsePathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Segment::parse(s)
    }
}

//------------ DocPath -------------------------------------------------------

/// The location of a document in the store.
///
/// Consists of one or more [`Segment`]s, alternating collection and
/// document names the way the substrate lays out its tree. Paths are
/// compared and hashed structurally, so they can key snapshots and
/// version tables directly.
#[derive(Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DocPath {
    segments: Vec<Segment>,
}

impl DocPath {
    /// Character used to split on when parsing a path from a string.
    pub const SEPARATOR: char = '/';

    pub fn new(segments: Vec<Segment>) -> Self {
        DocPath { segments }
    }

    pub fn from_segment(segment: Segment) -> Self {
        DocPath::new(vec![segment])
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns whether this path equals the prefix or lies underneath it.
    pub fn starts_with(&self, prefix: &DocPath) -> bool {
        if prefix.segments.len() <= self.segments.len() {
            self.segments[0..prefix.segments.len()] == prefix.segments
        } else {
            false
        }
    }

    /// Create a new path with a segment appended.
    pub fn with_child(&self, child: impl Into<Segment>) -> Self {
        let mut clone = self.clone();
        clone.push(child);
        clone
    }

    /// Append a segment.
    pub fn push(&mut self, child: impl Into<Segment>) {
        self.segments.push(child.into());
    }
}

impl Display for DocPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            self.segments
                .iter()
                .map(|segment| segment.as_str())
                .collect::<Vec<_>>()
                .join(Self::SEPARATOR.encode_utf8(&mut [0; 4]))
        )
    }
}

impl FromStr for DocPath {
    type Err = ParsePathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_suffix(Self::SEPARATOR).unwrap_or(s);
        let segments = s
            .split(Self::SEPARATOR)
            .map(Segment::from_str)
            .collect::<Result<_, _>>()?;
        Ok(DocPath { segments })
    }
}

impl From<Segment> for DocPath {
    fn from(segment: Segment) -> Self {
        DocPath::from_segment(segment)
    }
}

impl FromIterator<Segment> for DocPath {
    fn from_iter<T: IntoIterator<Item = Segment>>(iter: T) -> Self {
        DocPath {
            segments: iter.into_iter().collect(),
        }
    }
}

//------------ ParsePathError ------------------------------------------------

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ParsePathError {
    EmptySegment,
    Whitespace(String),
    Separator(String),
}

impl Display for ParsePathError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ParsePathError::EmptySegment => write!(f, "path segments must be nonempty"),
            ParsePathError::Whitespace(s) => {
                write!(f, "path segment '{}' starts or ends with whitespace", s)
            }
            ParsePathError::Separator(s) => {
                write!(f, "path segment '{}' contains the separator", s)
            }
        }
    }
}

impl std::error::Error for ParsePathError {}

//------------ Tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_segment() {
        assert!(Segment::parse("users").is_ok());
        assert_eq!(Segment::parse(""), Err(ParsePathError::EmptySegment));
        assert_eq!(
            Segment::parse(" users"),
            Err(ParsePathError::Whitespace(" users".to_string()))
        );
        assert_eq!(
            Segment::parse("a/b"),
            Err(ParsePathError::Separator("a/b".to_string()))
        );
    }

    #[test]
    fn parse_lossy_sanitizes() {
        assert_eq!(Segment::parse_lossy("a/b").as_str(), "a+b");
        assert_eq!(Segment::parse_lossy("  ").as_str(), "EMPTY");
        assert_eq!(Segment::parse_lossy("plain").as_str(), "plain");
    }

    #[test]
    fn path_starts_with() {
        let full: DocPath = "users/alice/pantry/items".parse().unwrap();
        let prefix: DocPath = "users/alice".parse().unwrap();
        let other: DocPath = "users/bob".parse().unwrap();

        assert!(full.starts_with(&prefix));
        assert!(prefix.starts_with(&prefix));
        assert!(!prefix.starts_with(&full));
        assert!(!full.starts_with(&other));
    }

    #[test]
    fn path_display_round_trip() {
        let path: DocPath = "users/alice/social/friends".parse().unwrap();
        assert_eq!(path.to_string(), "users/alice/social/friends");
        assert_eq!(path.to_string().parse::<DocPath>().unwrap(), path);
    }
}
