/// Key-path addressing for the realtime store.
///
/// Layout:
///   boarddata/{workerId}/notes/{noteId}
///   categories/{categoryId}
///   locks/{noteId}
///   presence/{userId}
///   snapshots/{snapshotId}
///   customPalette
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::StoreError;

pub const BOARDDATA: &str = "boarddata";
pub const CATEGORIES: &str = "categories";
pub const LOCKS: &str = "locks";
pub const PRESENCE: &str = "presence";
pub const SNAPSHOTS: &str = "snapshots";
pub const CUSTOM_PALETTE: &str = "customPalette";

const FORBIDDEN_CHARS: &[char] = &['.', '#', '$', '[', ']'];

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyPath(Vec<String>);

impl KeyPath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Parse a `/`-separated path. Leading and trailing slashes are ignored.
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        let trimmed = raw.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        let mut segments = Vec::new();
        for segment in trimmed.split('/') {
            validate_segment(segment).map_err(|reason| {
                StoreError::InvalidPath(format!("{}: {}", raw, reason))
            })?;
            segments.push(segment.to_string());
        }
        Ok(Self(segments))
    }

    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    /// Append a relative `/`-separated path, as used by partial updates.
    pub fn join(&self, relative: &str) -> Result<Self, StoreError> {
        let rel = Self::parse(relative)?;
        let mut segments = self.0.clone();
        segments.extend(rel.0);
        Ok(Self(segments))
    }

    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn first(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// True when `self` equals `other` or lies below it.
    pub fn starts_with(&self, other: &KeyPath) -> bool {
        self.0.len() >= other.0.len() && self.0[..other.0.len()] == other.0[..]
    }

    /// True when one path contains the other; a change at either affects both.
    pub fn overlaps(&self, other: &KeyPath) -> bool {
        self.starts_with(other) || other.starts_with(self)
    }
}

fn validate_segment(segment: &str) -> Result<(), &'static str> {
    if segment.is_empty() {
        return Err("empty segment");
    }
    if segment.contains(FORBIDDEN_CHARS) {
        return Err("segment contains one of . # $ [ ]");
    }
    Ok(())
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0.join("/"))
    }
}

impl Serialize for KeyPath {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for KeyPath {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        KeyPath::parse(&raw).map_err(serde::de::Error::custom)
    }
}

pub fn boarddata() -> KeyPath {
    KeyPath::root().child(BOARDDATA)
}

pub fn worker(worker_id: &str) -> KeyPath {
    boarddata().child(worker_id)
}

pub fn notes(worker_id: &str) -> KeyPath {
    worker(worker_id).child("notes")
}

pub fn note(worker_id: &str, note_id: &str) -> KeyPath {
    notes(worker_id).child(note_id)
}

pub fn categories() -> KeyPath {
    KeyPath::root().child(CATEGORIES)
}

pub fn category(category_id: &str) -> KeyPath {
    categories().child(category_id)
}

pub fn locks() -> KeyPath {
    KeyPath::root().child(LOCKS)
}

pub fn lock(note_id: &str) -> KeyPath {
    locks().child(note_id)
}

pub fn presence() -> KeyPath {
    KeyPath::root().child(PRESENCE)
}

pub fn presence_user(user_id: &str) -> KeyPath {
    presence().child(user_id)
}

pub fn snapshots() -> KeyPath {
    KeyPath::root().child(SNAPSHOTS)
}

pub fn snapshot(snapshot_id: &str) -> KeyPath {
    snapshots().child(snapshot_id)
}

pub fn custom_palette() -> KeyPath {
    KeyPath::root().child(CUSTOM_PALETTE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let path = KeyPath::parse("/boarddata/w1/notes/n1/").unwrap();
        assert_eq!(path.segments().len(), 4);
        assert_eq!(path.to_string(), "/boarddata/w1/notes/n1");
        assert_eq!(path, note("w1", "n1"));
        assert!(KeyPath::parse("").unwrap().is_root());
    }

    #[test]
    fn test_parse_rejects_bad_segments() {
        assert!(KeyPath::parse("boarddata//w1").is_err());
        assert!(KeyPath::parse("locks/a.b").is_err());
        assert!(KeyPath::parse("locks/$x").is_err());
        assert!(KeyPath::parse("locks/[0]").is_err());
    }

    #[test]
    fn test_prefix_relations() {
        let parent = notes("w1");
        let child = note("w1", "n1");
        assert!(child.starts_with(&parent));
        assert!(!parent.starts_with(&child));
        assert!(parent.overlaps(&child));
        assert!(!lock("n1").overlaps(&child));
        assert!(child.starts_with(&KeyPath::root()));
    }

    #[test]
    fn test_join_and_parent() {
        let base = snapshots();
        let joined = base.join("abc/title").unwrap();
        assert_eq!(joined.to_string(), "/snapshots/abc/title");
        assert_eq!(joined.parent().unwrap().last(), Some("abc"));
        assert_eq!(KeyPath::root().parent(), None);
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&lock("n1")).unwrap();
        assert_eq!(json, "\"/locks/n1\"");
        let back: KeyPath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, lock("n1"));
    }
}
