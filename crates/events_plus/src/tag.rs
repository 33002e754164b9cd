//! Tag keys used to match publishers with subscriber requests.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::fmt;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a hash of a tag string.
///
/// Pure function of the input bytes; equal strings always hash identically.
pub fn tag_hash(tag: &str) -> u32 {
    tag.bytes().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

/// A tag string together with its derived hash.
///
/// An empty tag is a legal placeholder ("no tag chosen yet"). Publishers with
/// an empty tag are never registered and so never matched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Tag {
    name: CompactString,
    hash: u32,
}

impl Tag {
    pub fn new(name: &str) -> Self {
        Self {
            name: CompactString::new(name),
            hash: tag_hash(name),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hash(&self) -> u32 {
        self.hash
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }
}

impl Default for Tag {
    fn default() -> Self {
        Self::new("")
    }
}

impl From<&str> for Tag {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Tag {
    fn from(name: String) -> Self {
        Self::new(&name)
    }
}

impl From<Tag> for String {
    fn from(tag: Tag) -> Self {
        tag.name.into()
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_matches_reference_fnv1a_values() {
        assert_eq!(tag_hash(""), 0x811c_9dc5);
        assert_eq!(tag_hash("a"), 0xe40c_292c);
        assert_eq!(tag_hash("foobar"), 0xbf9c_f968);
    }

    #[test]
    fn equal_strings_hash_identically() {
        let a = Tag::new("damage");
        let b = Tag::from("damage".to_string());
        assert_eq!(a, b);
        assert_eq!(a.hash(), b.hash());
        assert_ne!(a.hash(), Tag::new("Damage").hash());
    }

    #[test]
    fn tag_serializes_as_plain_string() {
        let json = serde_json::to_string(&Tag::new("heal")).unwrap();
        assert_eq!(json, "\"heal\"");
        let tag: Tag = serde_json::from_str(&json).unwrap();
        assert_eq!(tag.hash(), tag_hash("heal"));
    }
}
