// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Property node identity codec.
//!
//! A property node is addressed by the pair `(thing, feature)`, packed into a
//! single string identifier of the form `<thing>#<feature>`. Both components
//! are percent-escaped before joining, so the separator is always the *last*
//! raw `#` of the identifier and decoding never yields a partial result.
//!
//! # Usage
//!
//! ```
//! use twin_bridge::node_id::{self, PropertyId};
//!
//! let id = node_id::encode("pump/1", "flow#rate");
//! assert_eq!(
//!     node_id::decode(&id),
//!     Some(PropertyId::new("pump/1", "flow#rate"))
//! );
//! assert_eq!(node_id::decode("foo#"), None);
//! ```

use crate::address_space::types::NodeId;
use std::fmt;

/// Separator between thing and feature.
pub const SEPARATOR: char = '#';

/// Decoded property identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyId {
    /// Owning thing (entity id).
    pub thing: String,
    /// Feature name within the thing's merged state.
    pub feature: String,
}

impl PropertyId {
    pub fn new(thing: impl Into<String>, feature: impl Into<String>) -> Self {
        Self {
            thing: thing.into(),
            feature: feature.into(),
        }
    }

    /// Opaque identifier string for this property.
    pub fn encode(&self) -> String {
        encode(&self.thing, &self.feature)
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.thing, self.feature)
    }
}

/// Pack `(thing, feature)` into an identifier.
///
/// The thing only needs `%` and `#` escaped; the feature is fully
/// URL-encoded.
pub fn encode(thing: &str, feature: &str) -> String {
    let mut id = String::with_capacity(thing.len() + feature.len() + 1);
    for c in thing.chars() {
        match c {
            '%' => id.push_str("%25"),
            SEPARATOR => id.push_str("%23"),
            c => id.push(c),
        }
    }
    id.push(SEPARATOR);
    id.push_str(&urlencoding::encode(feature));
    id
}

/// Unpack an identifier, `None` if it does not have the expected shape.
pub fn decode(id: &str) -> Option<PropertyId> {
    let (thing, feature) = id.rsplit_once(SEPARATOR)?;
    if thing.is_empty() || feature.is_empty() {
        return None;
    }

    let thing = urlencoding::decode(thing).ok()?;
    let feature = urlencoding::decode(feature).ok()?;

    Some(PropertyId::new(thing.into_owned(), feature.into_owned()))
}

/// Decode the identifier of a node id; numeric ids are never property ids.
pub fn decode_node_id(node_id: &NodeId) -> Option<PropertyId> {
    node_id.as_str().and_then(decode)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid(id: &str, thing: &str, feature: &str) {
        assert_eq!(
            decode(id),
            Some(PropertyId::new(thing, feature)),
            "decoding {:?}",
            id
        );
    }

    #[test]
    fn test_decode_vectors() {
        valid("foo#bar", "foo", "bar");
        valid("foo##bar", "foo#", "bar");
        valid("#foo##bar", "#foo#", "bar");
        valid("#foo##%23bar", "#foo#", "#bar");
    }

    #[test]
    fn test_decode_invalid() {
        for id in ["", "foo", "#foo", "#", "foo#"] {
            assert_eq!(decode(id), None, "decoding {:?}", id);
        }
    }

    #[test]
    fn test_decode_bad_utf8_escape() {
        assert_eq!(decode("foo#%FF%FE"), None);
    }

    #[test]
    fn test_encode_simple() {
        assert_eq!(encode("foo", "bar"), "foo#bar");
        valid(&encode("foo", "bar"), "foo", "bar");
    }

    #[test]
    fn test_encode_escapes_separator_and_percent() {
        let id = encode("a#b%c", "x#y%z");
        assert_eq!(id, "a%23b%25c#x%23y%25z");
        valid(&id, "a#b%c", "x#y%z");
    }

    #[test]
    fn test_round_trip_unicode_and_spaces() {
        let id = encode("halle/süd", "temp °C");
        valid(&id, "halle/süd", "temp °C");
    }

    #[test]
    fn test_decode_node_id() {
        assert_eq!(
            decode_node_id(&NodeId::string(2, "foo#bar")),
            Some(PropertyId::new("foo", "bar"))
        );
        assert_eq!(decode_node_id(&NodeId::numeric(2, 7)), None);
    }
}
