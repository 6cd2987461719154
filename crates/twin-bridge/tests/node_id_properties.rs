// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Property-based tests for the property node identity codec.

use proptest::prelude::*;
use twin_bridge::address_space::NodeId;
use twin_bridge::node_id::{self, PropertyId, SEPARATOR};

fn component() -> impl Strategy<Value = String> {
    // Non-empty, mixing separators, escapes, slashes and non-ASCII.
    proptest::string::string_regex("[a-zA-Z0-9 #%/$äß€_.-]{1,24}").expect("regex")
}

proptest! {
    #[test]
    fn prop_round_trip(thing in component(), feature in component()) {
        let id = node_id::encode(&thing, &feature);
        prop_assert_eq!(node_id::decode(&id), Some(PropertyId::new(thing, feature)));
    }

    #[test]
    fn prop_single_separator(thing in component(), feature in component()) {
        let id = node_id::encode(&thing, &feature);
        prop_assert_eq!(id.matches(SEPARATOR).count(), 1);
    }

    #[test]
    fn prop_node_id_text_round_trip(
        ns in 1u16..100,
        thing in component(),
        feature in component(),
    ) {
        let node = NodeId::string(ns, node_id::encode(&thing, &feature));
        let parsed: NodeId = node.to_string().parse().expect("parse");
        prop_assert_eq!(node_id::decode_node_id(&parsed), Some(PropertyId::new(thing, feature)));
    }

    #[test]
    fn prop_decode_never_panics(text in ".{0,40}") {
        let _ = node_id::decode(&text);
    }
}
