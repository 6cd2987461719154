// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! JSON feature values to typed node values.
//!
//! | JSON      | Variant           |
//! |-----------|-------------------|
//! | `null`    | `Empty`           |
//! | number    | `Double`          |
//! | boolean   | `Boolean`         |
//! | string    | `String`          |
//! | array     | `Array` (recursive) |
//! | object    | `String` (serialized JSON) |
//!
//! Objects are flattened to their JSON text; nested structure is not mapped.

use crate::address_space::types::{DataValue, StatusCode, Variant};
use crate::model::Feature;
use serde_json::Value;

/// Convert a JSON value to a variant.
pub fn to_variant(value: &Value) -> Variant {
    match value {
        Value::Null => Variant::Empty,
        Value::Bool(b) => Variant::Boolean(*b),
        // u64/i64 beyond 2^53 lose precision
        Value::Number(n) => n
            .as_f64()
            .map(Variant::Double)
            .unwrap_or_else(|| Variant::String(n.to_string())),
        Value::String(s) => Variant::String(s.clone()),
        Value::Array(items) => Variant::Array(items.iter().map(to_variant).collect()),
        Value::Object(_) => Variant::String(value.to_string()),
    }
}

/// Convert an optional feature to a data value.
///
/// Present: good quality stamped with `lastUpdate`. Absent: uncertain, no value.
pub fn to_data_value(feature: Option<&Feature>) -> DataValue {
    match feature {
        Some(feature) => DataValue::with_timestamp(to_variant(&feature.value), feature.last_update),
        None => DataValue::from_status(StatusCode::UNCERTAIN),
    }
}
