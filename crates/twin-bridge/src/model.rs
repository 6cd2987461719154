// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Thing documents as delivered by the twin service.
//!
//! Things are always received whole (point read or change notification) and
//! never patched in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Reserved feature listing nested child things.
pub const CHILDREN_FEATURE: &str = "$children";

/// Prefix of features that are not exposed as properties.
pub const RESERVED_PREFIX: char = '$';

/// Feature map keyed by feature name.
pub type FeatureMap = BTreeMap<String, Feature>;

/// Thing metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<u64>,
}

/// Single feature value with its update time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
}

impl Feature {
    pub fn new(value: Value, last_update: Option<DateTime<Utc>>) -> Self {
        Self { value, last_update }
    }
}

/// Twin thing document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thing {
    metadata: Metadata,
    #[serde(default)]
    reported_state: FeatureMap,
    #[serde(default)]
    synthetic_state: FeatureMap,
}

impl Thing {
    /// Create an empty thing.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            metadata: Metadata {
                name: name.into(),
                application: None,
                generation: None,
            },
            reported_state: FeatureMap::new(),
            synthetic_state: FeatureMap::new(),
        }
    }

    /// Add a reported feature (builder pattern).
    pub fn with_reported(mut self, name: impl Into<String>, feature: Feature) -> Self {
        self.reported_state.insert(name.into(), feature);
        self
    }

    /// Add a synthetic feature (builder pattern).
    pub fn with_synthetic(mut self, name: impl Into<String>, feature: Feature) -> Self {
        self.synthetic_state.insert(name.into(), feature);
        self
    }

    /// Thing name (entity id).
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn reported_state(&self) -> &FeatureMap {
        &self.reported_state
    }

    pub fn synthetic_state(&self) -> &FeatureMap {
        &self.synthetic_state
    }

    /// Union of reported and synthetic state; synthetic wins on collision.
    pub fn merged_state(&self) -> BTreeMap<&str, &Feature> {
        let mut merged: BTreeMap<&str, &Feature> = self
            .reported_state
            .iter()
            .map(|(k, v)| (k.as_str(), v))
            .collect();
        for (k, v) in &self.synthetic_state {
            merged.insert(k.as_str(), v);
        }
        merged
    }

    /// Single feature of the merged state.
    pub fn merged_feature(&self, name: &str) -> Option<&Feature> {
        self.synthetic_state
            .get(name)
            .or_else(|| self.reported_state.get(name))
    }

    /// Names of nested child things declared in `$children`.
    ///
    /// Empty unless the feature holds a JSON object.
    pub fn children(&self) -> Vec<&str> {
        self.merged_feature(CHILDREN_FEATURE)
            .and_then(|f| f.value.as_object())
            .map(|obj| obj.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Merged feature names not starting with the reserved marker.
    pub fn property_names(&self) -> Vec<&str> {
        self.merged_state()
            .into_keys()
            .filter(|name| !name.starts_with(RESERVED_PREFIX))
            .collect()
    }
}
