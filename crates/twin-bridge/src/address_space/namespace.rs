// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Namespace table and per-fragment request filters.

use super::types::{NamespaceIndex, NodeId};
use thiserror::Error;

/// URI of namespace 0.
pub const STANDARD_NAMESPACE_URI: &str = "http://opcfoundation.org/UA/";

/// Namespace of thing (object) nodes.
pub const THINGS_NAMESPACE_URI: &str = "https://drogue.io/doppelgänger/things";

/// Namespace of property (variable) nodes.
pub const PROPERTIES_NAMESPACE_URI: &str = "https://drogue.io/doppelgänger/properties";

/// Namespace table errors.
#[derive(Debug, Error)]
pub enum NamespaceError {
    #[error("Namespace table full, cannot register '{0}'")]
    Full(String),
}

/// Ordered list of namespace URIs; the position is the namespace index.
///
/// Holds at most `NamespaceIndex::MAX + 1` entries.
#[derive(Debug, Clone)]
pub struct NamespaceTable {
    uris: Vec<String>,
}

impl Default for NamespaceTable {
    fn default() -> Self {
        Self::new()
    }
}

impl NamespaceTable {
    /// Table holding only the standard namespace.
    pub fn new() -> Self {
        Self {
            uris: vec![STANDARD_NAMESPACE_URI.to_string()],
        }
    }

    /// Register a URI, returning its index. Registering twice is a no-op.
    pub fn register(&mut self, uri: &str) -> Result<NamespaceIndex, NamespaceError> {
        if let Some(index) = self.index_of(uri) {
            return Ok(index);
        }
        let index = NamespaceIndex::try_from(self.uris.len())
            .map_err(|_| NamespaceError::Full(uri.to_string()))?;
        self.uris.push(uri.to_string());
        Ok(index)
    }

    pub fn index_of(&self, uri: &str) -> Option<NamespaceIndex> {
        self.uris
            .iter()
            .position(|u| u == uri)
            .and_then(|i| NamespaceIndex::try_from(i).ok())
    }

    pub fn uri(&self, index: NamespaceIndex) -> Option<&str> {
        self.uris.get(index as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.uris.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uris.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NamespaceIndex, &str)> {
        (0..=NamespaceIndex::MAX).zip(self.uris.iter().map(String::as_str))
    }
}

/// Request kinds a fragment can be asked to serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Browse,
    RegisterNodes,
    Read,
    Write,
    HistoryRead,
    HistoryUpdate,
    Call,
    AddNodes,
    DeleteNodes,
    AddReferences,
    DeleteReferences,
    DataItems,
    EventItems,
}

/// Accepts requests addressed to one namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespaceFilter {
    index: NamespaceIndex,
    enable_subscribe: bool,
}

impl NamespaceFilter {
    pub fn new(index: NamespaceIndex, enable_subscribe: bool) -> Self {
        Self {
            index,
            enable_subscribe,
        }
    }

    pub fn index(&self) -> NamespaceIndex {
        self.index
    }

    pub fn subscribe_enabled(&self) -> bool {
        self.enable_subscribe
    }

    /// Whether `operation` on `node_id` belongs to this namespace.
    pub fn matches(&self, operation: Operation, node_id: &NodeId) -> bool {
        let in_namespace = node_id.namespace == self.index;
        match operation {
            Operation::Browse | Operation::RegisterNodes | Operation::Read | Operation::Write => {
                in_namespace
            }
            Operation::DataItems | Operation::EventItems => self.enable_subscribe && in_namespace,
            Operation::HistoryRead
            | Operation::HistoryUpdate
            | Operation::Call
            | Operation::AddNodes
            | Operation::DeleteNodes
            | Operation::AddReferences
            | Operation::DeleteReferences => false,
        }
    }
}
