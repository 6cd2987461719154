// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Downstream address space.
//!
//! Things are projected as object nodes, their features as variable nodes.
//! Each lives in its own namespace, served by its own fragment:
//!
//! | Namespace URI | Fragment | Nodes |
//! |---------------|----------|-------|
//! | `…/doppelgänger/things` | [`ThingNamespace`] | thing objects |
//! | `…/doppelgänger/properties` | [`PropertyNamespace`] | feature variables |
//!
//! [`AddressSpace`] routes requests to the fragment whose filter accepts them
//! and keeps per-item results in request order.

pub mod fragment;
pub mod namespace;
pub mod property_namespace;
pub mod thing_namespace;
pub mod types;

pub use fragment::{AddressSpaceFragment, DataItem, SharedDataItem};
pub use namespace::{
    NamespaceError, NamespaceFilter, NamespaceTable, Operation, PROPERTIES_NAMESPACE_URI, THINGS_NAMESPACE_URI,
};
pub use property_namespace::{property_node_id, PropertyNamespace, PropertyNode};
pub use thing_namespace::{ThingNamespace, ThingNode};
pub use types::{
    ids, AttributeId, DataValue, Identifier, LocalizedText, NamespaceIndex, NodeClass, NodeId,
    NodeIdParseError, QualifiedName, ReadValueId, Reference, StatusCode, Variant, WriteValue,
};

use futures::future::join_all;
use std::sync::Arc;
use tracing::debug;

/// Registered fragments plus request routing.
#[derive(Default, Clone)]
pub struct AddressSpace {
    namespaces: NamespaceTable,
    fragments: Vec<Arc<dyn AddressSpaceFragment>>,
}

impl AddressSpace {
    pub fn new(namespaces: NamespaceTable) -> Self {
        Self {
            namespaces,
            fragments: Vec::new(),
        }
    }

    /// Register a fragment; earlier registrations win on overlapping filters.
    pub fn register(&mut self, fragment: Arc<dyn AddressSpaceFragment>) {
        debug!(
            "Registered address space fragment for namespace {}",
            fragment.filter().index()
        );
        self.fragments.push(fragment);
    }

    pub fn namespaces(&self) -> &NamespaceTable {
        &self.namespaces
    }

    fn owner(&self, operation: Operation, node_id: &NodeId) -> Option<usize> {
        self.fragments
            .iter()
            .position(|f| f.filter().matches(operation, node_id))
    }

    /// Read a batch across fragments; results keep request order.
    pub async fn read(&self, items: &[ReadValueId]) -> Vec<DataValue> {
        let mut results = vec![DataValue::from_status(StatusCode::BAD_NODE_ID_UNKNOWN); items.len()];

        let mut groups: Vec<(Vec<usize>, Vec<ReadValueId>)> =
            vec![(Vec::new(), Vec::new()); self.fragments.len()];
        for (i, item) in items.iter().enumerate() {
            if let Some(owner) = self.owner(Operation::Read, &item.node_id) {
                groups[owner].0.push(i);
                groups[owner].1.push(item.clone());
            }
        }

        let reads = groups
            .iter()
            .zip(&self.fragments)
            .filter(|((indices, _), _)| !indices.is_empty())
            .map(|((indices, batch), fragment)| async move {
                (indices, fragment.read(batch).await)
            });

        for (indices, values) in join_all(reads).await {
            for (&i, value) in indices.iter().zip(values) {
                results[i] = value;
            }
        }
        results
    }

    /// Write a batch; writes to unknown namespaces are rejected.
    pub fn write(&self, items: &[WriteValue]) -> Vec<StatusCode> {
        items
            .iter()
            .map(|item| match self.owner(Operation::Write, &item.node_id) {
                Some(owner) => self.fragments[owner]
                    .write(std::slice::from_ref(item))
                    .into_iter()
                    .next()
                    .unwrap_or(StatusCode::BAD),
                None => StatusCode::BAD_NODE_ID_UNKNOWN,
            })
            .collect()
    }

    /// Browse a node: the owner's references plus those every fragment adds.
    pub async fn browse(&self, node_id: &NodeId) -> Vec<Reference> {
        let mut refs = match self.owner(Operation::Browse, node_id) {
            Some(owner) => self.fragments[owner].browse(node_id).await,
            None => Vec::new(),
        };
        for reference in self.get_references(node_id) {
            if !refs.contains(&reference) {
                refs.push(reference);
            }
        }
        refs
    }

    /// References contributed to a node by all fragments.
    pub fn get_references(&self, node_id: &NodeId) -> Vec<Reference> {
        self.fragments
            .iter()
            .flat_map(|f| f.get_references(node_id))
            .collect()
    }

    /// Route newly created monitored items.
    pub fn create_data_items(&self, items: &[SharedDataItem]) {
        self.dispatch_items(items, |fragment, items| fragment.on_data_items_created(items));
    }

    pub fn modify_data_items(&self, items: &[SharedDataItem]) {
        self.dispatch_items(items, |fragment, items| fragment.on_data_items_modified(items));
    }

    pub fn delete_data_items(&self, items: &[SharedDataItem]) {
        self.dispatch_items(items, |fragment, items| fragment.on_data_items_deleted(items));
    }

    pub fn set_monitoring_mode(&self, items: &[SharedDataItem]) {
        self.dispatch_items(items, |fragment, items| {
            fragment.on_monitoring_mode_changed(items)
        });
    }

    fn dispatch_items<F>(&self, items: &[SharedDataItem], deliver: F)
    where
        F: Fn(&dyn AddressSpaceFragment, &[SharedDataItem]),
    {
        let mut groups: Vec<Vec<SharedDataItem>> = vec![Vec::new(); self.fragments.len()];
        for item in items {
            match self.owner(Operation::DataItems, &item.read_value_id().node_id) {
                Some(owner) => groups[owner].push(item.clone()),
                None => item.set_quality(StatusCode::BAD_NODE_ID_UNKNOWN),
            }
        }
        for (fragment, group) in self.fragments.iter().zip(groups) {
            if !group.is_empty() {
                deliver(fragment.as_ref(), &group);
            }
        }
    }
}
