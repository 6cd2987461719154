// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Seams between the protocol server and the bridge.
//!
//! The server owns sessions, subscriptions and framing. It hands requests to
//! the [`AddressSpaceFragment`]s whose filter accepts them, and exposes
//! monitored items to the fragments as [`DataItem`]s.

use super::namespace::NamespaceFilter;
use super::types::{DataValue, NodeId, ReadValueId, Reference, StatusCode, WriteValue};
use async_trait::async_trait;
use std::sync::Arc;

/// Downstream monitored item.
pub trait DataItem: Send + Sync {
    /// Server-assigned item id, unique among live items.
    fn id(&self) -> u32;

    /// Monitored node and attribute.
    fn read_value_id(&self) -> &ReadValueId;

    /// Report a new value.
    fn set_value(&self, value: DataValue);

    /// Report a status without a value.
    fn set_quality(&self, status: StatusCode);
}

/// Shared monitored item handle.
pub type SharedDataItem = Arc<dyn DataItem>;

/// Part of the address space served by one component.
#[async_trait]
pub trait AddressSpaceFragment: Send + Sync {
    /// Requests this fragment accepts.
    fn filter(&self) -> &NamespaceFilter;

    /// Read a batch; one result per item, in order.
    async fn read(&self, items: &[ReadValueId]) -> Vec<DataValue>;

    /// Write a batch; one status per item, in order. Read-only by default.
    fn write(&self, items: &[WriteValue]) -> Vec<StatusCode> {
        vec![StatusCode::BAD; items.len()]
    }

    /// References to follow when browsing `node_id`.
    async fn browse(&self, node_id: &NodeId) -> Vec<Reference>;

    /// References this fragment contributes to any node, including nodes
    /// owned by other fragments.
    fn get_references(&self, node_id: &NodeId) -> Vec<Reference>;

    fn on_data_items_created(&self, _items: &[SharedDataItem]) {}

    fn on_data_items_modified(&self, _items: &[SharedDataItem]) {}

    fn on_data_items_deleted(&self, _items: &[SharedDataItem]) {}

    fn on_monitoring_mode_changed(&self, _items: &[SharedDataItem]) {}
}
