// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Thing (object) nodes.
//!
//! Every thing is an object node whose string identifier is the thing name.
//! The Objects folder organizes the configured root thing; browsing a thing
//! yields its `$children` as thing nodes and its non-reserved features as
//! property nodes.

use super::fragment::AddressSpaceFragment;
use super::namespace::NamespaceFilter;
use super::property_namespace::property_node_id;
use super::types::{
    ids, AttributeId, DataValue, LocalizedText, NamespaceIndex, NodeClass, NodeId,
    QualifiedName, ReadValueId, Reference, Variant,
};
use crate::batch::{BatchReader, ReadError};
use crate::client::ThingSource;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Object node of one thing.
#[derive(Debug, Clone)]
pub struct ThingNode {
    node_id: NodeId,
    name: String,
}

impl ThingNode {
    pub fn new(namespace: NamespaceIndex, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            node_id: NodeId::string(namespace, name.clone()),
            name,
        }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolve a metadata attribute; object nodes have no value.
    pub fn read_attribute(&self, attribute: AttributeId) -> Result<DataValue, ReadError> {
        let value = match attribute {
            AttributeId::NodeId => Variant::NodeId(self.node_id.clone()),
            AttributeId::NodeClass => Variant::NodeClass(NodeClass::Object),
            AttributeId::BrowseName => {
                Variant::QualifiedName(QualifiedName::new(self.node_id.namespace, &self.name))
            }
            AttributeId::DisplayName => Variant::LocalizedText(LocalizedText::english(&self.name)),
            AttributeId::Description => Variant::LocalizedText(LocalizedText::null()),
            AttributeId::EventNotifier => Variant::Byte(0),
            other => {
                info!("Unsupported attribute {:?} on thing '{}'", other, self.name);
                return Err(ReadError::AttributeInvalid);
            }
        };
        Ok(DataValue::new(value))
    }

    /// Static references of the node.
    pub fn references(&self) -> Vec<Reference> {
        vec![Reference::forward(
            self.node_id.clone(),
            ids::HAS_TYPE_DEFINITION,
            ids::FOLDER_TYPE,
        )]
    }
}

/// Fragment serving thing nodes.
pub struct ThingNamespace {
    filter: NamespaceFilter,
    property_namespace: NamespaceIndex,
    root_thing: String,
    source: Arc<dyn ThingSource>,
    reader: BatchReader,
}

impl ThingNamespace {
    pub fn new(
        namespace: NamespaceIndex,
        property_namespace: NamespaceIndex,
        root_thing: impl Into<String>,
        source: Arc<dyn ThingSource>,
    ) -> Self {
        Self {
            filter: NamespaceFilter::new(namespace, false),
            property_namespace,
            root_thing: root_thing.into(),
            source,
            reader: BatchReader::default(),
        }
    }

    /// Set the batch reader (builder pattern).
    pub fn with_reader(mut self, reader: BatchReader) -> Self {
        self.reader = reader;
        self
    }

    pub fn namespace(&self) -> NamespaceIndex {
        self.filter.index()
    }

    /// Node id of a thing.
    pub fn thing_node_id(&self, thing: &str) -> NodeId {
        NodeId::string(self.namespace(), thing)
    }

    fn node(&self, node_id: &NodeId) -> Option<ThingNode> {
        if node_id.namespace != self.namespace() {
            return None;
        }
        node_id.as_str().map(|name| ThingNode::new(self.namespace(), name))
    }

    async fn read_item(&self, item: &ReadValueId) -> Result<DataValue, ReadError> {
        let node = self.node(&item.node_id).ok_or(ReadError::UnknownNode)?;
        let attribute = AttributeId::from_u32(item.attribute_id).ok_or(ReadError::AttributeInvalid)?;
        node.read_attribute(attribute)
    }
}

#[async_trait]
impl AddressSpaceFragment for ThingNamespace {
    fn filter(&self) -> &NamespaceFilter {
        &self.filter
    }

    async fn read(&self, items: &[ReadValueId]) -> Vec<DataValue> {
        self.reader.read(items, |item| self.read_item(item)).await
    }

    async fn browse(&self, node_id: &NodeId) -> Vec<Reference> {
        let Some(node) = self.node(node_id) else {
            return Vec::new();
        };

        let thing = match self.source.get_thing(node.name()).await {
            Ok(Some(thing)) => thing,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!("Failed to browse thing '{}': {}", node.name(), e);
                return Vec::new();
            }
        };

        let children = thing.children().into_iter().map(|child| {
            Reference::forward(node_id.clone(), ids::ORGANIZES, self.thing_node_id(child))
        });
        let properties = thing.property_names().into_iter().map(|feature| {
            Reference::forward(
                node_id.clone(),
                ids::ORGANIZES,
                property_node_id(self.property_namespace, node.name(), feature),
            )
        });
        children.chain(properties).collect()
    }

    fn get_references(&self, node_id: &NodeId) -> Vec<Reference> {
        if *node_id == ids::OBJECTS_FOLDER {
            return vec![Reference::forward(
                ids::OBJECTS_FOLDER,
                ids::ORGANIZES,
                self.thing_node_id(&self.root_thing),
            )];
        }
        self.node(node_id)
            .map(|node| node.references())
            .unwrap_or_default()
    }
}
