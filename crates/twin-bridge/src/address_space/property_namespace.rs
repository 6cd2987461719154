// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Property (variable) nodes.
//!
//! One variable node per non-reserved feature of a thing, identified by
//! [`node_id::encode`](crate::node_id::encode). Reads of the `Value`
//! attribute go to the snapshot client; monitored items are fed from the
//! subscription registry.

use super::fragment::{AddressSpaceFragment, DataItem, SharedDataItem};
use super::namespace::NamespaceFilter;
use super::types::{
    ids, AttributeId, DataValue, LocalizedText, NamespaceIndex, NodeClass, NodeId,
    QualifiedName, ReadValueId, Reference, StatusCode, Variant,
};
use crate::batch::{BatchReader, ReadError};
use crate::client::ThingSource;
use crate::model::Thing;
use crate::node_id::{self, PropertyId};
use crate::subscriptions::{Subscription, SubscriptionRegistry};
use crate::values;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Node id of a thing feature.
pub fn property_node_id(namespace: NamespaceIndex, thing: &str, feature: &str) -> NodeId {
    NodeId::string(namespace, node_id::encode(thing, feature))
}

/// Variable node of one feature.
#[derive(Debug, Clone)]
pub struct PropertyNode {
    node_id: NodeId,
    property: PropertyId,
}

impl PropertyNode {
    pub fn new(namespace: NamespaceIndex, property: PropertyId) -> Self {
        Self {
            node_id: property_node_id(namespace, &property.thing, &property.feature),
            property,
        }
    }

    /// Node for a node id, `None` if the id is not a property id.
    pub fn from_node_id(node_id: &NodeId) -> Option<Self> {
        let property = node_id::decode_node_id(node_id)?;
        Some(Self {
            node_id: node_id.clone(),
            property,
        })
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn property(&self) -> &PropertyId {
        &self.property
    }

    /// Resolve an attribute; `Value` needs a point read of the owning thing.
    pub async fn read_attribute(
        &self,
        attribute: AttributeId,
        source: &dyn ThingSource,
    ) -> Result<DataValue, ReadError> {
        let feature = &self.property.feature;
        let value = match attribute {
            AttributeId::NodeId => Variant::NodeId(self.node_id.clone()),
            AttributeId::NodeClass => Variant::NodeClass(NodeClass::Variable),
            AttributeId::BrowseName => {
                Variant::QualifiedName(QualifiedName::new(self.node_id.namespace, feature))
            }
            AttributeId::DisplayName => Variant::LocalizedText(LocalizedText::english(feature)),
            AttributeId::Description => Variant::LocalizedText(LocalizedText::null()),
            AttributeId::ValueRank => Variant::Int32(-1),
            AttributeId::DataType => Variant::NodeId(ids::BASE_DATA_TYPE),
            AttributeId::AccessLevel | AttributeId::UserAccessLevel => Variant::Byte(1),
            AttributeId::EventNotifier => Variant::Byte(0),
            AttributeId::MinimumSamplingInterval => Variant::Double(0.0),
            AttributeId::ArrayDimensions => Variant::Empty,
            AttributeId::Historizing => Variant::Boolean(false),
            AttributeId::Value => return self.read_value(source).await,
            other => {
                info!("Unsupported attribute {:?} on property {}", other, self.property);
                return Err(ReadError::AttributeInvalid);
            }
        };
        Ok(DataValue::new(value))
    }

    async fn read_value(&self, source: &dyn ThingSource) -> Result<DataValue, ReadError> {
        let thing = source
            .get_thing(&self.property.thing)
            .await?
            .ok_or(ReadError::NotFound)?;
        let feature = thing
            .merged_feature(&self.property.feature)
            .ok_or(ReadError::NotFound)?;
        Ok(values::to_data_value(Some(feature)))
    }

    /// Static references of the node.
    pub fn references(&self) -> Vec<Reference> {
        vec![Reference::forward(
            self.node_id.clone(),
            ids::HAS_TYPE_DEFINITION,
            ids::BASE_DATA_VARIABLE_TYPE,
        )]
    }
}

/// Value reported to a monitored item for a thing state.
///
/// Unknown thing or missing feature yields uncertain quality.
pub fn report_value(item: &dyn DataItem, state: Option<&Thing>, feature: &str) {
    match state.and_then(|thing| thing.merged_feature(feature)) {
        Some(feature) => item.set_value(values::to_data_value(Some(feature))),
        None => item.set_quality(StatusCode::UNCERTAIN),
    }
}

/// Fragment serving property nodes.
pub struct PropertyNamespace {
    filter: NamespaceFilter,
    source: Arc<dyn ThingSource>,
    registry: SubscriptionRegistry,
    reader: BatchReader,
    items: DashMap<u32, Subscription>,
}

impl PropertyNamespace {
    pub fn new(
        namespace: NamespaceIndex,
        source: Arc<dyn ThingSource>,
        registry: SubscriptionRegistry,
    ) -> Self {
        Self {
            filter: NamespaceFilter::new(namespace, true),
            source,
            registry,
            reader: BatchReader::default(),
            items: DashMap::new(),
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

    /// Number of monitored items with a live subscription.
    pub fn monitored_items(&self) -> usize {
        self.items.len()
    }

    /// Detach every monitored item.
    pub fn clear(&self) {
        self.items.clear();
    }

    async fn read_item(&self, item: &ReadValueId) -> Result<DataValue, ReadError> {
        let node = PropertyNode::from_node_id(&item.node_id).ok_or(ReadError::InvalidNodeId)?;
        let attribute =
            AttributeId::from_u32(item.attribute_id).ok_or(ReadError::AttributeInvalid)?;
        node.read_attribute(attribute, self.source.as_ref()).await
    }

    fn subscribe(&self, item: &SharedDataItem) {
        let target = item.read_value_id();
        let Some(property) = node_id::decode_node_id(&target.node_id) else {
            debug!("Monitored item {} has invalid node id {}", item.id(), target.node_id);
            item.set_quality(StatusCode::BAD_NODE_ID_INVALID);
            return;
        };
        if target.attribute_id != AttributeId::Value.id() {
            item.set_quality(StatusCode::BAD_ATTRIBUTE_ID_INVALID);
            return;
        }

        let listener_item = item.clone();
        let feature = property.feature.clone();
        let subscription = self.registry.attach(
            &property.thing,
            Arc::new(move |state: Option<Arc<Thing>>| {
                report_value(listener_item.as_ref(), state.as_deref(), &feature);
            }),
        );

        // Re-creating an item id replaces the previous subscription.
        if let Some(previous) = self.items.insert(item.id(), subscription) {
            previous.detach();
        }
    }
}

#[async_trait]
impl AddressSpaceFragment for PropertyNamespace {
    fn filter(&self) -> &NamespaceFilter {
        &self.filter
    }

    async fn read(&self, items: &[ReadValueId]) -> Vec<DataValue> {
        self.reader.read(items, |item| self.read_item(item)).await
    }

    async fn browse(&self, _node_id: &NodeId) -> Vec<Reference> {
        Vec::new()
    }

    fn get_references(&self, node_id: &NodeId) -> Vec<Reference> {
        if node_id.namespace != self.namespace() {
            return Vec::new();
        }
        PropertyNode::from_node_id(node_id)
            .map(|node| node.references())
            .unwrap_or_default()
    }

    fn on_data_items_created(&self, items: &[SharedDataItem]) {
        for item in items {
            self.subscribe(item);
        }
    }

    fn on_data_items_deleted(&self, items: &[SharedDataItem]) {
        for item in items {
            if let Some((_, subscription)) = self.items.remove(&item.id()) {
                subscription.detach();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address_space::types::WriteValue;
    use crate::auth::NoAuth;
    use crate::mock::{MockStreamTransport, MockThingSource, RecordingDataItem};
    use crate::model::Feature;
    use crate::stream::{StreamFactory, StreamSettings};
    use chrono::{TimeZone, Utc};
    use reqwest::Url;
    use serde_json::json;
    use tokio::runtime::Handle;

    const PROPS: NamespaceIndex = 2;

    fn registry() -> SubscriptionRegistry {
        let (transport, _connections) = MockStreamTransport::new();
        let settings = StreamSettings::new(Url::parse("http://twin.local").expect("url"), "app");
        SubscriptionRegistry::new(StreamFactory::new(
            settings,
            Arc::new(NoAuth),
            transport,
            Handle::current(),
        ))
    }

    fn source() -> MockThingSource {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().expect("timestamp");
        let source = MockThingSource::new();
        source.insert(
            Thing::new("pump")
                .with_reported("flow", Feature::new(json!(12.5), Some(ts)))
                .with_reported("mode", Feature::new(json!("auto"), Some(ts)))
                .with_synthetic("mode", Feature::new(json!("manual"), Some(ts))),
        );
        source
    }

    fn value_of(thing: &str, feature: &str) -> ReadValueId {
        ReadValueId::value(property_node_id(PROPS, thing, feature))
    }

    #[tokio::test]
    async fn test_read_values_and_isolation() {
        let ns = PropertyNamespace::new(PROPS, Arc::new(source()), registry());
        let items = vec![
            value_of("pump", "flow"),
            ReadValueId::value(NodeId::string(PROPS, "no-separator")),
            value_of("pump", "mode"),
            value_of("pump", "missing"),
            value_of("ghost", "flow"),
            ReadValueId::value(NodeId::numeric(PROPS, 5)),
        ];

        let results = ns.read(&items).await;
        assert_eq!(results.len(), 6);
        assert_eq!(results[0].value, Some(Variant::Double(12.5)));
        assert_eq!(results[0].status, StatusCode::GOOD);
        assert!(results[0].source_timestamp.is_some());
        assert_eq!(results[1].status, StatusCode::BAD_NODE_ID_INVALID);
        assert_eq!(results[2].value, Some(Variant::String("manual".into())));
        assert_eq!(results[3].status, StatusCode::BAD_NOT_FOUND);
        assert_eq!(results[4].status, StatusCode::BAD_NOT_FOUND);
        assert_eq!(results[5].status, StatusCode::BAD_NODE_ID_INVALID);
    }

    #[tokio::test]
    async fn test_read_source_error_is_bad() {
        let source = source();
        source.fail_with("unavailable");
        let ns = PropertyNamespace::new(PROPS, Arc::new(source), registry());
        let results = ns.read(&[value_of("pump", "flow")]).await;
        assert_eq!(results[0].status, StatusCode::BAD);
    }

    #[tokio::test]
    async fn test_read_metadata_attributes() {
        let ns = PropertyNamespace::new(PROPS, Arc::new(MockThingSource::new()), registry());
        let node = property_node_id(PROPS, "pump", "flow");
        let read = |attribute| ReadValueId::new(node.clone(), attribute);
        let items = vec![
            read(AttributeId::NodeClass),
            read(AttributeId::BrowseName),
            read(AttributeId::ValueRank),
            read(AttributeId::DataType),
            read(AttributeId::AccessLevel),
            read(AttributeId::Historizing),
            read(AttributeId::Executable),
        ];

        let results = ns.read(&items).await;
        assert_eq!(results[0].value, Some(Variant::NodeClass(NodeClass::Variable)));
        assert_eq!(
            results[1].value,
            Some(Variant::QualifiedName(QualifiedName::new(PROPS, "flow")))
        );
        assert_eq!(results[2].value, Some(Variant::Int32(-1)));
        assert_eq!(results[3].value, Some(Variant::NodeId(ids::BASE_DATA_TYPE)));
        assert_eq!(results[4].value, Some(Variant::Byte(1)));
        assert_eq!(results[5].value, Some(Variant::Boolean(false)));
        assert_eq!(results[6].status, StatusCode::BAD_ATTRIBUTE_ID_INVALID);
    }

    #[tokio::test]
    async fn test_references_and_browse() {
        let ns = PropertyNamespace::new(PROPS, Arc::new(MockThingSource::new()), registry());
        let node = property_node_id(PROPS, "pump", "flow");

        let refs = ns.get_references(&node);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].reference_type, ids::HAS_TYPE_DEFINITION);
        assert_eq!(refs[0].target, ids::BASE_DATA_VARIABLE_TYPE);
        assert!(ns.browse(&node).await.is_empty());
        assert!(ns.get_references(&NodeId::string(PROPS, "bad")).is_empty());
    }

    #[tokio::test]
    async fn test_write_rejected() {
        let ns = PropertyNamespace::new(PROPS, Arc::new(source()), registry());
        let statuses = ns.write(&[WriteValue {
            node_id: property_node_id(PROPS, "pump", "flow"),
            attribute_id: AttributeId::Value.id(),
            value: DataValue::new(Variant::Double(1.0)),
        }]);
        assert_eq!(statuses, vec![StatusCode::BAD]);
    }

    #[tokio::test]
    async fn test_monitored_items_lifecycle() {
        let registry = registry();
        let ns = PropertyNamespace::new(PROPS, Arc::new(source()), registry.clone());

        let good = RecordingDataItem::new(1, value_of("pump", "flow"));
        let invalid = RecordingDataItem::new(2, ReadValueId::value(NodeId::string(PROPS, "x#")));
        let items: Vec<SharedDataItem> = vec![good.clone(), invalid.clone()];
        ns.on_data_items_created(&items);

        // Unknown state until the stream delivers.
        assert_eq!(good.last_status(), Some(StatusCode::UNCERTAIN));
        assert_eq!(invalid.last_status(), Some(StatusCode::BAD_NODE_ID_INVALID));
        assert_eq!(ns.monitored_items(), 1);
        assert_eq!(registry.active_streams(), 1);

        // Same id again replaces the subscription.
        ns.on_data_items_created(&[good.clone() as SharedDataItem]);
        assert_eq!(ns.monitored_items(), 1);
        assert_eq!(registry.listener_count("pump"), 1);

        ns.on_data_items_deleted(&items);
        assert_eq!(ns.monitored_items(), 0);
        assert_eq!(registry.active_streams(), 0);
    }

    #[test]
    fn test_report_value() {
        let item = RecordingDataItem::new(1, value_of("pump", "flow"));
        let thing = Thing::new("pump").with_reported("flow", Feature::new(json!(true), None));

        report_value(item.as_ref(), Some(&thing), "flow");
        assert_eq!(
            item.last_value().and_then(|v| v.value),
            Some(Variant::Boolean(true))
        );

        report_value(item.as_ref(), Some(&thing), "missing");
        assert_eq!(item.last_status(), Some(StatusCode::UNCERTAIN));

        report_value(item.as_ref(), None, "flow");
        assert_eq!(item.last_status(), Some(StatusCode::UNCERTAIN));
    }
}
