// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end tests of the bridge over in-memory collaborators.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use twin_bridge::address_space::{
    ids, property_node_id, AttributeId, DataValue, NodeId, ReadValueId, SharedDataItem, Variant,
};
use twin_bridge::auth::{NoAuth, StaticTokenProvider};
use twin_bridge::mock::{MockConnections, MockStreamTransport, MockThingSource, RecordingDataItem};
use twin_bridge::model::{Feature, Thing, CHILDREN_FEATURE};
use twin_bridge::{Bridge, BridgeConfig, StatusCode};

fn config() -> BridgeConfig {
    BridgeConfig::new("https://twin.example.com").with_application("plant")
}

fn plant() -> MockThingSource {
    let source = MockThingSource::new();
    source.insert(
        Thing::new("/")
            .with_synthetic(CHILDREN_FEATURE, Feature::new(json!({ "pump": {} }), None))
            .with_reported("site", Feature::new(json!("north"), None)),
    );
    source.insert(
        Thing::new("pump")
            .with_reported("flow", Feature::new(json!(12.5), None))
            .with_reported("running", Feature::new(json!(true), None)),
    );
    source
}

fn bridge(source: MockThingSource) -> (Bridge, Arc<MockStreamTransport>, MockConnections) {
    let (transport, connections) = MockStreamTransport::new();
    let bridge = Bridge::with_source(
        config(),
        Arc::new(source),
        Arc::new(StaticTokenProvider::new("secret")),
        transport.clone(),
    )
    .expect("bridge");
    (bridge, transport, connections)
}

fn notification(kind: &str, flow: f64) -> String {
    json!({
        "type": kind,
        "thing": {
            "metadata": { "name": "pump" },
            "reportedState": { "flow": { "value": flow } }
        }
    })
    .to_string()
}

fn value(v: &DataValue) -> Option<Variant> {
    v.value.clone()
}

#[tokio::test]
async fn test_browse_from_objects_folder() {
    let (bridge, _, _connections) = bridge(plant());
    let space = bridge.address_space();
    let things = bridge.thing_namespace().namespace();
    let props = bridge.property_namespace().namespace();

    let refs = space.browse(&ids::OBJECTS_FOLDER).await;
    let root = NodeId::string(things, "/");
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].target, root);

    let targets: Vec<NodeId> = space
        .browse(&root)
        .await
        .into_iter()
        .filter(|r| r.reference_type == ids::ORGANIZES)
        .map(|r| r.target)
        .collect();
    assert_eq!(
        targets,
        vec![NodeId::string(things, "pump"), property_node_id(props, "/", "site")]
    );

    let pump: Vec<NodeId> = space
        .browse(&NodeId::string(things, "pump"))
        .await
        .into_iter()
        .filter(|r| r.reference_type == ids::ORGANIZES)
        .map(|r| r.target)
        .collect();
    assert_eq!(
        pump,
        vec![
            property_node_id(props, "pump", "flow"),
            property_node_id(props, "pump", "running"),
        ]
    );
}

#[tokio::test]
async fn test_batch_read_isolates_failures() {
    let (bridge, _, _connections) = bridge(plant());
    let things = bridge.thing_namespace().namespace();
    let props = bridge.property_namespace().namespace();

    let items = vec![
        ReadValueId::value(property_node_id(props, "pump", "flow")),
        ReadValueId::value(NodeId::string(props, "not-a-property")),
        ReadValueId::value(property_node_id(props, "pump", "missing")),
        ReadValueId::new(NodeId::string(things, "pump"), AttributeId::DisplayName),
        ReadValueId::value(property_node_id(props, "pump", "running")),
        ReadValueId::value(NodeId::string(99, "x")),
    ];
    let results = bridge.address_space().read(&items).await;

    assert_eq!(results.len(), items.len());
    assert_eq!(value(&results[0]), Some(Variant::Double(12.5)));
    assert_eq!(results[1].status, StatusCode::BAD_NODE_ID_INVALID);
    assert_eq!(results[2].status, StatusCode::BAD_NOT_FOUND);
    assert!(results[3].status.is_good());
    assert_eq!(value(&results[4]), Some(Variant::Boolean(true)));
    assert_eq!(results[5].status, StatusCode::BAD_NODE_ID_UNKNOWN);
}

#[tokio::test]
async fn test_sequential_batch_matches_parallel() {
    let (transport, _connections) = MockStreamTransport::new();
    let bridge = Bridge::with_source(
        config().with_read_concurrency(1),
        Arc::new(plant()),
        Arc::new(NoAuth),
        transport,
    )
    .expect("bridge");
    let props = bridge.property_namespace().namespace();

    let items = vec![
        ReadValueId::value(property_node_id(props, "pump", "running")),
        ReadValueId::value(property_node_id(props, "ghost", "flow")),
        ReadValueId::value(property_node_id(props, "pump", "flow")),
    ];
    let results = bridge.address_space().read(&items).await;
    assert_eq!(value(&results[0]), Some(Variant::Boolean(true)));
    assert_eq!(results[1].status, StatusCode::BAD_NOT_FOUND);
    assert_eq!(value(&results[2]), Some(Variant::Double(12.5)));
}

#[tokio::test(start_paused = true)]
async fn test_monitored_item_follows_stream_across_reconnect() {
    let (bridge, _, mut connections) = bridge(plant());
    let props = bridge.property_namespace().namespace();
    let (item, mut updates) =
        RecordingDataItem::with_channel(1, ReadValueId::value(property_node_id(props, "pump", "flow")));

    bridge
        .address_space()
        .create_data_items(&[item.clone() as SharedDataItem]);
    assert_eq!(
        updates.recv().await.map(|v| v.status),
        Some(StatusCode::UNCERTAIN)
    );

    let conn = connections.next().await.expect("connection");
    assert_eq!(
        conn.url().as_str(),
        "wss://twin.example.com/api/v1alpha1/things/plant/things/pump/notifications?token=secret"
    );
    conn.push(notification("initial", 1.0));
    assert_eq!(updates.recv().await.and_then(|v| v.value), Some(Variant::Double(1.0)));

    conn.push(notification("change", 2.0));
    assert_eq!(updates.recv().await.and_then(|v| v.value), Some(Variant::Double(2.0)));

    // Disconnect: unknown first, fresh state only after the reconnect.
    drop(conn);
    assert_eq!(
        updates.recv().await.map(|v| v.status),
        Some(StatusCode::UNCERTAIN)
    );

    let conn = connections.next().await.expect("reconnection");
    conn.push(notification("initial", 3.0));
    assert_eq!(updates.recv().await.and_then(|v| v.value), Some(Variant::Double(3.0)));

    bridge
        .address_space()
        .delete_data_items(&[item as SharedDataItem]);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(conn.is_closed());
    assert_eq!(bridge.registry().active_streams(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_one_stream_per_thing_is_shared() {
    let (bridge, transport, mut connections) = bridge(plant());
    let props = bridge.property_namespace().namespace();
    let flow = RecordingDataItem::new(1, ReadValueId::value(property_node_id(props, "pump", "flow")));
    let running =
        RecordingDataItem::new(2, ReadValueId::value(property_node_id(props, "pump", "running")));
    let site = RecordingDataItem::new(3, ReadValueId::value(property_node_id(props, "/", "site")));
    let space = bridge.address_space();

    space.create_data_items(&[flow.clone() as SharedDataItem, running.clone() as SharedDataItem]);
    let pump_conn = connections.next().await.expect("pump connection");
    assert_eq!(bridge.registry().active_streams(), 1);
    assert_eq!(bridge.registry().listener_count("pump"), 2);

    space.create_data_items(&[site.clone() as SharedDataItem]);
    let _root_conn = connections.next().await.expect("root connection");
    assert_eq!(bridge.registry().active_streams(), 2);
    assert_eq!(transport.opens(), 2);

    pump_conn.push(notification("initial", 7.0));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(flow.last_value().and_then(|v| v.value), Some(Variant::Double(7.0)));
    // The notification carries no "running" feature.
    assert_eq!(running.last_status(), Some(StatusCode::UNCERTAIN));

    // A late subscriber gets the cached state immediately.
    let late = RecordingDataItem::new(4, ReadValueId::value(property_node_id(props, "pump", "flow")));
    space.create_data_items(&[late.clone() as SharedDataItem]);
    assert_eq!(late.values().len(), 1);
    assert_eq!(late.last_value().and_then(|v| v.value), Some(Variant::Double(7.0)));
    assert_eq!(transport.opens(), 2);

    space.delete_data_items(&[flow as SharedDataItem, late as SharedDataItem]);
    assert_eq!(bridge.registry().listener_count("pump"), 1);
    assert_eq!(bridge.registry().active_streams(), 2);

    space.delete_data_items(&[running as SharedDataItem]);
    assert_eq!(bridge.registry().active_streams(), 1);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(pump_conn.is_closed());

    bridge.shutdown();
    assert_eq!(bridge.registry().active_streams(), 0);
    assert_eq!(bridge.property_namespace().monitored_items(), 0);
}

#[tokio::test]
async fn test_monitoring_thing_nodes_is_rejected() {
    let (bridge, _, _connections) = bridge(plant());
    let things = bridge.thing_namespace().namespace();
    let item = RecordingDataItem::new(1, ReadValueId::value(NodeId::string(things, "pump")));

    bridge
        .address_space()
        .create_data_items(&[item.clone() as SharedDataItem]);
    assert_eq!(item.last_status(), Some(StatusCode::BAD_NODE_ID_UNKNOWN));
    assert_eq!(bridge.registry().active_streams(), 0);
}

#[tokio::test]
async fn test_unavailable_service_reports_bad() {
    let source = plant();
    source.fail_with("maintenance");
    let (bridge, _, _connections) = bridge(source);
    let props = bridge.property_namespace().namespace();

    let results = bridge
        .address_space()
        .read(&[ReadValueId::value(property_node_id(props, "pump", "flow"))])
        .await;
    assert_eq!(results[0].status, StatusCode::BAD);

    let things = bridge.thing_namespace().namespace();
    let refs = bridge.address_space().browse(&NodeId::string(things, "/")).await;
    assert!(refs.iter().all(|r| r.reference_type != ids::ORGANIZES));
}
