// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-memory collaborators for tests and offline demos.
//!
//! - [`MockThingSource`] -- thing documents served from a map
//! - [`MockStreamTransport`] -- change streams driven by the caller
//! - [`RecordingDataItem`] -- monitored item that records what it is told

use crate::address_space::{DataItem, DataValue, ReadValueId, StatusCode};
use crate::client::{ClientError, ThingSource};
use crate::model::Thing;
use crate::stream::{MessageStream, StreamError, StreamTransport};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Url;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

// ============================================================================
// Thing source
// ============================================================================

/// Thing source backed by a map.
#[derive(Default)]
pub struct MockThingSource {
    things: Mutex<HashMap<String, Thing>>,
    failure: Mutex<Option<String>>,
    requests: AtomicUsize,
}

impl MockThingSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a thing under its name.
    pub fn insert(&self, thing: Thing) {
        self.things.lock().insert(thing.name().to_string(), thing);
    }

    pub fn remove(&self, name: &str) -> Option<Thing> {
        self.things.lock().remove(name)
    }

    /// Fail every following request with a status error.
    pub fn fail_with(&self, body: impl Into<String>) {
        *self.failure.lock() = Some(body.into());
    }

    /// Stop failing requests.
    pub fn recover(&self) {
        *self.failure.lock() = None;
    }

    /// Number of requests served.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ThingSource for MockThingSource {
    async fn get_thing(&self, name: &str) -> Result<Option<Thing>, ClientError> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if let Some(body) = self.failure.lock().clone() {
            return Err(ClientError::Status { status: 503, body });
        }
        Ok(self.things.lock().get(name).cloned())
    }
}

// ============================================================================
// Stream transport
// ============================================================================

/// Transport whose connections are handed to the caller.
///
/// Each successful `open` yields a [`MockConnection`] on the paired
/// [`MockConnections`] receiver. Dropping the connection ends the stream.
pub struct MockStreamTransport {
    opened: mpsc::UnboundedSender<MockConnection>,
    /// Connections nobody is listening for stay open here.
    unclaimed: Mutex<Vec<MockConnection>>,
    fail_next: AtomicUsize,
    opens: AtomicUsize,
}

impl MockStreamTransport {
    pub fn new() -> (Arc<Self>, MockConnections) {
        let (opened, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            opened,
            unclaimed: Mutex::new(Vec::new()),
            fail_next: AtomicUsize::new(0),
            opens: AtomicUsize::new(0),
        });
        (transport, MockConnections { rx })
    }

    /// Make the next `count` opens fail.
    pub fn fail_next_opens(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Successful opens so far.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamTransport for MockStreamTransport {
    async fn open(&self, url: &Url) -> Result<Box<dyn MessageStream>, StreamError> {
        let failing = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StreamError::Connect(format!("refused: {}", url)));
        }

        self.opens.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let connection = MockConnection {
            url: url.clone(),
            tx,
            closed: closed.clone(),
        };
        if let Err(mpsc::error::SendError(connection)) = self.opened.send(connection) {
            self.unclaimed.lock().push(connection);
        }

        Ok(Box::new(MockMessageStream { rx, closed }))
    }
}

/// Receiver of connections opened by a [`MockStreamTransport`].
pub struct MockConnections {
    rx: mpsc::UnboundedReceiver<MockConnection>,
}

impl MockConnections {
    /// Wait for the next connection.
    pub async fn next(&mut self) -> Option<MockConnection> {
        self.rx.recv().await
    }

    /// Next connection if one was already opened.
    pub fn try_next(&mut self) -> Option<MockConnection> {
        self.rx.try_recv().ok()
    }
}

/// Server side of one mock stream.
pub struct MockConnection {
    url: Url,
    tx: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
}

impl MockConnection {
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Deliver a text message to the client.
    pub fn push(&self, text: impl Into<String>) {
        // The client may already be gone.
        let _ = self.tx.send(text.into());
    }

    /// Whether the client closed the stream.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct MockMessageStream {
    rx: mpsc::UnboundedReceiver<String>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl MessageStream for MockMessageStream {
    async fn next_message(&mut self) -> Option<Result<String, StreamError>> {
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        self.rx.close();
    }
}

// ============================================================================
// Data item
// ============================================================================

/// Monitored item recording every reported value.
pub struct RecordingDataItem {
    id: u32,
    target: ReadValueId,
    values: Mutex<Vec<DataValue>>,
    notify: Option<mpsc::UnboundedSender<DataValue>>,
}

impl RecordingDataItem {
    pub fn new(id: u32, target: ReadValueId) -> Arc<Self> {
        Arc::new(Self {
            id,
            target,
            values: Mutex::new(Vec::new()),
            notify: None,
        })
    }

    /// Item that also forwards every report to a channel.
    pub fn with_channel(
        id: u32,
        target: ReadValueId,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<DataValue>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let item = Arc::new(Self {
            id,
            target,
            values: Mutex::new(Vec::new()),
            notify: Some(tx),
        });
        (item, rx)
    }

    pub fn values(&self) -> Vec<DataValue> {
        self.values.lock().clone()
    }

    pub fn last_value(&self) -> Option<DataValue> {
        self.values.lock().last().cloned()
    }

    pub fn last_status(&self) -> Option<StatusCode> {
        self.values.lock().last().map(|v| v.status)
    }

    fn record(&self, value: DataValue) {
        self.values.lock().push(value.clone());
        if let Some(tx) = &self.notify {
            let _ = tx.send(value);
        }
    }
}

impl DataItem for RecordingDataItem {
    fn id(&self) -> u32 {
        self.id
    }

    fn read_value_id(&self) -> &ReadValueId {
        &self.target
    }

    fn set_value(&self, value: DataValue) {
        self.record(value);
    }

    fn set_quality(&self, status: StatusCode) {
        self.record(DataValue::from_status(status));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address_space::NodeId;

    #[tokio::test]
    async fn test_mock_thing_source() {
        let source = MockThingSource::new();
        source.insert(Thing::new("a"));
        assert!(source.get_thing("a").await.expect("get").is_some());
        assert!(source.get_thing("b").await.expect("get").is_none());

        source.fail_with("down");
        assert!(source.get_thing("a").await.is_err());
        source.recover();
        assert!(source.remove("a").is_some());
        assert!(source.get_thing("a").await.expect("get").is_none());
        assert_eq!(source.requests(), 4);
    }

    #[tokio::test]
    async fn test_mock_stream_round_trip() {
        let (transport, mut connections) = MockStreamTransport::new();
        let url = Url::parse("ws://twin.local/x").expect("url");

        transport.fail_next_opens(1);
        assert!(transport.open(&url).await.is_err());

        let mut stream = transport.open(&url).await.expect("open");
        let conn = connections.next().await.expect("connection");
        assert_eq!(conn.url(), &url);
        assert_eq!(transport.opens(), 1);

        conn.push("hello");
        assert_eq!(stream.next_message().await.map(|r| r.ok()), Some(Some("hello".into())));

        drop(conn);
        assert!(stream.next_message().await.is_none());
    }

    #[tokio::test]
    async fn test_mock_stream_close_ends_messages() {
        let (transport, mut connections) = MockStreamTransport::new();
        let url = Url::parse("ws://twin.local/x").expect("url");

        let mut stream = transport.open(&url).await.expect("open");
        let conn = connections.next().await.expect("connection");
        assert!(!conn.is_closed());

        stream.close().await;
        assert!(conn.is_closed());
        conn.push("late");
        assert!(stream.next_message().await.is_none());
    }

    #[test]
    fn test_recording_data_item() {
        let item = RecordingDataItem::new(7, ReadValueId::value(NodeId::string(1, "x")));
        item.set_quality(StatusCode::UNCERTAIN);
        item.set_value(DataValue::from_status(StatusCode::GOOD));
        assert_eq!(item.id(), 7);
        assert_eq!(item.values().len(), 2);
        assert_eq!(item.last_status(), Some(StatusCode::GOOD));
    }
}
