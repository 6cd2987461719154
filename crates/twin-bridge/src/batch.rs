// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Order-preserving batch reads.
//!
//! Every item of a read batch is resolved independently: a failing item turns
//! into a [`DataValue`] carrying a bad status, its siblings are unaffected and
//! the output always has the input's length and order.
//!
//! Up to `concurrency` items are in flight at once; with a concurrency of 1
//! items are resolved strictly one after another.

use crate::address_space::types::{DataValue, ReadValueId, StatusCode};
use crate::client::ClientError;
use futures::stream::{self, StreamExt};
use std::future::Future;
use thiserror::Error;
use tracing::debug;

/// Per-item read failure.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("Invalid node id")]
    InvalidNodeId,

    #[error("Unknown node")]
    UnknownNode,

    #[error("Attribute not supported")]
    AttributeInvalid,

    #[error("Not found")]
    NotFound,

    #[error("Snapshot read failed: {0}")]
    Client(#[from] ClientError),
}

impl ReadError {
    /// Status reported for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidNodeId => StatusCode::BAD_NODE_ID_INVALID,
            Self::UnknownNode => StatusCode::BAD_NODE_ID_UNKNOWN,
            Self::AttributeInvalid => StatusCode::BAD_ATTRIBUTE_ID_INVALID,
            Self::NotFound => StatusCode::BAD_NOT_FOUND,
            Self::Client(_) => StatusCode::BAD,
        }
    }
}

/// Batch read executor.
#[derive(Debug, Clone, Copy)]
pub struct BatchReader {
    concurrency: usize,
}

impl Default for BatchReader {
    fn default() -> Self {
        Self { concurrency: 8 }
    }
}

impl BatchReader {
    /// Create a reader; a concurrency of 0 is treated as 1.
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    /// Strictly sequential reader.
    pub fn sequential() -> Self {
        Self::new(1)
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Resolve every item with `resolve`, preserving input order.
    pub async fn read<'a, F, Fut>(&self, items: &'a [ReadValueId], resolve: F) -> Vec<DataValue>
    where
        F: Fn(&'a ReadValueId) -> Fut,
        Fut: Future<Output = Result<DataValue, ReadError>> + 'a,
    {
        debug!(
            "Reading {} item(s), concurrency {}",
            items.len(),
            self.concurrency
        );

        let reads: Vec<_> = items
            .iter()
            .map(|item| {
                let fut = resolve(item);
                async move {
                    match fut.await {
                        Ok(value) => value,
                        Err(e) => {
                            debug!("Read of {} failed: {}", item.node_id, e);
                            DataValue::from_status(e.status())
                        }
                    }
                }
            })
            .collect();

        let results: Vec<DataValue> = stream::iter(reads)
            .buffered(self.concurrency)
            .collect()
            .await;

        debug!("Read batch complete ({} result(s))", results.len());
        results
    }
}
