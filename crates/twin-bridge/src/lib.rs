// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Twin Bridge
//!
//! Exposes the live state of digital twin things as a browsable node
//! address space.
//!
//! # Features
//!
//! - **Thing Nodes**: Every thing is an object node; `$children` form the tree
//! - **Property Nodes**: Every feature is a variable node, synthetic state wins
//! - **Live Updates**: One shared change stream per subscribed thing
//! - **Batch Reads**: Bounded concurrency, per-item status, request order kept
//!
//! # Quick Start
//!
//! ```bash
//! # Browse the root thing
//! twin-bridge --api https://twin.example.com browse "ns=1;s=/"
//!
//! # Read a feature
//! twin-bridge --api https://twin.example.com read "ns=2;s=/#temperature"
//!
//! # Using config file
//! twin-bridge --config bridge.toml watch "ns=2;s=pump#flow"
//! ```
//!
//! # Configuration File
//!
//! ```toml
//! name = "plant-bridge"
//! api = "https://twin.example.com"
//! application = "plant"
//! root_thing = "/"
//! read_concurrency = 8
//!
//! [stream]
//! reconnect_delay_secs = 5
//! token_check_interval_secs = 5
//!
//! [auth]
//! token_url = "https://sso.example.com/realms/twin/protocol/openid-connect/token"
//! client_id = "twin-bridge"
//! client_secret = "change-me"
//! ```

pub mod address_space;
pub mod auth;
pub mod batch;
pub mod bridge;
pub mod client;
pub mod config;
pub mod mock;
pub mod model;
pub mod node_id;
pub mod stream;
pub mod subscriptions;
pub mod values;

pub use address_space::{AddressSpace, AddressSpaceFragment, DataItem, NodeId, StatusCode};
pub use auth::{AuthError, BearerToken, TokenProvider};
pub use batch::{BatchReader, ReadError};
pub use bridge::{Bridge, BridgeError};
pub use client::{ClientError, ThingClient, ThingSource};
pub use config::{AuthConfig, BridgeConfig, ConfigError, StreamConfig};
pub use model::{Feature, Metadata, Thing};
pub use node_id::PropertyId;
pub use stream::{ChangeStreamClient, StreamError, StreamFactory, StreamTransport};
pub use subscriptions::{StateListener, Subscription, SubscriptionRegistry};
