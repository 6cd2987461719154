// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bridge wiring and lifecycle.
//!
//! [`Bridge::start`] checks the configuration, obtains one credential and
//! assembles the snapshot client, the subscription registry and both
//! namespaces into an [`AddressSpace`] ready to be served.

use crate::address_space::{
    AddressSpace, NamespaceError, NamespaceTable, PropertyNamespace, ThingNamespace,
    PROPERTIES_NAMESPACE_URI, THINGS_NAMESPACE_URI,
};
use crate::auth::{self, AuthError, SharedTokenProvider};
use crate::batch::BatchReader;
use crate::client::{ClientError, ThingClient, ThingSource};
use crate::config::{BridgeConfig, ConfigError};
use crate::stream::{StreamFactory, StreamSettings, StreamTransport, WebSocketTransport};
use crate::subscriptions::SubscriptionRegistry;
use reqwest::Url;
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::info;

/// Bridge startup errors.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("Namespace error: {0}")]
    Namespace(#[from] NamespaceError),

    #[error("No tokio runtime: {0}")]
    Runtime(String),
}

/// Running bridge.
pub struct Bridge {
    config: BridgeConfig,
    address_space: AddressSpace,
    registry: SubscriptionRegistry,
    things: Arc<ThingNamespace>,
    properties: Arc<PropertyNamespace>,
}

impl Bridge {
    /// Start a bridge talking to the configured API over WebSockets.
    pub async fn from_config(config: BridgeConfig) -> Result<Self, BridgeError> {
        config.validate()?;
        let http = http_client()?;
        let tokens = auth::from_config(config.auth.as_ref(), http.clone())?;
        Self::start_with_http(config, http, tokens, Arc::new(WebSocketTransport)).await
    }

    /// Start a bridge with explicit credentials and stream transport.
    ///
    /// Fails if the configuration is invalid or no credential can be
    /// obtained; every later upstream failure is reported per item.
    pub async fn start(
        config: BridgeConfig,
        tokens: SharedTokenProvider,
        transport: Arc<dyn StreamTransport>,
    ) -> Result<Self, BridgeError> {
        config.validate()?;
        Self::start_with_http(config, http_client()?, tokens, transport).await
    }

    async fn start_with_http(
        config: BridgeConfig,
        http: reqwest::Client,
        tokens: SharedTokenProvider,
        transport: Arc<dyn StreamTransport>,
    ) -> Result<Self, BridgeError> {
        let api = config.api_url()?;
        tokens.bearer_token().await?;

        let source = Arc::new(ThingClient::new(
            http,
            api.clone(),
            config.application.clone(),
            tokens.clone(),
        ));
        Self::assemble(config, api, source, tokens, transport)
    }

    /// Assemble a bridge over an arbitrary thing source.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_source(
        config: BridgeConfig,
        source: Arc<dyn ThingSource>,
        tokens: SharedTokenProvider,
        transport: Arc<dyn StreamTransport>,
    ) -> Result<Self, BridgeError> {
        config.validate()?;
        let api = config.api_url()?;
        Self::assemble(config, api, source, tokens, transport)
    }

    fn assemble(
        config: BridgeConfig,
        api: Url,
        source: Arc<dyn ThingSource>,
        tokens: SharedTokenProvider,
        transport: Arc<dyn StreamTransport>,
    ) -> Result<Self, BridgeError> {
        let runtime = Handle::try_current().map_err(|e| BridgeError::Runtime(e.to_string()))?;

        let settings = StreamSettings::new(api, config.application.clone())
            .with_reconnect_delay(config.stream.reconnect_delay())
            .with_token_check_interval(config.stream.token_check_interval());
        let registry =
            SubscriptionRegistry::new(StreamFactory::new(settings, tokens, transport, runtime));

        let mut namespaces = NamespaceTable::new();
        let things_ns = namespaces.register(THINGS_NAMESPACE_URI)?;
        let properties_ns = namespaces.register(PROPERTIES_NAMESPACE_URI)?;

        let reader = BatchReader::new(config.read_concurrency);
        let things = Arc::new(
            ThingNamespace::new(things_ns, properties_ns, config.root_thing.clone(), source.clone())
                .with_reader(reader),
        );
        let properties = Arc::new(
            PropertyNamespace::new(properties_ns, source, registry.clone()).with_reader(reader),
        );

        let mut address_space = AddressSpace::new(namespaces);
        address_space.register(things.clone());
        address_space.register(properties.clone());

        info!(
            "[{}] Bridge started for application '{}' (root thing '{}')",
            config.name, config.application, config.root_thing
        );

        Ok(Self {
            config,
            address_space,
            registry,
            things,
            properties,
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn address_space(&self) -> &AddressSpace {
        &self.address_space
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn thing_namespace(&self) -> &ThingNamespace {
        &self.things
    }

    pub fn property_namespace(&self) -> &PropertyNamespace {
        &self.properties
    }

    /// Detach all monitored items and close every change stream.
    pub fn shutdown(&self) {
        info!(
            "[{}] Shutting down ({} active streams)",
            self.config.name,
            self.registry.active_streams()
        );
        self.properties.clear();
        self.registry.close_all();
    }
}

fn http_client() -> Result<reqwest::Client, ClientError> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("twin-bridge/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}
