//! Transport registry
//!
//! Maps a [`TransportSelector`] to the factory that allocates native clients
//! for it. Only the loopback `DUMMY` transport ships with this crate; TCP, TLS
//! and custom transports are registered by the embedder.

use crate::client::NativeClient;
use crate::codes::ResultCode;
use crate::config::{ClientConfig, LibOptions, TransportSelector};
use crate::dummy::DummyHub;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use tracing::debug;

/// Allocates a native client for a validated configuration.
pub type TransportFactory =
    Rc<dyn Fn(&ClientConfig, &LibOptions) -> Result<Box<dyn NativeClient>, ResultCode>>;

#[derive(Clone, Default)]
pub struct TransportRegistry {
    factories: HashMap<TransportSelector, TransportFactory>,
}

impl fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut selectors: Vec<_> = self.factories.keys().map(|s| s.id()).collect();
        selectors.sort_unstable();
        f.debug_struct("TransportRegistry")
            .field("transports", &selectors)
            .finish()
    }
}

impl TransportRegistry {
    /// Registry without any transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the loopback transport under `DUMMY`.
    pub fn with_dummy(hub: DummyHub) -> Self {
        let mut registry = Self::new();
        registry.register(TransportSelector::Dummy, hub.factory());
        registry
    }

    /// Register a factory, replacing any previous one for `selector`.
    pub fn register(&mut self, selector: TransportSelector, factory: TransportFactory) {
        debug!(transport = %selector, "registered transport");
        self.factories.insert(selector, factory);
    }

    pub fn contains(&self, selector: TransportSelector) -> bool {
        self.factories.contains_key(&selector)
    }

    /// Allocate a native client for `config`; `NO_TRANS` when its transport
    /// is not registered.
    pub fn create(
        &self,
        config: &ClientConfig,
        options: &LibOptions,
    ) -> Result<Box<dyn NativeClient>, ResultCode> {
        let factory = self
            .factories
            .get(&config.transport_name)
            .ok_or(ResultCode::NoTrans)?;
        factory(config, options)
    }
}
