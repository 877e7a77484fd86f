//! Multi-network client aggregate.
//!
//! Owns a list of networks and one event loop. Convenience layer only: each
//! network remains fully usable on its own.

use std::sync::Arc;

use parley_core::settings::Settings;

use crate::event_loop::{EventLoop, LoopOptions, StopHandle};
use crate::network::{Network, PluginHandle, Result};
use crate::plugin::Plugin;

/// A registration of one plugin across several networks.
pub type ClientRegistration = Vec<(Arc<Network>, PluginHandle)>;

/// A client driving any number of networks from one reactor.
pub struct Client {
    networks: Vec<Arc<Network>>,
    options: LoopOptions,
    stop: StopHandle,
}

impl Client {
    /// Create a client with no networks.
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(LoopOptions::default())
    }

    /// Create a client with explicit reactor options.
    #[must_use]
    pub fn with_options(options: LoopOptions) -> Self {
        Self {
            networks: Vec::new(),
            options,
            stop: StopHandle::new(),
        }
    }

    /// The registered networks.
    #[must_use]
    pub fn networks(&self) -> &[Arc<Network>] {
        &self.networks
    }

    /// Create a network and add it to the client.
    pub fn network(&mut self, endpoint: &str, settings: Settings) -> Result<Arc<Network>> {
        let network = Network::new(endpoint, settings)?;
        self.networks.push(Arc::clone(&network));
        Ok(network)
    }

    /// Add an existing network to the client.
    pub fn add_network(&mut self, network: Arc<Network>) {
        self.networks.push(network);
    }

    /// Remove a network from the client.
    pub fn remove_network(&mut self, network: &Arc<Network>) -> bool {
        let before = self.networks.len();
        self.networks.retain(|candidate| !Arc::ptr_eq(candidate, network));
        self.networks.len() != before
    }

    /// Register a plugin on every network, fail-fast.
    ///
    /// # Errors
    ///
    /// The first failing registration is returned; earlier successful
    /// registrations stay in place.
    pub fn register(
        &self,
        plugin: Arc<dyn Plugin>,
        settings: Settings,
    ) -> Result<ClientRegistration> {
        let mut handles = Vec::with_capacity(self.networks.len());
        for network in &self.networks {
            let bucket = Settings::new();
            bucket.merge(&settings);
            let handle = network.register(Arc::clone(&plugin), bucket)?;
            handles.push((Arc::clone(network), handle));
        }
        Ok(handles)
    }

    /// Unregister a previous [`Client::register`] everywhere it succeeded.
    pub fn unregister(&self, registration: ClientRegistration) -> Result<()> {
        for (network, handle) in registration {
            network.unregister(handle)?;
        }
        Ok(())
    }

    /// A stop switch usable from another thread while [`Client::start`]
    /// blocks.
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Run the event loop over all networks. Blocks until [`Client::stop`]
    /// or a [`StopHandle`] fires.
    ///
    /// # Errors
    ///
    /// Poller failures only; faulted networks are silently retried.
    pub fn start(&mut self) -> Result<()> {
        let mut event_loop =
            EventLoop::with_options(self.networks.clone(), self.options.clone())?;
        event_loop.use_stop_handle(&self.stop);
        event_loop.start()?;
        Ok(())
    }

    /// Ask a running [`Client::start`] to return.
    pub fn stop(&self) {
        self.stop.stop();
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}
