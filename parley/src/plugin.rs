//! The plugin seam: lifecycle events and the handler trait.
//!
//! A plugin is any `Send + Sync` callable invoked with a lifecycle or
//! protocol event plus a context giving it access to its network and its
//! private settings bucket. Closures get a blanket implementation, so
//!
//! ```
//! # use parley::plugin::{Event, Plugin, PluginContext, PluginError};
//! let logger = |event: &Event, _ctx: &PluginContext| -> Result<(), PluginError> {
//!     if let Event::Receive(message) = event {
//!         println!("<- {message}");
//!     }
//!     Ok(())
//! };
//! # let _: &dyn Plugin = &logger;
//! ```
//!
//! is a complete plugin.

use std::sync::Arc;

use parley_core::message::Message;
use parley_core::settings::{MissingSettings, SettingValue, Settings};
use thiserror::Error;

use crate::network::{Network, PluginHandle};

/// Events delivered to plugins.
#[derive(Debug, Clone)]
pub enum Event {
    /// Fired synchronously while registering, before the plugin joins the
    /// active list. Failing here aborts the registration.
    Register,
    /// Fired while unregistering.
    Unregister,
    /// The network's connection was established.
    Connect,
    /// The network is about to close its connection.
    Disconnect,
    /// A complete inbound line, parsed.
    Receive(Message),
    /// An outbound line was fully flushed to the socket.
    Send(String),
}

/// Errors a plugin invocation can produce.
#[derive(Error, Debug)]
pub enum PluginError {
    /// Required settings were absent; registration rolls back on this.
    #[error(transparent)]
    MissingSettings(#[from] MissingSettings),

    /// Any other handler failure.
    #[error("plugin failed: {0}")]
    Failed(String),
}

impl PluginError {
    /// Convenience constructor for handler failures.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}

/// A registered event handler.
pub trait Plugin: Send + Sync {
    fn call(&self, event: &Event, ctx: &PluginContext) -> Result<(), PluginError>;
}

impl<F> Plugin for F
where
    F: Fn(&Event, &PluginContext) -> Result<(), PluginError> + Send + Sync,
{
    fn call(&self, event: &Event, ctx: &PluginContext) -> Result<(), PluginError> {
        self(event, ctx)
    }
}

/// Per-invocation context: the network and the registration's settings.
#[derive(Clone)]
pub struct PluginContext {
    network: Arc<Network>,
    handle: PluginHandle,
}

impl PluginContext {
    pub(crate) fn new(network: Arc<Network>, handle: PluginHandle) -> Self {
        Self { network, handle }
    }

    /// The network this invocation belongs to.
    #[must_use]
    pub fn network(&self) -> &Arc<Network> {
        &self.network
    }

    /// The opaque handle identifying this registration.
    #[must_use]
    pub const fn handle(&self) -> PluginHandle {
        self.handle
    }

    /// This registration's private settings bucket.
    #[must_use]
    pub fn settings(&self) -> Settings {
        self.network
            .plugin_settings(self.handle)
            .unwrap_or_default()
    }

    /// Guarantee settings are present.
    ///
    /// Typically called while handling [`Event::Register`]: the resulting
    /// [`MissingSettings`] aborts and rolls back the registration.
    ///
    /// # Errors
    ///
    /// [`PluginError::MissingSettings`] listing every absent key.
    pub fn required(&self, keys: &[&str]) -> Result<(), PluginError> {
        self.settings().require(keys)?;
        Ok(())
    }

    /// Set a default setting when the key is not already configured.
    pub fn default(&self, key: impl Into<String>, value: impl Into<SettingValue>) {
        self.settings().set_default(key, value);
    }

    /// Enqueue a raw outbound line.
    pub fn raw(&self, line: impl Into<String>) {
        self.network.send(line);
    }

    /// Reply to the channel or user a PRIVMSG came from.
    ///
    /// A no-op for any other message shape.
    pub fn reply(&self, message: &Message, response: &str) {
        if message.command() == "PRIVMSG" {
            if let Some(target) = message.param(0) {
                self.raw(parley_proto::commands::privmsg(target, response));
            }
        }
    }
}
