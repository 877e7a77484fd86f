//! # Parley
//!
//! A client engine for line-oriented, reply-correlated text protocols
//! (IRC-style): many concurrent connections multiplexed on one reactor,
//! reconnect with fixed-interval backoff, line-granular buffering, event
//! fan-out to pluggable handlers, and a synchronous request/reply layer on
//! top of the asynchronous stream.
//!
//! ## Architecture
//!
//! Parley is layered across three crates:
//!
//! - **`parley-core`**: connection, selectable queue, message shape,
//!   settings — no protocol knowledge
//! - **`parley-proto`**: the line dialect (parser, command builders,
//!   numeric constants)
//! - **`parley`**: networks, the reactor, plugins, queries (this crate)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use parley::prelude::*;
//! use parley_proto::commands;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let network = Network::new("irc://irc.example.net:6667", Settings::new())?;
//!
//! // A plugin is any callable taking an event and its context.
//! let ponger = |event: &Event, ctx: &PluginContext| -> Result<(), PluginError> {
//!     if let Event::Receive(message) = event {
//!         if message.command() == "PING" {
//!             ctx.raw(commands::pong(message.trailing().unwrap_or_default()));
//!         }
//!     }
//!     Ok(())
//! };
//! network.register(Arc::new(ponger), Settings::new())?;
//!
//! let mut event_loop = EventLoop::new(vec![network])?;
//! event_loop.start()?; // blocks until a StopHandle fires
//! # Ok(())
//! # }
//! ```
//!
//! ## Queries
//!
//! A [`query::Query`] correlates one request with its bounded reply
//! sequence:
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use parley::prelude::*;
//! # use parley_proto::{commands, constants};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let network = Network::new("irc://irc.example.net:6667", Settings::new())?;
//! let query = Arc::new(
//!     Query::new()
//!         .with_replies([constants::RPL_WHOISUSER, constants::RPL_WHOISCHANNELS])
//!         .with_ends([constants::RPL_ENDOFWHOIS])
//!         .with_errors([constants::ERR_NOSUCHNICK]),
//! );
//! let replies = network.run_query(query, commands::whois("someone"))?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod command;
pub mod dev_tracing;
pub mod dispatch;
pub mod event_loop;
pub mod network;
pub mod plugin;
pub mod query;

pub use parley_core as core;
pub use parley_proto as proto;

pub mod prelude {
    pub use crate::client::Client;
    pub use crate::command::{Command, CommandOutcome};
    pub use crate::event_loop::{EventLoop, LoopOptions, StopHandle};
    pub use crate::network::{
        DispatchMode, Network, NetworkError, NetworkOptions, PluginHandle,
    };
    pub use crate::plugin::{Event, Plugin, PluginContext, PluginError};
    pub use crate::query::{Query, QueryError};
    pub use parley_core::endpoint::Endpoint;
    pub use parley_core::message::{Message, MessageParser};
    pub use parley_core::settings::{SettingValue, Settings};
}
