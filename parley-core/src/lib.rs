//! Parley Core
//!
//! This crate contains the runtime plumbing of the Parley client engine:
//! - Non-blocking line-buffered connection (`connection`)
//! - Thread-safe selectable outbound queue (`queue`)
//! - Message shape and parser seam (`message`)
//! - Shared settings storage (`settings`)
//! - Endpoint addressing (`endpoint`)
//! - Error types (`error`)

// The tcp module needs raw fd access for socket configuration
#![cfg_attr(not(test), deny(unsafe_code))]
#![allow(clippy::module_name_repetitions)]

pub mod connection;
pub mod endpoint;
pub mod error;
pub mod message;
pub mod queue;
pub mod settings;
pub mod tcp;

// A small prelude to make downstream crates ergonomic.
// Keep it minimal to avoid API lock-in.
pub mod prelude {
    pub use crate::connection::{ConnectProgress, Connection};
    pub use crate::endpoint::Endpoint;
    pub use crate::error::ConnectionError;
    pub use crate::message::{Message, MessageParser};
    pub use crate::queue::SelectableQueue;
    pub use crate::settings::{MissingSettings, SettingValue, Settings};
}
