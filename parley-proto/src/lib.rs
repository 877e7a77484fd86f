//! Parley Proto
//!
//! The protocol collaborator consumed by the Parley engine:
//! - Line parser producing the engine's `Message` shape (`parser`)
//! - Command builders turning structured requests into wire lines
//!   (`commands`)
//! - Numeric reply constants (`constants`)
//!
//! The engine itself is dialect-agnostic; swapping this crate out for a
//! different line dialect only requires another `MessageParser`
//! implementation.

pub mod commands;
pub mod constants;
pub mod parser;

pub use parser::Rfc2812Parser;
