//! # Ports Module
//!
//! Hexagonal architecture ports: the API offered to the embedding
//! application, and the channel and token storage it plugs in.

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
