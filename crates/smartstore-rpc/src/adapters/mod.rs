//! Adapters for the outbound ports.
//!
//! - `http`: JSON body over POST
//! - `callback`: JSONP-style GET whose body invokes a named handler
//! - `memory`: in-process token store
//! - `scripted`: programmable transport for tests and demos

pub mod callback;
pub mod http;
pub mod memory;
pub mod scripted;

pub use callback::{CallbackNamespace, CallbackTransport};
pub use http::HttpTransport;
pub use memory::MemoryTokenStore;
pub use scripted::{ScriptedTransport, Step};
