//! Application-side library for the Homa RPC transport.
//!
//! The transport engine (normally the Homa kernel module) does the delivery and
//! owns every RPC record. This crate binds requests to identifiers, threads
//! completion cookies through, matches replies to their requests and issues the
//! abort and peel-off control operations. The engine is reached only through
//! the [`transport::Engine`] trait.

mod abort;
mod config;
mod ctrl;
mod error;
mod id;
mod lifecycle;
mod msg;
mod socket;
pub mod transport;
pub mod type_alias;

#[cfg(test)]
mod tests;

pub use self::abort::{AbortPolicy, AbortTarget};
pub use self::config::HomaConfig;
pub use self::ctrl::{AbortArgs, ControlBlock};
pub use self::error::{Error, Result};
pub use self::id::RpcId;
pub use self::lifecycle::{Body, IncomingRequest, Inbound, RpcEvent, RpcState, Transition};
pub use self::msg::{Binding, Payload};
pub use self::socket::{Initiated, Socket};
pub use self::transport::{Ack, Engine};
