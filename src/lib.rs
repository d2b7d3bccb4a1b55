//! seqrpc - multiplexed request/response RPC over a single stream
//!
//! A client sends any number of concurrent calls over one connection; each
//! request carries a sequence number and the server may answer them in any
//! order. Services are registered by name on the server and their methods are
//! invoked as `"<Service>.<Method>"`.
//!
//! ## Main Components
//!
//! - `client`: The [`Client`], which multiplexes calls over one connection and
//!   demultiplexes responses by sequence number.
//!
//! - `server`: The [`Server`], which performs the handshake on each accepted
//!   connection and dispatches every request on its own task.
//!
//! - `service`: The [`ServiceRegistry`] seam between the server and user code,
//!   and [`Services`], a registry of named services with typed async handlers.
//!
//! - `protocol`: Wire-level pieces: the connection handshake, record framing,
//!   and the JSON and MessagePack codecs.
//!
//! - `tcp`: TCP listener exposing a registry over the network.
//!
//! ## Usage
//!
//! Register a [`Service`] in [`Services`], bind an [`RpcTcpListener`] and call
//! [`RpcTcp::handle_forever`]. On the other side, [`Client::dial`] the address
//! and use [`Client::call`] or [`Client::go`].

pub mod client;
pub mod error;
pub mod protocol;
pub mod server;
pub mod service;
pub mod tcp;

pub use client::{AsyncCall, Call, Client};
pub use error::{CodecError, DispatchError, RegisterError, RpcError};
pub use protocol::codec::{CodecType, Header};
pub use protocol::handshake::{Options, MAGIC_NUMBER};
pub use server::Server;
pub use service::{Invoker, Service, ServiceRegistry, Services};
pub use tcp::{RpcTcp, RpcTcpListener};
