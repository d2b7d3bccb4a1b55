//! Protocol module implements everything that travels on the wire.
//!
//! - `handshake`: The options record that opens every connection and selects
//!   its codec.
//!
//! - `codec`: The [`Header`](codec::Header) envelope and the JSON and
//!   MessagePack encodings of headers and bodies.
//!
//! - `rpc`: Record framing and the server-side request pipeline.
//!
//! - `xdr`: External Data Representation (XDR) primitives, used for binary
//!   headers (RFC 1832).

pub mod codec;
pub mod handshake;
pub mod rpc;
pub mod xdr;
