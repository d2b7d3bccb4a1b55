//! Server side of the protocol: record framing and the per-connection
//! request pipeline.
//!
//! After the handshake, a connection is served by [`serve_codec`]:
//!
//! 1. Requests are read strictly in arrival order
//! 2. Each request is dispatched on its own task through the
//!    [`ServiceRegistry`](crate::service::ServiceRegistry)
//! 3. Responses are written through one mutex shared by all dispatch tasks,
//!    so a header and its body are never interleaved with another response
//! 4. When the read side ends, in-flight requests finish and are answered
//!    before the codec is closed
//!
//! Responses may leave in a different order than requests arrived; the
//! sequence number in the header is what correlates them.

mod context;
mod pipeline;
pub mod wire;

pub use context::Context;
pub use pipeline::serve_codec;
pub use wire::{read_record, write_record};

/// Largest header or body record accepted from a peer (16 MiB).
pub const MAX_RECORD_LENGTH: usize = 16 * 1024 * 1024;
