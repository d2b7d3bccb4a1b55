//! Per-connection state handed to every dispatch task.

use std::fmt;
use std::sync::Arc;

use crate::protocol::codec::CodecType;
use crate::service::ServiceRegistry;

/// Execution context of the requests read from one connection.
///
/// Cloned into each dispatch task; all clones share the same registry.
#[derive(Clone)]
pub struct Context {
    /// Peer address used in log messages.
    pub client_addr: String,

    /// Codec negotiated by the handshake, used to decode arguments and
    /// encode replies.
    pub codec_type: CodecType,

    /// Resolves `"<Service>.<Method>"` names.
    pub registry: Arc<dyn ServiceRegistry>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("rpc::Context")
            .field("client_addr", &self.client_addr)
            .field("codec_type", &self.codec_type)
            .finish()
    }
}
