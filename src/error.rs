//! Error types shared by the client, the server pipeline and the codecs.

use std::io;

use thiserror::Error;

/// Failure reading or writing one header/body frame.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The peer closed the stream, cleanly or in the middle of a record.
    #[error("connection closed")]
    ConnectionClosed,

    /// I/O error on the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A record marker announced more data than the reader accepts.
    #[error("record length {0} exceeds max {1}")]
    RecordTooLarge(usize, usize),

    #[error("JSON encode error: {0}")]
    JsonEncode(serde_json::Error),

    #[error("JSON decode error: {0}")]
    JsonDecode(serde_json::Error),

    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    #[error("XDR encode error: {0}")]
    XdrEncode(io::Error),

    #[error("XDR decode error: {0}")]
    XdrDecode(io::Error),
}

impl CodecError {
    /// True when a complete record was read but its content is malformed.
    ///
    /// Such failures leave the stream aligned on the next record.
    pub fn is_decode(&self) -> bool {
        matches!(
            self,
            CodecError::JsonDecode(_) | CodecError::MsgPackDecode(_) | CodecError::XdrDecode(_)
        )
    }

    /// True for encode failures, which happen before any byte is written.
    pub fn is_encode(&self) -> bool {
        matches!(
            self,
            CodecError::JsonEncode(_) | CodecError::MsgPackEncode(_) | CodecError::XdrEncode(_)
        )
    }
}

/// Error reported to the caller of an RPC.
///
/// Cloneable so that a single transport failure can be handed to every call
/// pending on the connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    /// Bad magic number or unknown codec type.
    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),

    /// A frame arrived but could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The request could not be encoded.
    #[error("encode error: {0}")]
    Encode(String),

    /// The stream was closed by either side.
    #[error("connection closed")]
    ConnectionClosed,

    /// Any other transport failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with an error for this call.
    #[error("{0}")]
    Dispatch(String),

    /// The client is closing or has been shut down.
    #[error("connection is shut down")]
    Shutdown,
}

impl From<CodecError> for RpcError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::ConnectionClosed => RpcError::ConnectionClosed,
            e if e.is_decode() => RpcError::Decode(e.to_string()),
            e if e.is_encode() => RpcError::Encode(e.to_string()),
            e => RpcError::Transport(e.to_string()),
        }
    }
}

impl From<io::Error> for RpcError {
    fn from(err: io::Error) -> Self {
        RpcError::from(CodecError::from(err))
    }
}

/// Failure to resolve or invoke a method on the server.
///
/// The message is sent back to the caller in the response header.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("rpc server: service/method request ill-formed: {0}")]
    IllFormed(String),

    #[error("rpc server: can't find service {0}")]
    UnknownService(String),

    #[error("rpc server: can't find method {0}")]
    UnknownMethod(String),

    #[error("rpc server: read argv err: {0}")]
    InvalidArgument(String),

    #[error("rpc server: encode reply err: {0}")]
    InvalidReply(String),

    /// The method itself returned an error.
    #[error("{0}")]
    Failed(String),
}

/// Failure to register a service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegisterError {
    #[error("rpc: service already defined: {0}")]
    DuplicateService(String),

    #[error("rpc: service name must not be empty")]
    EmptyServiceName,
}
