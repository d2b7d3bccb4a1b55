//! Message codecs: how a [`Header`] and its body are laid out on the wire.
//!
//! A connection carries a sequence of header/body pairs in each direction.
//! Each header and each body is one length-delimited record (see
//! [`rpc::wire`](crate::protocol::rpc)); the codec decides how the bytes of a
//! record are produced:
//!
//! - [`CodecType::Json`] - human-readable, `serde_json` for headers and bodies
//! - [`CodecType::MsgPack`] - compact binary, XDR headers and MessagePack bodies
//!
//! The codec is chosen once per connection by the handshake, by looking up the
//! identifier the initiator sent with [`CodecType::from_name`].
//!
//! A connection's codec is split in two halves so that reading and writing can
//! proceed concurrently: [`CodecReader`] owns the read side of the stream and
//! [`CodecWriter`] the buffered write side. Neither half is safe to share
//! between tasks without external locking.

use std::fmt;

use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{error, trace};

use crate::error::CodecError;
use crate::protocol::rpc::{self, wire};

mod json;
mod msgpack;

pub use json::JsonCodec;
pub use msgpack::MsgPackCodec;

/// Identifier of the JSON codec in the handshake.
pub const JSON_TYPE: &str = "application/json";
/// Identifier of the MessagePack codec in the handshake.
pub const MSGPACK_TYPE: &str = "application/msgpack";

/// Envelope preceding every body on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Header {
    /// `"<Service>.<Method>"`, opaque to the transport.
    pub service_method: String,
    /// Correlates a response with its request; 0 is never assigned to a call.
    pub seq: u64,
    /// Empty on requests. Set by the server when the call failed.
    #[serde(default)]
    pub error: String,
}

/// The closed set of wire formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecType {
    Json,
    MsgPack,
}

/// Codec registry: handshake identifier to codec.
const CODECS: [(&str, CodecType); 2] =
    [(JSON_TYPE, CodecType::Json), (MSGPACK_TYPE, CodecType::MsgPack)];

impl CodecType {
    /// Looks up the codec registered under `name`.
    pub fn from_name(name: &str) -> Option<CodecType> {
        CODECS.iter().find(|(n, _)| *n == name).map(|(_, t)| *t)
    }

    /// Identifier sent in the handshake.
    pub fn name(self) -> &'static str {
        match self {
            CodecType::Json => JSON_TYPE,
            CodecType::MsgPack => MSGPACK_TYPE,
        }
    }

    pub fn encode_header(self, header: &Header) -> Result<Vec<u8>, CodecError> {
        match self {
            CodecType::Json => JsonCodec::encode_header(header),
            CodecType::MsgPack => MsgPackCodec::encode_header(header),
        }
    }

    pub fn decode_header(self, bytes: &[u8]) -> Result<Header, CodecError> {
        match self {
            CodecType::Json => JsonCodec::decode_header(bytes),
            CodecType::MsgPack => MsgPackCodec::decode_header(bytes),
        }
    }

    pub fn encode_body<T: serde::Serialize + ?Sized>(self, body: &T) -> Result<Vec<u8>, CodecError> {
        match self {
            CodecType::Json => JsonCodec::encode(body),
            CodecType::MsgPack => MsgPackCodec::encode(body),
        }
    }

    pub fn decode_body<T: DeserializeOwned>(self, bytes: &[u8]) -> Result<T, CodecError> {
        match self {
            CodecType::Json => JsonCodec::decode(bytes),
            CodecType::MsgPack => MsgPackCodec::decode(bytes),
        }
    }
}

impl fmt::Display for CodecType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Read half of a connection's codec.
#[derive(Debug)]
pub struct CodecReader<R> {
    reader: R,
    codec_type: CodecType,
    max_record_length: usize,
}

impl<R: AsyncRead + Unpin> CodecReader<R> {
    pub fn new(codec_type: CodecType, reader: R) -> Self {
        Self { reader, codec_type, max_record_length: rpc::MAX_RECORD_LENGTH }
    }

    /// Overrides the largest record the reader accepts.
    pub fn with_max_record_length(mut self, max_record_length: usize) -> Self {
        self.max_record_length = max_record_length;
        self
    }

    pub fn codec_type(&self) -> CodecType {
        self.codec_type
    }

    /// Reads the next header.
    ///
    /// Fails with [`CodecError::ConnectionClosed`] when the stream is
    /// exhausted, and with a decode error (see [`CodecError::is_decode`]) when
    /// the header record is malformed. After a decode error the matching body
    /// is still on the stream.
    pub async fn read_header(&mut self) -> Result<Header, CodecError> {
        let record = wire::read_record(&mut self.reader, self.max_record_length).await?;
        let header = self.codec_type.decode_header(&record)?;
        trace!("read header {:?}", header);
        Ok(header)
    }

    /// Reads the next body and decodes it as `T`.
    ///
    /// The body record is consumed even if decoding fails.
    pub async fn read_body<T: DeserializeOwned>(&mut self) -> Result<T, CodecError> {
        let record = self.read_body_raw().await?;
        self.codec_type.decode_body(&record)
    }

    /// Reads the next body without decoding it.
    pub async fn read_body_raw(&mut self) -> Result<Vec<u8>, CodecError> {
        wire::read_record(&mut self.reader, self.max_record_length).await
    }

    /// Consumes the next body and throws it away.
    pub async fn discard_body(&mut self) -> Result<(), CodecError> {
        self.read_body_raw().await.map(|_| ())
    }
}

/// Write half of a connection's codec.
///
/// Writes are buffered and flushed once per header/body pair. Any failure
/// shuts the stream down: a half-written pair would corrupt every later frame.
#[derive(Debug)]
pub struct CodecWriter<W> {
    writer: BufWriter<W>,
    codec_type: CodecType,
    closed: bool,
}

impl<W: AsyncWrite + Unpin> CodecWriter<W> {
    pub fn new(codec_type: CodecType, writer: W) -> Self {
        Self { writer: BufWriter::new(writer), codec_type, closed: false }
    }

    pub fn codec_type(&self) -> CodecType {
        self.codec_type
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Encodes `header` and `body` and writes them as one pair.
    pub async fn write<B: serde::Serialize + ?Sized>(
        &mut self,
        header: &Header,
        body: &B,
    ) -> Result<(), CodecError> {
        let body = match self.codec_type.encode_body(body) {
            Ok(body) => body,
            Err(e) => {
                error!("rpc codec: error encoding body: {}", e);
                self.close().await;
                return Err(e);
            }
        };
        self.write_encoded(header, &body).await
    }

    /// Writes `header` followed by an already encoded body.
    pub async fn write_encoded(&mut self, header: &Header, body: &[u8]) -> Result<(), CodecError> {
        if self.closed {
            return Err(CodecError::ConnectionClosed);
        }
        let result = self.write_pair(header, body).await;
        if let Err(e) = &result {
            error!("rpc codec: error writing {:?}: {}", header, e);
            self.close().await;
        }
        result
    }

    async fn write_pair(&mut self, header: &Header, body: &[u8]) -> Result<(), CodecError> {
        let header_buf = self.codec_type.encode_header(header)?;
        wire::write_record(&mut self.writer, &header_buf).await?;
        wire::write_record(&mut self.writer, body).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Flushes what is buffered and shuts the write side down.
    ///
    /// Closing twice is a no-op.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.writer.shutdown().await;
    }
}
