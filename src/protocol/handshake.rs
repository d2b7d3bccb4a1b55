//! Connection handshake.
//!
//! Before any header/body pair, the initiator sends one [`Options`] record and
//! the acceptor reads it exactly once. The record is a single JSON object
//! terminated by a newline, whatever codec it selects:
//!
//! ```text
//! {"MagicNumber":3927900,"CodecType":"application/json"}\n
//! ```
//!
//! The acceptor drops the connection without writing anything if the magic
//! number is wrong or the codec type is not registered.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::{CodecError, RpcError};
use crate::protocol::codec::CodecType;

/// Marks a connection as speaking this protocol.
pub const MAGIC_NUMBER: u32 = 0x3bef5c;

/// Longest options line the acceptor reads before giving up.
const MAX_OPTIONS_LENGTH: u64 = 1024;

/// Parameters negotiated once per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    pub magic_number: u32,
    pub codec_type: CodecType,
}

impl Default for Options {
    fn default() -> Self {
        Self { magic_number: MAGIC_NUMBER, codec_type: CodecType::Json }
    }
}

impl Options {
    pub fn new(codec_type: CodecType) -> Self {
        Self { codec_type, ..Default::default() }
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OptionsRecord {
    magic_number: u64,
    codec_type: String,
}

/// Sends `opt` and flushes it.
pub async fn write_options<W: AsyncWrite + Unpin>(
    writer: &mut W,
    opt: &Options,
) -> Result<(), CodecError> {
    let record = OptionsRecord {
        magic_number: u64::from(opt.magic_number),
        codec_type: opt.codec_type.name().to_string(),
    };
    let mut line = serde_json::to_vec(&record).map_err(CodecError::JsonEncode)?;
    line.push(b'\n');
    trace!("writing options {}", String::from_utf8_lossy(&line).trim_end());
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads and validates the initiator's options.
///
/// `reader` must be the buffered reader the codec will keep using afterwards:
/// bytes following the options line may already sit in its buffer.
pub async fn read_options<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Options, RpcError> {
    let mut line = Vec::new();
    let n = (&mut *reader).take(MAX_OPTIONS_LENGTH).read_until(b'\n', &mut line).await?;
    if n == 0 {
        return Err(RpcError::ConnectionClosed);
    }
    if line.last() != Some(&b'\n') {
        return Err(RpcError::HandshakeRejected(format!(
            "options record truncated or longer than {MAX_OPTIONS_LENGTH} bytes"
        )));
    }

    let record: OptionsRecord = serde_json::from_slice(&line)
        .map_err(|e| RpcError::HandshakeRejected(format!("invalid options: {e}")))?;
    if record.magic_number != u64::from(MAGIC_NUMBER) {
        return Err(RpcError::HandshakeRejected(format!(
            "invalid magic number {:#x}",
            record.magic_number
        )));
    }
    let Some(codec_type) = CodecType::from_name(&record.codec_type) else {
        return Err(RpcError::HandshakeRejected(format!(
            "invalid codec type {}",
            record.codec_type
        )));
    };

    Ok(Options { magic_number: MAGIC_NUMBER, codec_type })
}
