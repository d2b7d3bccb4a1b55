//! Record framing for headers and bodies on a byte stream.
//!
//! Every header and every body travels as one record, delimited with the
//! Record Marking Standard of RFC 5531 section 11: a record is a sequence of
//! fragments, each prefixed with a 4-byte big-endian marker whose highest bit
//! flags the last fragment and whose lower 31 bits carry the fragment length.
//!
//! Length-delimited records keep both peers aligned even when the content of
//! a record turns out to be undecodable: the reader always knows where the
//! next record starts.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::CodecError;

/// Highest bit of the record marker.
const LAST_FRAGMENT: u32 = 1 << 31;
/// Maximum fragment size is 2^31 - 1 bytes.
const MAX_FRAGMENT_SIZE: usize = (1 << 31) - 1;

/// Reads one fragment and appends its payload to `append_to`.
///
/// Returns true if this was the last fragment of the record.
async fn read_fragment<R: AsyncRead + Unpin>(
    socket: &mut R,
    append_to: &mut Vec<u8>,
    max_record_length: usize,
) -> Result<bool, CodecError> {
    let mut header_buf = [0_u8; 4];
    socket.read_exact(&mut header_buf).await.map_err(eof_as_closed)?;
    let fragment_header = u32::from_be_bytes(header_buf);
    let is_last = (fragment_header & LAST_FRAGMENT) > 0;
    let length = (fragment_header & !LAST_FRAGMENT) as usize;
    trace!("Reading fragment length:{}, last:{}", length, is_last);
    if append_to.len().saturating_add(length) > max_record_length {
        return Err(CodecError::RecordTooLarge(
            append_to.len().saturating_add(length),
            max_record_length,
        ));
    }
    let start_offset = append_to.len();
    append_to.resize(start_offset + length, 0);
    socket.read_exact(&mut append_to[start_offset..]).await.map_err(eof_as_closed)?;
    Ok(is_last)
}

/// Reads fragments until a complete record has been reassembled.
pub async fn read_record<R: AsyncRead + Unpin>(
    socket: &mut R,
    max_record_length: usize,
) -> Result<Vec<u8>, CodecError> {
    let mut record = Vec::new();
    while !read_fragment(socket, &mut record, max_record_length).await? {}
    Ok(record)
}

/// Writes `buf` as one record.
///
/// Large buffers are split into several fragments. An empty buffer is still
/// written as a single empty last fragment so that the reader sees a record.
pub async fn write_record<W: AsyncWrite + Unpin>(
    socket: &mut W,
    buf: &[u8],
) -> Result<(), CodecError> {
    let mut offset = 0;
    loop {
        let remaining = buf.len() - offset;
        let fragment_size = std::cmp::min(remaining, MAX_FRAGMENT_SIZE);
        let is_last = offset + fragment_size >= buf.len();

        let fragment_header =
            if is_last { fragment_size as u32 | LAST_FRAGMENT } else { fragment_size as u32 };
        socket.write_all(&fragment_header.to_be_bytes()).await?;

        trace!("Writing fragment length:{}, last:{}", fragment_size, is_last);
        socket.write_all(&buf[offset..offset + fragment_size]).await?;

        offset += fragment_size;
        if is_last {
            return Ok(());
        }
    }
}

/// End of stream, whether at a record boundary or inside a record, closes
/// the connection.
fn eof_as_closed(e: io::Error) -> CodecError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        CodecError::ConnectionClosed
    } else {
        CodecError::Io(e)
    }
}
