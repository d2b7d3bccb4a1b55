//! Compact binary codec.
//!
//! Headers are XDR structures:
//!
//! ```text
//! struct header {
//!     string        service_method<>;
//!     unsigned hyper seq;
//!     string        error<>;
//! };
//! ```
//!
//! Bodies are MessagePack, encoded with `rmp_serde::to_vec_named` so that
//! structs travel as maps keyed by field name rather than positional arrays.
//! That keeps a body decodable when the two ends disagree on field order.

use std::io::Cursor;

use serde::de::DeserializeOwned;

use super::Header;
use crate::error::CodecError;
use crate::protocol::xdr::{self, DeserializeStruct, Serialize, SerializeStruct};

SerializeStruct!(Header, service_method, seq, error);
DeserializeStruct!(Header, service_method, seq, error);

/// MessagePack codec with XDR headers.
pub struct MsgPackCodec;

impl MsgPackCodec {
    pub fn encode_header(header: &Header) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::with_capacity(header.service_method.len() + header.error.len() + 16);
        header.serialize(&mut buf).map_err(CodecError::XdrEncode)?;
        Ok(buf)
    }

    /// Decodes a header and rejects trailing bytes in the record.
    pub fn decode_header(bytes: &[u8]) -> Result<Header, CodecError> {
        let mut src = Cursor::new(bytes);
        let header = xdr::deserialize::<Header>(&mut src).map_err(CodecError::XdrDecode)?;
        if src.position() as usize != bytes.len() {
            return Err(CodecError::XdrDecode(xdr::invalid_data("trailing bytes after header")));
        }
        Ok(header)
    }

    #[inline]
    pub fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CodecError> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    #[inline]
    pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}
