//! Human-readable codec: headers and bodies are JSON documents.
//!
//! A header record looks like `{"ServiceMethod":"Foo.Sum","Seq":7,"Error":""}`.

use serde::de::DeserializeOwned;

use super::Header;
use crate::error::CodecError;

/// JSON codec for headers and bodies, using `serde_json`.
pub struct JsonCodec;

impl JsonCodec {
    pub fn encode_header(header: &Header) -> Result<Vec<u8>, CodecError> {
        Self::encode(header)
    }

    pub fn decode_header(bytes: &[u8]) -> Result<Header, CodecError> {
        Self::decode(bytes)
    }

    #[inline]
    pub fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(CodecError::JsonEncode)
    }

    #[inline]
    pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(bytes).map_err(CodecError::JsonDecode)
    }
}
