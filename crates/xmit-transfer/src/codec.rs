//! Request/response payload codec: canonical CBOR through a zstd stream.

use std::io::Read;
use std::io::Write as _;

use minicbor::{Decode, Encode};
use xmit_types::{Result, XmitError};

/// Encode a wire record and compress it at the maximum zstd level.
///
/// The whole payload is materialized before sending so the request body can
/// be re-read from a fresh view over the same buffer.
pub fn encode_payload<T: Encode<()>>(record: &T) -> Result<Vec<u8>> {
    let cbor = minicbor::to_vec(record).map_err(|e| XmitError::Encode(e.to_string()))?;
    let mut encoder = zstd::stream::write::Encoder::new(Vec::new(), max_compression_level())
        .map_err(|e| XmitError::Encode(format!("zstd init: {e}")))?;
    encoder
        .write_all(&cbor)
        .map_err(|e| XmitError::Encode(format!("zstd write: {e}")))?;
    encoder
        .finish()
        .map_err(|e| XmitError::Encode(format!("zstd finish: {e}")))
}

/// Decompress and decode a response body.
pub fn decode_payload<T: for<'b> Decode<'b, ()>>(body: impl Read) -> Result<T> {
    let mut decoder = zstd::stream::read::Decoder::new(body)
        .map_err(|e| XmitError::Decode(format!("zstd init: {e}")))?;
    let mut plain = Vec::new();
    decoder
        .read_to_end(&mut plain)
        .map_err(|e| XmitError::Decode(format!("zstd: {e}")))?;
    minicbor::decode(&plain).map_err(|e| XmitError::Decode(e.to_string()))
}

fn max_compression_level() -> i32 {
    *zstd::compression_level_range().end()
}
