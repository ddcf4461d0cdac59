//! Length-prefixed protobuf framing.
//!
//! ```text
//! ┌──────────────┬─────┬──────────────────────────────┐
//! │ Length       │ Tag │ Format (protobuf)            │
//! │ 4 bytes BE   │ 'p' │ seq, ptype, uri, meta,       │
//! │ = 1 + fields │     │ body_codec, body, xfer_pipe  │
//! └──────────────┴─────┴──────────────────────────────┘
//! ```
//!
//! `meta` is the URL-encoded query string; `body` has already been through
//! the transfer pipe.

use bytes::{BufMut, Bytes};
use prost::Message;
use tokio::io::AsyncRead;

use super::{body_codec_from_wire, check_len, read_len, read_section, WireFrame};
use super::{LEN_PREFIX, PROTOBUF_TAG};
use crate::error::{Result, WireError};
use crate::packet::{Meta, PacketType};
use crate::xfer::XferPipe;

#[derive(Clone, PartialEq, Message)]
pub(crate) struct Format {
    #[prost(uint64, tag = "1")]
    pub seq: u64,
    #[prost(int32, tag = "2")]
    pub ptype: i32,
    #[prost(string, tag = "3")]
    pub uri: String,
    #[prost(bytes = "vec", tag = "4")]
    pub meta: Vec<u8>,
    #[prost(int32, tag = "5")]
    pub body_codec: i32,
    #[prost(bytes = "bytes", tag = "6")]
    pub body: Bytes,
    #[prost(bytes = "vec", tag = "7")]
    pub xfer_pipe: Vec<u8>,
}

/// Encode a frame, length prefix included.
pub(crate) fn encode(frame: &WireFrame) -> Result<Vec<u8>> {
    let msg = Format {
        seq: frame.seq,
        ptype: frame.ptype.as_wire(),
        uri: frame.uri.clone(),
        meta: frame.meta.to_query_string().into_bytes(),
        body_codec: i32::from(frame.body_codec.id()),
        body: frame.body.clone(),
        xfer_pipe: frame.xfer_pipe.ids().to_vec(),
    };
    let len = 1 + msg.encoded_len();
    let len_u32 = u32::try_from(len)
        .map_err(|_| WireError::Framing(format!("frame of {} bytes is too large", len)))?;

    let mut buf = Vec::with_capacity(LEN_PREFIX + len);
    buf.put_u32(len_u32);
    buf.put_u8(PROTOBUF_TAG);
    msg.encode(&mut buf)
        .map_err(|e| WireError::Framing(format!("encode header: {}", e)))?;
    Ok(buf)
}

/// Read and decode one frame.
pub(crate) async fn read<R: AsyncRead + Unpin>(r: &mut R, max: u32) -> Result<WireFrame> {
    let len = read_len(r).await?;
    check_len(len, max.saturating_sub(LEN_PREFIX as u32), "frame")?;
    let buf = read_section(r, len).await?;
    decode(buf, LEN_PREFIX as u32 + len)
}

/// Decode the bytes after the length prefix.
pub(crate) fn decode(buf: Bytes, size: u32) -> Result<WireFrame> {
    match buf.first() {
        Some(&PROTOBUF_TAG) => {}
        Some(&tag) => {
            return Err(WireError::Framing(format!(
                "unknown protocol tag {:?}",
                tag as char
            )))
        }
        None => return Err(WireError::Framing("empty frame".into())),
    }
    let msg = Format::decode(buf.slice(1..))
        .map_err(|e| WireError::Framing(format!("decode header: {}", e)))?;

    let meta = std::str::from_utf8(&msg.meta)
        .map_err(|_| WireError::Framing("metadata is not UTF-8".into()))?;
    Ok(WireFrame {
        seq: msg.seq,
        ptype: PacketType::from_wire(msg.ptype)?,
        uri: msg.uri,
        meta: Meta::parse(meta),
        body_codec: body_codec_from_wire(msg.body_codec)?,
        body: msg.body,
        xfer_pipe: XferPipe::from_ids(msg.xfer_pipe),
        size,
    })
}
