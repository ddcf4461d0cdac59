//! Split-section framing for older peers.
//!
//! ```text
//! header: [u32 BE len = 1 + n]['p'][CompatHeader protobuf, n bytes]
//! body:   [u32 BE len = 1 + m][body codec id][body, m bytes]
//! ```
//!
//! Older peers have no metadata field; a propagated error travels in
//! `status_code`/`status` instead. On pack the error is copied into those
//! fields while the metadata goes out unchanged in an extension field, next
//! to the transfer pipe. On read the status fields only fill in metadata
//! that does not already carry a status, which is the case for older peers.

use bytes::{BufMut, Bytes};
use prost::Message;
use tokio::io::AsyncRead;

use super::{check_len, read_len, read_section, WireFrame};
use super::{LEN_PREFIX, PROTOBUF_TAG};
use crate::codec::BodyCodec;
use crate::error::{CallError, Result, WireError, META_STATUS, META_STATUS_CODE};
use crate::packet::{Meta, PacketType};
use crate::xfer::XferPipe;

#[derive(Clone, PartialEq, Message)]
pub(crate) struct CompatHeader {
    #[prost(uint64, tag = "1")]
    pub seq: u64,
    #[prost(int32, tag = "2")]
    pub r#type: i32,
    #[prost(string, tag = "3")]
    pub uri: String,
    #[prost(int32, tag = "4")]
    pub status_code: i32,
    #[prost(string, tag = "5")]
    pub status: String,
    #[prost(bytes = "vec", tag = "6")]
    pub xfer_pipe: Vec<u8>,
    #[prost(string, tag = "7")]
    pub meta: String,
}

/// Encode both sections.
pub(crate) fn encode(frame: &WireFrame) -> Result<Vec<u8>> {
    let (status_code, status) = match CallError::from_meta(&frame.meta) {
        Some(err) => (err.code, err.message),
        None => (0, String::new()),
    };
    let header = CompatHeader {
        seq: frame.seq,
        r#type: frame.ptype.as_wire(),
        uri: frame.uri.clone(),
        status_code,
        status,
        xfer_pipe: frame.xfer_pipe.ids().to_vec(),
        meta: frame.meta.to_query_string(),
    };

    let hlen = 1 + header.encoded_len();
    let blen = 1 + frame.body.len();
    let (hlen_u32, blen_u32) = match (u32::try_from(hlen), u32::try_from(blen)) {
        (Ok(h), Ok(b)) => (h, b),
        _ => {
            return Err(WireError::Framing(format!(
                "frame sections of {} and {} bytes are too large",
                hlen, blen
            )))
        }
    };

    let mut buf = Vec::with_capacity(LEN_PREFIX * 2 + hlen + blen);
    buf.put_u32(hlen_u32);
    buf.put_u8(PROTOBUF_TAG);
    header
        .encode(&mut buf)
        .map_err(|e| WireError::Framing(format!("encode header: {}", e)))?;
    buf.put_u32(blen_u32);
    buf.put_u8(frame.body_codec.id());
    buf.extend_from_slice(&frame.body);
    Ok(buf)
}

/// Read and decode both sections.
pub(crate) async fn read<R: AsyncRead + Unpin>(r: &mut R, max: u32) -> Result<WireFrame> {
    let budget = max.saturating_sub(2 * LEN_PREFIX as u32);

    let hlen = read_len(r).await?;
    check_len(hlen, budget, "header section")?;
    let head = read_section(r, hlen).await?;

    let blen = match read_len(r).await {
        Err(WireError::ConnectionClosed) => {
            return Err(WireError::Framing(
                "stream ended between header and body sections".into(),
            ))
        }
        other => other?,
    };
    if blen > budget - hlen {
        return Err(WireError::Framing(format!(
            "body section length {} exceeds max packet size {}",
            blen, max
        )));
    }
    let body = read_section(r, blen).await?;

    let size = 2 * LEN_PREFIX as u32 + hlen + blen;
    let mut frame = decode_header(head, size)?;
    // A zero-length body section is tolerated as "no codec, no body".
    if !body.is_empty() {
        frame.body_codec = BodyCodec::from_id(body[0])?;
        frame.body = body.slice(1..);
    }
    Ok(frame)
}

fn decode_header(head: Bytes, size: u32) -> Result<WireFrame> {
    match head.first() {
        Some(&PROTOBUF_TAG) => {}
        Some(&tag) => {
            return Err(WireError::Framing(format!(
                "unknown protocol tag {:?}",
                tag as char
            )))
        }
        None => return Err(WireError::Framing("empty header section".into())),
    }
    let header = CompatHeader::decode(head.slice(1..))
        .map_err(|e| WireError::Framing(format!("decode header: {}", e)))?;

    let mut meta = Meta::parse(&header.meta);
    if header.status_code != 0 && !meta.contains_key(META_STATUS_CODE) {
        meta.set(META_STATUS_CODE, header.status_code.to_string());
        meta.set(META_STATUS, header.status);
    }
    Ok(WireFrame {
        seq: header.seq,
        ptype: PacketType::from_wire(header.r#type)?,
        uri: header.uri,
        meta,
        body_codec: BodyCodec::Raw,
        body: Bytes::new(),
        xfer_pipe: XferPipe::from_ids(header.xfer_pipe),
        size,
    })
}
