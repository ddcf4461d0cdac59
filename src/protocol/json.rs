//! Line-delimited JSON framing.
//!
//! One frame is one compact JSON object followed by `\n`:
//!
//! ```text
//! {"seq":1,"ptype":1,"uri":"/math/add","meta":"","body_codec":106,"body":"{\"A\":10}","xfer_pipe":[]}
//! ```
//!
//! A body that is valid UTF-8 travels as the `body` string; any other body
//! is base64 in `body_base64`.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use super::{body_codec_from_wire, WireFrame};
use crate::codec::{RawCodec, TextForm};
use crate::error::{Result, WireError};
use crate::packet::{Meta, PacketType};
use crate::xfer::XferPipe;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct JsonFrame {
    seq: u64,
    ptype: i32,
    uri: String,
    meta: String,
    body_codec: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body_base64: Option<String>,
    xfer_pipe: Vec<u8>,
}

/// Encode a frame, trailing newline included.
pub(crate) fn encode(frame: &WireFrame) -> Result<Vec<u8>> {
    let (body, body_base64) = if frame.body.is_empty() {
        (None, None)
    } else {
        match RawCodec::text_form(&frame.body) {
            TextForm::Utf8(s) => (Some(s.to_string()), None),
            TextForm::Base64(b) => (None, Some(b)),
        }
    };
    let msg = JsonFrame {
        seq: frame.seq,
        ptype: frame.ptype.as_wire(),
        uri: frame.uri.clone(),
        meta: frame.meta.to_query_string(),
        body_codec: i32::from(frame.body_codec.id()),
        body,
        body_base64,
        xfer_pipe: frame.xfer_pipe.ids().to_vec(),
    };
    let mut buf = serde_json::to_vec(&msg)?;
    buf.push(b'\n');
    Ok(buf)
}

/// Read and decode one line.
pub(crate) async fn read<R: AsyncBufRead + Unpin>(r: &mut R, max: u32) -> Result<WireFrame> {
    let mut line = Vec::new();
    let n = (&mut *r)
        .take(u64::from(max))
        .read_until(b'\n', &mut line)
        .await?;
    if n == 0 {
        return Err(WireError::ConnectionClosed);
    }
    if line.last() != Some(&b'\n') {
        if n as u64 >= u64::from(max) {
            return Err(WireError::Framing(format!(
                "json frame exceeds max packet size {}",
                max
            )));
        }
        return Err(WireError::Framing(format!(
            "stream ended inside a json frame after {} bytes",
            n
        )));
    }
    let size = u32::try_from(n)
        .map_err(|_| WireError::Framing(format!("json frame of {} bytes", n)))?;
    decode(&line[..n - 1], size)
}

/// Decode one line without its newline.
pub(crate) fn decode(line: &[u8], size: u32) -> Result<WireFrame> {
    let msg: JsonFrame = serde_json::from_slice(line)
        .map_err(|e| WireError::Framing(format!("decode json frame: {}", e)))?;

    let body = match (msg.body, msg.body_base64) {
        (Some(s), _) => Bytes::from(s.into_bytes()),
        (None, Some(b)) => RawCodec::from_base64(&b)?,
        (None, None) => Bytes::new(),
    };
    Ok(WireFrame {
        seq: msg.seq,
        ptype: PacketType::from_wire(msg.ptype)?,
        uri: msg.uri,
        meta: Meta::parse(&msg.meta),
        body_codec: body_codec_from_wire(msg.body_codec)?,
        body,
        xfer_pipe: XferPipe::from_ids(msg.xfer_pipe),
        size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::BodyCodec;

    fn sample(body: &'static [u8]) -> WireFrame {
        WireFrame {
            seq: 1,
            ptype: PacketType::Pull,
            uri: "/math/add".into(),
            meta: Meta::parse("k=v"),
            body_codec: BodyCodec::Json,
            body: Bytes::from_static(body),
            xfer_pipe: XferPipe::new(),
            size: 0,
        }
    }

    #[test]
    fn test_one_line_human_readable() {
        let buf = encode(&sample(br#"{"A":10,"B":2}"#)).unwrap();
        let text = std::str::from_utf8(&buf).unwrap();
        assert_eq!(text.matches('\n').count(), 1);
        assert!(text.ends_with('\n'));
        assert!(text.contains(r#""uri":"/math/add""#));
        assert!(text.contains(r#""body":"{\"A\":10,\"B\":2}""#));
        assert!(text.contains(r#""xfer_pipe":[]"#));
    }

    #[tokio::test]
    async fn test_binary_body_uses_base64() {
        let frame = sample(&[0xff, 0x00, b'\n']);
        let buf = encode(&frame).unwrap();
        assert!(std::str::from_utf8(&buf).unwrap().contains("body_base64"));

        let mut r = &buf[..];
        let back = read(&mut r, 1024).await.unwrap();
        assert_eq!(&back.body[..], &[0xff, 0x00, b'\n']);
        assert_eq!(back.size as usize, buf.len());
    }

    #[tokio::test]
    async fn test_two_frames_back_to_back() {
        let mut buf = encode(&sample(b"one")).unwrap();
        buf.extend(encode(&sample(b"two")).unwrap());
        let mut r = &buf[..];
        assert_eq!(&read(&mut r, 1024).await.unwrap().body[..], b"one");
        assert_eq!(&read(&mut r, 1024).await.unwrap().body[..], b"two");
        assert!(matches!(
            read(&mut r, 1024).await,
            Err(WireError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_missing_newline_and_oversize() {
        let buf = encode(&sample(b"x")).unwrap();
        let mut r = &buf[..buf.len() - 1];
        assert!(matches!(
            read(&mut r, 1024).await,
            Err(WireError::Framing(_))
        ));

        let mut r = &buf[..];
        let err = read(&mut r, 10).await.unwrap_err();
        assert!(err.to_string().contains("exceeds max"));
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(decode(b"{nope", 6), Err(WireError::Framing(_))));
    }
}
