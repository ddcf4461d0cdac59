//! Frame codecs - packet framing on a byte stream.
//!
//! Three wire formats share one pipeline: marshal the body with the packet's
//! body codec, run it through the transfer pipe, then frame it:
//!
//! - [`ProtoKind::Binary`] (`'p'`, `"protobuf"`):
//!   `[u32 BE len]['p'][protobuf fields]`
//! - [`ProtoKind::Json`] (`'j'`, `"json"`): one JSON object per line
//! - [`ProtoKind::Compat`] (`'2'`, `"tpV2"`): separately length-prefixed
//!   header and body sections, for older peers
//!
//! A [`FrameCodec`] owns both halves of a stream. Reads are serialized by an
//! async mutex around the buffered read half; every pack is assembled in
//! memory and written with a single `write_all`.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tpwire::protocol::{FrameCodec, ProtoKind};
//! use tpwire::packet::{Body, Packet, PacketType};
//! use tpwire::xfer::FilterRegistry;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let registry = Arc::new(FilterRegistry::new());
//! let (a, b) = tokio::io::duplex(1024);
//! let client = FrameCodec::new(ProtoKind::Binary, a, registry.clone());
//! let server = FrameCodec::new(ProtoKind::Binary, b, registry);
//!
//! let mut out = Packet::new(PacketType::Push, 7, "/notify");
//! out.set_body(Body::raw(&b"hi"[..]));
//! client.pack(&mut out).await.unwrap();
//!
//! let mut input = Packet::default();
//! server.unpack(&mut input).await.unwrap();
//! assert_eq!(input.seq(), 7);
//! assert_eq!(input.size(), out.size());
//! # }
//! ```

mod binary;
mod compat;
mod json;

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{
    AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf,
};
use tokio::sync::Mutex;
use tracing::trace;

use crate::codec::BodyCodec;
use crate::config::CodecConfig;
use crate::context::{ReadCtx, WriteCtx};
use crate::error::{Result, WireError};
use crate::packet::{Meta, Packet, PacketType};
use crate::plugin::PluginChain;
use crate::xfer::{FilterRegistry, XferPipe};

/// Length of the big-endian length prefix.
pub const LEN_PREFIX: usize = 4;

/// Tag byte marking a protobuf-encoded header.
pub const PROTOBUF_TAG: u8 = b'p';

/// Wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtoKind {
    /// Length-prefixed protobuf.
    Binary,
    /// Line-delimited JSON text.
    Json,
    /// Split header/body sections.
    Compat,
}

impl ProtoKind {
    /// Protocol id and name.
    pub fn version(self) -> (u8, &'static str) {
        match self {
            ProtoKind::Binary => (b'p', "protobuf"),
            ProtoKind::Json => (b'j', "json"),
            ProtoKind::Compat => (b'2', "tpV2"),
        }
    }

    /// Look up a format by its protocol id.
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            b'p' => Some(ProtoKind::Binary),
            b'j' => Some(ProtoKind::Json),
            b'2' => Some(ProtoKind::Compat),
            _ => None,
        }
    }
}

impl fmt::Display for ProtoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.version().1)
    }
}

/// One decoded frame. The body is still transfer-pipe transformed.
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct WireFrame {
    pub seq: u64,
    pub ptype: PacketType,
    pub uri: String,
    pub meta: Meta,
    pub body_codec: BodyCodec,
    pub body: Bytes,
    pub xfer_pipe: XferPipe,
    pub size: u32,
}

impl WireFrame {
    /// Marshal and pipe-pack a packet's body.
    fn from_packet(packet: &Packet, registry: &FilterRegistry) -> Result<Self> {
        let plain = packet.body().marshal(packet.body_codec())?;
        let body = packet.xfer_pipe().on_pack(registry, plain)?;
        Ok(Self {
            seq: packet.seq(),
            ptype: packet.ptype(),
            uri: packet.uri().to_string(),
            meta: packet.meta().clone(),
            body_codec: packet.body_codec(),
            body,
            xfer_pipe: packet.xfer_pipe().clone(),
            size: 0,
        })
    }

    /// Copy the header fields into a packet.
    fn apply_header(&self, packet: &mut Packet) {
        packet.set_seq(self.seq);
        packet.set_ptype(self.ptype);
        packet.set_uri(self.uri.clone());
        packet.set_meta(self.meta.clone());
        packet.set_body_codec(self.body_codec);
        *packet.xfer_pipe_mut() = self.xfer_pipe.clone();
        packet.set_size(self.size);
    }
}

/// Read a big-endian length prefix.
///
/// A clean end of stream before the first byte is
/// [`WireError::ConnectionClosed`]; one inside the prefix is a framing error.
pub(crate) async fn read_len<R: AsyncRead + Unpin>(r: &mut R) -> Result<u32> {
    let mut buf = [0u8; LEN_PREFIX];
    let mut filled = 0;
    while filled < LEN_PREFIX {
        let n = r.read(&mut buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Err(WireError::ConnectionClosed);
            }
            return Err(WireError::Framing(format!(
                "stream ended inside length prefix after {} bytes",
                filled
            )));
        }
        filled += n;
    }
    Ok(u32::from_be_bytes(buf))
}

/// Read exactly `len` bytes of a frame section.
pub(crate) async fn read_section<R: AsyncRead + Unpin>(r: &mut R, len: u32) -> Result<Bytes> {
    let mut buf = vec![0u8; len as usize];
    match r.read_exact(&mut buf).await {
        Ok(_) => Ok(Bytes::from(buf)),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(WireError::Framing(
            format!("stream ended inside a {}-byte section", len),
        )),
        Err(e) => Err(e.into()),
    }
}

/// Reject a declared length outside `1..=max`.
pub(crate) fn check_len(len: u32, max: u32, what: &str) -> Result<()> {
    if len == 0 {
        return Err(WireError::Framing(format!("{} length is zero", what)));
    }
    if len > max {
        return Err(WireError::Framing(format!(
            "{} length {} exceeds max packet size {}",
            what, len, max
        )));
    }
    Ok(())
}

/// Convert a wire body codec number.
pub(crate) fn body_codec_from_wire(v: i32) -> Result<BodyCodec> {
    let id = u8::try_from(v)
        .map_err(|_| WireError::Framing(format!("body codec {} out of range", v)))?;
    BodyCodec::from_id(id)
}

/// Packet codec over one byte stream.
pub struct FrameCodec<S> {
    kind: ProtoKind,
    registry: Arc<FilterRegistry>,
    config: CodecConfig,
    reader: Mutex<BufReader<ReadHalf<S>>>,
    writer: Mutex<WriteHalf<S>>,
}

impl<S> FrameCodec<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    /// Create a codec with the default configuration.
    pub fn new(kind: ProtoKind, stream: S, registry: Arc<FilterRegistry>) -> Self {
        Self::with_config(kind, stream, registry, CodecConfig::default())
    }

    /// Create a codec with a custom configuration.
    pub fn with_config(
        kind: ProtoKind,
        stream: S,
        registry: Arc<FilterRegistry>,
        config: CodecConfig,
    ) -> Self {
        let (r, w) = tokio::io::split(stream);
        Self {
            kind,
            registry,
            reader: Mutex::new(BufReader::with_capacity(config.read_buffer_size, r)),
            writer: Mutex::new(w),
            config,
        }
    }

    /// Wire format.
    #[inline]
    pub fn kind(&self) -> ProtoKind {
        self.kind
    }

    /// Protocol id and name.
    #[inline]
    pub fn version(&self) -> (u8, &'static str) {
        self.kind.version()
    }

    /// Filter registry used for transfer pipes.
    #[inline]
    pub fn registry(&self) -> &Arc<FilterRegistry> {
        &self.registry
    }

    /// Configuration.
    #[inline]
    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Encode a packet and write it as one frame.
    ///
    /// Sets the packet's size on success. After any error the stream state
    /// is undefined and the connection must be closed.
    pub async fn pack(&self, packet: &mut Packet) -> Result<()> {
        let frame = WireFrame::from_packet(packet, &self.registry)?;
        let buf = match self.kind {
            ProtoKind::Binary => binary::encode(&frame)?,
            ProtoKind::Json => json::encode(&frame)?,
            ProtoKind::Compat => compat::encode(&frame)?,
        };
        let size = u32::try_from(buf.len())
            .ok()
            .filter(|&n| n <= self.config.max_packet_size)
            .ok_or_else(|| {
                WireError::Framing(format!(
                    "frame of {} bytes exceeds max packet size {}",
                    buf.len(),
                    self.config.max_packet_size
                ))
            })?;
        packet.set_size(size);

        let mut writer = self.writer.lock().await;
        writer.write_all(&buf).await?;
        writer.flush().await?;

        trace!(
            proto = self.kind.version().1,
            seq = packet.seq(),
            uri = packet.uri(),
            size,
            "packed frame"
        );
        Ok(())
    }

    /// Read one frame and decode it into a packet.
    ///
    /// A typed body slot already in the packet receives the decoded body;
    /// otherwise the body is kept raw.
    pub async fn unpack(&self, packet: &mut Packet) -> Result<()> {
        self.read(&mut ReadCtx::new(packet), &PluginChain::new())
            .await
    }

    /// Run the write hooks around [`pack`](Self::pack).
    pub async fn write(&self, ctx: &mut WriteCtx<'_>, plugins: &PluginChain) -> Result<()> {
        plugins.pre_write(ctx)?;
        self.pack(ctx.output_mut()).await?;
        plugins.post_write(ctx)?;
        Ok(())
    }

    /// Read one frame, running the read hooks.
    ///
    /// Framing and transfer-pipe errors leave the packet untouched. A body
    /// unmarshal error leaves the header set and the body slot unchanged;
    /// `read_body_failed` hooks run instead of `post_read_body`.
    pub async fn read(&self, ctx: &mut ReadCtx<'_>, plugins: &PluginChain) -> Result<()> {
        let frame = {
            let mut reader = self.reader.lock().await;
            let max = self.config.max_packet_size;
            match self.kind {
                ProtoKind::Binary => binary::read(&mut *reader, max).await?,
                ProtoKind::Json => json::read(&mut *reader, max).await?,
                ProtoKind::Compat => compat::read(&mut *reader, max).await?,
            }
        };
        let body = frame.xfer_pipe.on_unpack(&self.registry, frame.body.clone())?;

        frame.apply_header(ctx.input_mut());
        trace!(
            proto = self.kind.version().1,
            seq = frame.seq,
            uri = %frame.uri,
            size = frame.size,
            "unpacked frame"
        );

        plugins.post_read_header(ctx)?;
        let loaded = plugins.pre_read_body(ctx).map_err(WireError::from).and_then(|()| {
            let packet = ctx.input_mut();
            let codec = packet.body_codec();
            packet.body_mut().unmarshal(codec, body)
        });
        if let Err(err) = loaded {
            plugins.read_body_failed(ctx, &err)?;
            return Err(err);
        }
        plugins.post_read_body(ctx)?;
        Ok(())
    }
}

impl<S> fmt::Debug for FrameCodec<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameCodec")
            .field("kind", &self.kind)
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
