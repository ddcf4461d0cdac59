//! # tpwire
//!
//! Pluggable wire protocol for pull/push/reply RPC over byte streams.
//!
//! ## Architecture
//!
//! - **Packets** ([`packet`]): sequence, type, URI, metadata, body codec,
//!   body, transfer pipe and frame size
//! - **Frame codecs** ([`protocol`]): length-prefixed protobuf, line JSON
//!   and a split-section compatibility format over any
//!   `AsyncRead + AsyncWrite` stream
//! - **Transfer filters** ([`xfer`]): reversible byte transforms (MD5
//!   checksum, AES) applied to the serialized body in pipe order
//! - **Plugins** ([`plugin`], [`secure`]): hooks around reads and writes,
//!   including query-activated body encryption
//! - **Heartbeat** ([`heartbeat`]): prober and responder with negotiated
//!   rates and liveness sweeps over the runtime's sessions
//!
//! The session runtime itself (accept/dial, routing, dispatch) stays
//! outside this crate and plugs in through the [`session`] traits.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use tpwire::codec::BodyCodec;
//! use tpwire::packet::{Body, Packet, PacketType};
//! use tpwire::protocol::{FrameCodec, ProtoKind};
//! use tpwire::xfer::{FilterRegistry, Md5Hash};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> tpwire::Result<()> {
//!     let registry = Arc::new(FilterRegistry::new().with(Md5Hash::new(b'm', "md5"))?);
//!     let (a, b) = tokio::io::duplex(4096);
//!     let client = FrameCodec::new(ProtoKind::Binary, a, registry.clone());
//!     let server = FrameCodec::new(ProtoKind::Binary, b, registry);
//!
//!     let mut req = Packet::new(PacketType::Pull, 1, "/math/add");
//!     req.set_body_codec(BodyCodec::Json);
//!     req.set_body(Body::typed(vec![10, 2]));
//!     req.xfer_pipe_mut().append(b'm');
//!     client.pack(&mut req).await?;
//!
//!     let mut input = Packet::with_body_slot::<Vec<i32>>();
//!     server.unpack(&mut input).await?;
//!     assert_eq!(input.body().downcast_ref::<Vec<i32>>(), Some(&vec![10, 2]));
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod heartbeat;
pub mod packet;
pub mod plugin;
pub mod protocol;
pub mod secure;
pub mod session;
pub mod xfer;

pub use error::{CallError, Result, WireError};
pub use packet::{Body, Meta, Packet, PacketType};
pub use protocol::{FrameCodec, ProtoKind};
