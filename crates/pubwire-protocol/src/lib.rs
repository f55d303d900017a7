//! Wire protocol for pubwire.
//!
//! This crate defines what travels between a broker and its clients:
//!
//! - **Frames** ([`Frame`], [`MessageType`], [`encode`], [`decode`]):
//!   the outer framing: one type byte, an opaque body, one terminator byte.
//! - **Envelopes** ([`SubscribeMsg`], [`UnsubscribeMsg`], [`PublishMsg`]):
//!   the structures carried inside frame bodies.
//! - **Codecs** ([`Codec`] trait, [`JsonCodec`], [`MsgPackCodec`]): how
//!   envelopes are turned into body bytes and back.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! ```text
//! bytes ──decode──→ Frame { kind, body } ──Codec──→ PublishMsg { topic, data }
//! ```
//!
//! The protocol layer knows nothing about sockets or topics. The transport
//! layer reads bytes up to [`TERMINATOR`] and hands them to [`decode`].

mod codec;
mod error;
mod frame;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
#[cfg(feature = "msgpack")]
pub use codec::MsgPackCodec;
pub use error::ProtocolError;
pub use frame::{decode, encode, Frame, MessageType, TERMINATOR};
pub use types::{PublishMsg, SubscribeMsg, UnsubscribeMsg};
