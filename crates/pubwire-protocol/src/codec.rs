//! Body codecs: how envelopes become frame bodies.
//!
//! The frame layer treats bodies as opaque bytes. What goes inside is decided
//! by a [`Codec`], picked once per broker or client. Two are provided:
//!
//! - [`JsonCodec`] (feature `json`, default). Compact JSON never contains a
//!   raw newline, so every envelope it produces is safe to frame.
//! - [`MsgPackCodec`] (feature `msgpack`). Smaller bodies, but binary: a
//!   body can contain the terminator byte, in which case sending the frame
//!   fails with [`ProtocolError::TerminatorInBody`].
//!
//! Both ends of a connection must use the same codec.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// Encodes envelopes to bytes and decodes them back.
///
/// `Send + Sync + 'static` because one codec instance is shared by every
/// connection task of a broker.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into a frame body.
    ///
    /// # Errors
    /// Returns an encode variant of [`ProtocolError`] if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes a frame body back into a value.
    ///
    /// # Errors
    /// Returns a decode variant of [`ProtocolError`] if the bytes are
    /// malformed or don't match the expected envelope.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ```rust
/// use pubwire_protocol::{Codec, JsonCodec, PublishMsg};
///
/// let codec = JsonCodec;
/// let msg = PublishMsg::new("prices", b"42".to_vec());
///
/// let bytes = codec.encode(&msg).unwrap();
/// let decoded: PublishMsg = codec.decode(&bytes).unwrap();
/// assert_eq!(msg, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

// ---------------------------------------------------------------------------
// MsgPackCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses MessagePack (via `rmp-serde`).
///
/// Structs are written as maps keyed by field name, so envelopes stay
/// readable by other MessagePack implementations.
#[cfg(feature = "msgpack")]
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgPackCodec;

#[cfg(feature = "msgpack")]
impl Codec for MsgPackCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        rmp_serde::to_vec_named(value).map_err(ProtocolError::MsgPackEncode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        rmp_serde::from_slice(data).map_err(ProtocolError::MsgPackDecode)
    }
}
