//! Error types for the protocol layer.
//!
//! Framing errors (`EmptyFrame`, `UnknownMessageType`) come from decoding
//! an inbound frame and are fatal for the connection that sent it. Body
//! errors (`Encode`, `Decode` and their MessagePack counterparts) are about
//! the envelope inside a frame and only affect that one frame.
//! `TerminatorInBody` is neither: it is raised on the sending side, before
//! anything reaches the wire, and only fails that one send.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The buffer handed to the decoder had no bytes at all.
    #[error("empty frame")]
    EmptyFrame,

    /// The type byte is not one of the six known message types.
    #[error("unknown message type: {0:#04x}")]
    UnknownMessageType(u8),

    /// The body contains the terminator byte, which would split the frame
    /// in two on the receiving side.
    #[error("frame body contains the terminator byte")]
    TerminatorInBody,

    /// JSON serialization of an envelope failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// JSON deserialization of a frame body failed.
    ///
    /// Common causes: a body produced by a different codec, missing
    /// fields, or a truncated frame.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// MessagePack serialization of an envelope failed.
    #[cfg(feature = "msgpack")]
    #[error("msgpack encode failed: {0}")]
    MsgPackEncode(rmp_serde::encode::Error),

    /// MessagePack deserialization of a frame body failed.
    #[cfg(feature = "msgpack")]
    #[error("msgpack decode failed: {0}")]
    MsgPackDecode(rmp_serde::decode::Error),
}

impl ProtocolError {
    /// Returns `true` for errors that make an inbound frame unreadable.
    ///
    /// These end the connection. Everything else is contained to the frame
    /// or send it occurred in.
    pub fn is_framing(&self) -> bool {
        matches!(self, Self::EmptyFrame | Self::UnknownMessageType(_))
    }
}
