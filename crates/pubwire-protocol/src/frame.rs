//! Frame codec: the outer layer of the wire protocol.
//!
//! Every unit on the wire is one frame:
//!
//! ```text
//! ┌───────────┬──────────────────────┬────────────┐
//! │ type (1B) │ body (0..n bytes)    │ 0x0A (1B)  │
//! └───────────┴──────────────────────┴────────────┘
//! ```
//!
//! There is no length prefix and no escaping. The receiver reads up to the
//! first terminator, so a body must never contain [`TERMINATOR`] itself;
//! [`encode`] refuses such bodies instead of emitting a frame that would be
//! split in two on the other side.

use std::fmt;

use crate::ProtocolError;

/// Byte that ends every frame (`\n`).
pub const TERMINATOR: u8 = 0x0A;

/// The six message types understood by both sides.
///
/// `#[repr(u8)]` pins each variant to its wire byte, so `kind as u8` is the
/// value that goes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Client → server. Empty body.
    Connect = 0x01,
    /// Client → server. Body: [`SubscribeMsg`](crate::SubscribeMsg).
    Subscribe = 0x02,
    /// Both directions. Body: [`PublishMsg`](crate::PublishMsg).
    Publish = 0x03,
    /// Client → server to leave a topic; server → client to end a
    /// subscription. Body: [`UnsubscribeMsg`](crate::UnsubscribeMsg).
    Unsubscribe = 0x04,
    /// Either direction. Application-defined body.
    Close = 0x05,
    /// Server → client acknowledgement that a frame was processed.
    /// Empty body.
    Ok = 0x06,
}

impl MessageType {
    /// All message types, in wire order.
    pub const ALL: [MessageType; 6] = [
        MessageType::Connect,
        MessageType::Subscribe,
        MessageType::Publish,
        MessageType::Unsubscribe,
        MessageType::Close,
        MessageType::Ok,
    ];
}

impl TryFrom<u8> for MessageType {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0x01 => Ok(Self::Connect),
            0x02 => Ok(Self::Subscribe),
            0x03 => Ok(Self::Publish),
            0x04 => Ok(Self::Unsubscribe),
            0x05 => Ok(Self::Close),
            0x06 => Ok(Self::Ok),
            other => Err(ProtocolError::UnknownMessageType(other)),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(kind: MessageType) -> Self {
        kind as u8
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connect => "Connect",
            Self::Subscribe => "Subscribe",
            Self::Publish => "Publish",
            Self::Unsubscribe => "Unsubscribe",
            Self::Close => "Close",
            Self::Ok => "Ok",
        };
        f.write_str(name)
    }
}

/// One decoded protocol unit: a message type and its opaque body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: MessageType,
    pub body: Vec<u8>,
}

impl Frame {
    /// Creates a frame from a type and a body.
    pub fn new(kind: MessageType, body: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            body: body.into(),
        }
    }

    /// An empty-bodied `Connect` frame.
    pub fn connect() -> Self {
        Self::new(MessageType::Connect, Vec::new())
    }

    /// A `Subscribe` frame around an already-encoded body.
    pub fn subscribe(body: impl Into<Vec<u8>>) -> Self {
        Self::new(MessageType::Subscribe, body)
    }

    /// A `Publish` frame around an already-encoded body.
    pub fn publish(body: impl Into<Vec<u8>>) -> Self {
        Self::new(MessageType::Publish, body)
    }

    /// An `Unsubscribe` frame around an already-encoded body.
    pub fn unsubscribe(body: impl Into<Vec<u8>>) -> Self {
        Self::new(MessageType::Unsubscribe, body)
    }

    /// A `Close` frame with an application-defined body.
    pub fn close(body: impl Into<Vec<u8>>) -> Self {
        Self::new(MessageType::Close, body)
    }

    /// An empty-bodied `Ok` acknowledgement.
    pub fn ok() -> Self {
        Self::new(MessageType::Ok, Vec::new())
    }

    /// Encodes this frame into its wire form.
    ///
    /// # Errors
    /// Returns [`ProtocolError::TerminatorInBody`] if the body contains
    /// [`TERMINATOR`].
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        encode(self.kind.into(), &self.body)
    }

    /// Decodes a frame from its wire form. See [`decode`].
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        decode(buf)
    }
}

/// Decodes one frame from a buffer, typically a line handed over by the
/// transport's reader with the terminator still attached.
///
/// The first byte is the type. A buffer shorter than two bytes has an empty
/// body; otherwise the body is everything after the type byte, minus the
/// trailing terminator when one is present.
///
/// # Errors
/// - [`ProtocolError::EmptyFrame`] for an empty buffer
/// - [`ProtocolError::UnknownMessageType`] for a type byte outside `0x01..=0x06`
pub fn decode(buf: &[u8]) -> Result<Frame, ProtocolError> {
    let (&type_byte, rest) =
        buf.split_first().ok_or(ProtocolError::EmptyFrame)?;

    let body = match rest.split_last() {
        Some((&TERMINATOR, body)) => body,
        _ => rest,
    };

    let kind = MessageType::try_from(type_byte)?;
    Ok(Frame::new(kind, body))
}

/// Encodes a raw type byte and a body into a frame buffer.
///
/// The buffer is assembled first and the type validated afterwards; an
/// invalid type discards the assembled buffer.
///
/// # Errors
/// - [`ProtocolError::UnknownMessageType`] for a type byte outside `0x01..=0x06`
/// - [`ProtocolError::TerminatorInBody`] if `body` contains [`TERMINATOR`]
pub fn encode(type_byte: u8, body: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = Vec::with_capacity(body.len() + 2);
    buf.push(type_byte);
    buf.extend_from_slice(body);
    buf.push(TERMINATOR);

    MessageType::try_from(type_byte)?;

    if body.contains(&TERMINATOR) {
        return Err(ProtocolError::TerminatorInBody);
    }

    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    // =====================================================================
    // encode()
    // =====================================================================

    #[test]
    fn test_encode_lays_out_type_body_terminator() {
        let buf = encode(0x03, b"abc").expect("valid frame");
        assert_eq!(buf, vec![0x03, b'a', b'b', b'c', 0x0A]);
    }

    #[test]
    fn test_encode_empty_body_is_two_bytes() {
        let buf = encode(0x06, b"").expect("valid frame");
        assert_eq!(buf, vec![0x06, 0x0A]);
    }

    #[test]
    fn test_encode_unknown_type_is_rejected() {
        for byte in [0x00, 0x07, 0x0A, 0xFF] {
            let result = encode(byte, b"body");
            assert!(
                matches!(result, Err(ProtocolError::UnknownMessageType(b)) if b == byte),
                "type {byte:#04x} should be rejected"
            );
        }
    }

    #[test]
    fn test_encode_body_with_terminator_is_rejected() {
        let result = encode(0x03, b"line one\nline two");
        assert!(matches!(result, Err(ProtocolError::TerminatorInBody)));
    }

    // =====================================================================
    // decode()
    // =====================================================================

    #[test]
    fn test_decode_empty_buffer_is_rejected() {
        assert!(matches!(decode(&[]), Err(ProtocolError::EmptyFrame)));
    }

    #[test]
    fn test_decode_single_byte_has_empty_body() {
        let frame = decode(&[0x06]).expect("valid frame");
        assert_eq!(frame.kind, MessageType::Ok);
        assert!(frame.body.is_empty());
    }

    #[test]
    fn test_decode_type_and_terminator_has_empty_body() {
        let frame = decode(&[0x01, 0x0A]).expect("valid frame");
        assert_eq!(frame, Frame::connect());
    }

    #[test]
    fn test_decode_strips_trailing_terminator() {
        let frame = decode(&[0x05, b'b', b'y', b'e', 0x0A]).unwrap();
        assert_eq!(frame.kind, MessageType::Close);
        assert_eq!(frame.body, b"bye");
    }

    #[test]
    fn test_decode_unknown_type_is_rejected() {
        for byte in [0x00, 0x07, 0x42, 0xFF] {
            let result = decode(&[byte, b'x', 0x0A]);
            assert!(
                matches!(result, Err(ProtocolError::UnknownMessageType(b)) if b == byte),
                "type {byte:#04x} should be rejected"
            );
        }
    }

    // =====================================================================
    // Round trip
    // =====================================================================

    #[test]
    fn test_round_trip_every_type_preserves_type_and_body() {
        let bodies: [&[u8]; 4] = [b"", b"x", b"{\"topic\":\"prices\"}", &[0x00, 0xFF, 0x0B, 0x09]];

        for kind in MessageType::ALL {
            for body in bodies {
                let buf = encode(kind.into(), body).expect("encodable");
                let frame = decode(&buf).expect("decodable");
                assert_eq!(frame.kind, kind);
                assert_eq!(frame.body, body);
            }
        }
    }

    #[test]
    fn test_frame_encode_matches_free_function() {
        let frame = Frame::publish(b"payload".to_vec());
        assert_eq!(frame.encode().unwrap(), encode(0x03, b"payload").unwrap());
        assert_eq!(Frame::decode(&frame.encode().unwrap()).unwrap(), frame);
    }

    // =====================================================================
    // MessageType
    // =====================================================================

    #[test]
    fn test_message_type_wire_bytes() {
        let bytes: Vec<u8> = MessageType::ALL.iter().map(|k| u8::from(*k)).collect();
        assert_eq!(bytes, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_message_type_display() {
        assert_eq!(MessageType::Unsubscribe.to_string(), "Unsubscribe");
        assert_eq!(MessageType::Ok.to_string(), "Ok");
    }
}
