//! Wire Framing
//!
//! Every packet travels as a 5-byte header (type byte plus little-endian
//! payload length) followed by the bincode payload. The decoder is
//! restartable: it consumes nothing from its buffer until a complete frame
//! has arrived, so TCP fragmentation never corrupts the stream.

use thiserror::Error;

use crate::network::protocol::{Packet, PacketType};

/// Frame header size: 1 type byte + 4 length bytes.
pub const HEADER_SIZE: usize = 5;

/// Hard ceiling on payload length. A header advertising more is treated as
/// a corrupt or hostile stream and the connection is closed.
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024;

// =============================================================================
// ERRORS
// =============================================================================

/// Framing and serialization failures.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Header advertises a payload beyond [`MAX_PAYLOAD_SIZE`].
    #[error("payload of {size} bytes exceeds the {limit}-byte limit")]
    PayloadTooLarge {
        /// Advertised payload length.
        size: usize,
        /// The configured ceiling.
        limit: usize,
    },

    /// Header carries a discriminant outside the known packet set.
    #[error("unknown packet type {0:#04x}")]
    UnknownPacketType(u8),

    /// Payload bytes did not deserialize as the advertised packet.
    #[error("malformed {kind:?} payload: {source}")]
    MalformedPayload {
        /// Discriminant from the frame header.
        kind: PacketType,
        /// Underlying decode failure.
        #[source]
        source: bincode::Error,
    },

    /// Packet could not be serialized for sending.
    #[error("packet serialization failed: {0}")]
    Serialize(#[from] bincode::Error),
}

impl CodecError {
    /// Whether the stream can no longer be trusted and the connection
    /// should close. Non-fatal errors consume exactly one frame; the
    /// caller may log and keep reading.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CodecError::PayloadTooLarge { .. } | CodecError::Serialize(_)
        )
    }
}

// =============================================================================
// ENCODING
// =============================================================================

/// Serialize a packet into a single ready-to-send frame.
pub fn encode_packet(packet: &Packet) -> Result<Vec<u8>, CodecError> {
    let payload = packet.payload_bytes()?;
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(CodecError::PayloadTooLarge {
            size: payload.len(),
            limit: MAX_PAYLOAD_SIZE,
        });
    }

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.push(packet.packet_type() as u8);
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

// =============================================================================
// DECODING
// =============================================================================

/// Incremental frame decoder over a byte stream.
///
/// Feed raw reads with [`FrameDecoder::extend`], then drain complete
/// packets with [`FrameDecoder::next_packet`] until it returns `Ok(None)`.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append freshly read bytes.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes currently buffered but not yet consumed.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Try to decode the next complete frame.
    ///
    /// `Ok(None)` means more bytes are needed; the buffer is untouched.
    /// An error consumes the offending frame unless
    /// [`CodecError::is_fatal`] says the stream is beyond recovery.
    pub fn next_packet(&mut self) -> Result<Option<Packet>, CodecError> {
        if self.buf.len() < HEADER_SIZE {
            return Ok(None);
        }

        let raw_kind = self.buf[0];
        let len_bytes: [u8; 4] = [self.buf[1], self.buf[2], self.buf[3], self.buf[4]];
        let payload_len = u32::from_le_bytes(len_bytes) as usize;

        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(CodecError::PayloadTooLarge {
                size: payload_len,
                limit: MAX_PAYLOAD_SIZE,
            });
        }

        let total = HEADER_SIZE + payload_len;
        if self.buf.len() < total {
            return Ok(None);
        }

        let kind = match PacketType::from_u8(raw_kind) {
            Some(kind) => kind,
            None => {
                // Length is trusted, so the frame can be skipped whole.
                self.buf.drain(..total);
                return Err(CodecError::UnknownPacketType(raw_kind));
            }
        };

        let result = Packet::from_payload(kind, &self.buf[HEADER_SIZE..total]);
        self.buf.drain(..total);
        match result {
            Ok(packet) => Ok(Some(packet)),
            Err(source) => Err(CodecError::MalformedPayload { kind, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::board::{PlayerId, Position};
    use crate::network::protocol::{MoveRequest, ServerHello, PROTOCOL_VERSION};
    use proptest::prelude::*;

    fn hello() -> Packet {
        Packet::ServerHello(ServerHello {
            protocol_version: PROTOCOL_VERSION,
            player_id: PlayerId::new(1),
        })
    }

    fn move_req(x: u8, y: u8) -> Packet {
        Packet::MoveRequest(MoveRequest {
            pos: Position::new(x, y),
        })
    }

    #[test]
    fn test_header_layout() {
        let frame = encode_packet(&move_req(2, 1)).unwrap();
        assert_eq!(frame[0], PacketType::MoveRequest as u8);
        let len = u32::from_le_bytes([frame[1], frame[2], frame[3], frame[4]]) as usize;
        assert_eq!(frame.len(), HEADER_SIZE + len);
    }

    #[test]
    fn test_decode_across_fragments() {
        let frame = encode_packet(&hello()).unwrap();
        let mut decoder = FrameDecoder::new();

        // Header alone is not enough.
        decoder.extend(&frame[..3]);
        assert!(decoder.next_packet().unwrap().is_none());
        decoder.extend(&frame[3..HEADER_SIZE]);
        assert!(decoder.next_packet().unwrap().is_none());
        assert_eq!(decoder.buffered(), HEADER_SIZE);

        decoder.extend(&frame[HEADER_SIZE..]);
        assert_eq!(decoder.next_packet().unwrap(), Some(hello()));
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_back_to_back_frames() {
        let mut bytes = encode_packet(&move_req(0, 0)).unwrap();
        bytes.extend(encode_packet(&move_req(1, 1)).unwrap());
        bytes.extend(encode_packet(&Packet::BackToGameRoom).unwrap());

        let mut decoder = FrameDecoder::new();
        decoder.extend(&bytes);
        assert_eq!(decoder.next_packet().unwrap(), Some(move_req(0, 0)));
        assert_eq!(decoder.next_packet().unwrap(), Some(move_req(1, 1)));
        assert_eq!(decoder.next_packet().unwrap(), Some(Packet::BackToGameRoom));
        assert!(decoder.next_packet().unwrap().is_none());
    }

    #[test]
    fn test_oversize_frame_is_fatal() {
        let mut header = vec![PacketType::MoveRequest as u8];
        header.extend(((MAX_PAYLOAD_SIZE + 1) as u32).to_le_bytes());

        let mut decoder = FrameDecoder::new();
        decoder.extend(&header);
        let err = decoder.next_packet().unwrap_err();
        assert!(matches!(err, CodecError::PayloadTooLarge { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_unknown_type_skips_one_frame() {
        let mut bytes = vec![0xEEu8];
        bytes.extend(3u32.to_le_bytes());
        bytes.extend([1, 2, 3]);
        bytes.extend(encode_packet(&move_req(2, 2)).unwrap());

        let mut decoder = FrameDecoder::new();
        decoder.extend(&bytes);
        let err = decoder.next_packet().unwrap_err();
        assert!(matches!(err, CodecError::UnknownPacketType(0xEE)));
        assert!(!err.is_fatal());

        // The stream recovers at the next frame boundary.
        assert_eq!(decoder.next_packet().unwrap(), Some(move_req(2, 2)));
    }

    #[test]
    fn test_malformed_payload_skips_one_frame() {
        // A ServerHello payload needs three bytes; one is not enough.
        let mut bytes = vec![PacketType::ServerHello as u8];
        bytes.extend(1u32.to_le_bytes());
        bytes.push(7);
        bytes.extend(encode_packet(&hello()).unwrap());

        let mut decoder = FrameDecoder::new();
        decoder.extend(&bytes);
        let err = decoder.next_packet().unwrap_err();
        assert!(matches!(
            err,
            CodecError::MalformedPayload {
                kind: PacketType::ServerHello,
                ..
            }
        ));
        assert!(!err.is_fatal());
        assert_eq!(decoder.next_packet().unwrap(), Some(hello()));
    }

    proptest! {
        #[test]
        fn prop_fragmentation_never_reorders(splits in prop::collection::vec(0usize..64, 0..8)) {
            let packets = vec![
                hello(),
                move_req(3, 4),
                Packet::BackToGameRoom,
                move_req(0, 31),
            ];
            let mut bytes = Vec::new();
            for packet in &packets {
                bytes.extend(encode_packet(packet).unwrap());
            }

            // Cut the byte stream at arbitrary points and feed the pieces.
            let mut cuts: Vec<usize> = splits
                .into_iter()
                .map(|s| s % (bytes.len() + 1))
                .collect();
            cuts.push(bytes.len());
            cuts.sort_unstable();

            let mut decoder = FrameDecoder::new();
            let mut decoded = Vec::new();
            let mut start = 0;
            for cut in cuts {
                decoder.extend(&bytes[start..cut]);
                start = cut;
                while let Some(packet) = decoder.next_packet().unwrap() {
                    decoded.push(packet);
                }
            }
            prop_assert_eq!(decoded, packets);
        }

        #[test]
        fn prop_garbage_input_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
            let mut decoder = FrameDecoder::new();
            decoder.extend(&bytes);
            loop {
                match decoder.next_packet() {
                    Ok(Some(_)) => {}
                    Ok(None) => break,
                    Err(err) if err.is_fatal() => break,
                    Err(_) => {}
                }
            }
        }
    }
}
