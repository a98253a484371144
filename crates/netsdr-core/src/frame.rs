//! NetSDR message header.
//!
//! Every NetSDR message, on both the TCP control channel and the UDP data
//! channel, starts with a 16-bit little-endian header word:
//!
//! ```text
//!  15 14 13 12 11 10  9  8  7  6  5  4  3  2  1  0
//! [ type  ][            total length              ]
//! ```
//!
//! The length counts the header itself. Data item messages longer than the
//! 13-bit field can express (8194 bytes) are sent with a length of zero.
//!
//! This module is shared by the command codec and the TCP framer; it does
//! no I/O.

use crate::error::{Error, Result};

/// Size of the header word in bytes.
pub const HEADER_LEN: usize = 2;

/// Largest length the 13-bit field can carry.
pub const MAX_FIELD_LEN: usize = 0x1FFF;

/// Length of a data item message sent with a zero length field.
pub const LARGE_DATA_ITEM_LEN: usize = 8194;

/// 3-bit message type.
///
/// The receiver reuses the host codes on the way back: type 0 carries the
/// response to a set or request, type 1 an unsolicited control item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    SetControlItem,
    CurrentControlItem,
    ControlItemRange,
    DataItemAck,
    DataItem0,
    DataItem1,
    DataItem2,
    DataItem3,
}

impl MessageType {
    /// Decode the top three bits of a header word.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0 => MessageType::SetControlItem,
            1 => MessageType::CurrentControlItem,
            2 => MessageType::ControlItemRange,
            3 => MessageType::DataItemAck,
            4 => MessageType::DataItem0,
            5 => MessageType::DataItem1,
            6 => MessageType::DataItem2,
            _ => MessageType::DataItem3,
        }
    }

    /// The 3-bit wire value.
    pub fn bits(self) -> u8 {
        match self {
            MessageType::SetControlItem => 0,
            MessageType::CurrentControlItem => 1,
            MessageType::ControlItemRange => 2,
            MessageType::DataItemAck => 3,
            MessageType::DataItem0 => 4,
            MessageType::DataItem1 => 5,
            MessageType::DataItem2 => 6,
            MessageType::DataItem3 => 7,
        }
    }

    /// Whether this type carries a data item rather than a control item.
    pub fn is_data_item(self) -> bool {
        self.bits() >= 4
    }
}

/// A decoded header word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub message_type: MessageType,
    /// Total message length in bytes, header included.
    pub length: usize,
}

/// Encode a header word for a message of `length` total bytes.
///
/// # Example
///
/// ```
/// use netsdr_core::frame::{encode_header, MessageType};
///
/// // Set-frequency message: 2 header + 2 item code + 6 parameter bytes.
/// let header = encode_header(MessageType::SetControlItem, 10).unwrap();
/// assert_eq!(header, [0x0A, 0x00]);
/// ```
pub fn encode_header(message_type: MessageType, length: usize) -> Result<[u8; 2]> {
    let field = if message_type.is_data_item() && length == LARGE_DATA_ITEM_LEN {
        0
    } else if (HEADER_LEN..=MAX_FIELD_LEN).contains(&length) {
        length as u16
    } else {
        return Err(Error::InvalidParameter(format!(
            "message length {} out of range for {:?}",
            length, message_type
        )));
    };

    let word = field | (u16::from(message_type.bits()) << 13);
    Ok(word.to_le_bytes())
}

/// Decode a header word.
pub fn decode_header(bytes: [u8; 2]) -> Result<FrameHeader> {
    let word = u16::from_le_bytes(bytes);
    let message_type = MessageType::from_bits((word >> 13) as u8);
    let field = (word & 0x1FFF) as usize;

    let length = match field {
        0 if message_type.is_data_item() => LARGE_DATA_ITEM_LEN,
        n if n < HEADER_LEN => {
            return Err(Error::Protocol(format!(
                "header length {} shorter than the header itself",
                n
            )));
        }
        n => n,
    };

    Ok(FrameHeader {
        message_type,
        length,
    })
}

/// Length of the first complete message in `buf`, if one is buffered.
///
/// Returns `Ok(None)` when more bytes are needed. Used to split the TCP
/// byte stream into one notification per message.
pub fn next_frame_len(buf: &[u8]) -> Result<Option<usize>> {
    if buf.len() < HEADER_LEN {
        return Ok(None);
    }
    let header = decode_header([buf[0], buf[1]])?;
    if buf.len() < header.length {
        Ok(None)
    } else {
        Ok(Some(header.length))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_bits_are_symmetric() {
        for bits in 0..8u8 {
            assert_eq!(MessageType::from_bits(bits).bits(), bits);
        }
    }

    #[test]
    fn data_item_types() {
        assert!(!MessageType::SetControlItem.is_data_item());
        assert!(!MessageType::DataItemAck.is_data_item());
        assert!(MessageType::DataItem0.is_data_item());
        assert!(MessageType::DataItem3.is_data_item());
    }

    #[test]
    fn encode_set_control_item() {
        assert_eq!(
            encode_header(MessageType::SetControlItem, 8).unwrap(),
            [0x08, 0x00]
        );
    }

    #[test]
    fn encode_request_type_sets_high_bits() {
        // Type 1 -> 0x2000.
        assert_eq!(
            encode_header(MessageType::CurrentControlItem, 4).unwrap(),
            [0x04, 0x20]
        );
    }

    #[test]
    fn encode_data_item_1028() {
        // 16-bit IQ packet: 2 header + 2 sequence + 1024 samples bytes.
        assert_eq!(
            encode_header(MessageType::DataItem0, 1028).unwrap(),
            [0x04, 0x84]
        );
    }

    #[test]
    fn encode_large_data_item_uses_zero_length() {
        assert_eq!(
            encode_header(MessageType::DataItem0, LARGE_DATA_ITEM_LEN).unwrap(),
            [0x00, 0x80]
        );
    }

    #[test]
    fn encode_rejects_oversized_control_item() {
        let result = encode_header(MessageType::SetControlItem, LARGE_DATA_ITEM_LEN);
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn encode_rejects_length_below_header() {
        let result = encode_header(MessageType::SetControlItem, 1);
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn decode_nak() {
        let header = decode_header([0x02, 0x00]).unwrap();
        assert_eq!(header.message_type, MessageType::SetControlItem);
        assert_eq!(header.length, 2);
    }

    #[test]
    fn decode_large_data_item() {
        let header = decode_header([0x00, 0x80]).unwrap();
        assert_eq!(header.message_type, MessageType::DataItem0);
        assert_eq!(header.length, LARGE_DATA_ITEM_LEN);
    }

    #[test]
    fn decode_zero_length_control_item_is_error() {
        assert!(matches!(
            decode_header([0x00, 0x00]),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn next_frame_len_needs_header() {
        assert_eq!(next_frame_len(&[]).unwrap(), None);
        assert_eq!(next_frame_len(&[0x08]).unwrap(), None);
    }

    #[test]
    fn next_frame_len_partial_body() {
        assert_eq!(next_frame_len(&[0x08, 0x00, 0x18, 0x00]).unwrap(), None);
    }

    #[test]
    fn next_frame_len_complete_with_trailing_bytes() {
        let buf = [0x05, 0x00, 0x18, 0x00, 0x80, 0x02, 0x00];
        assert_eq!(next_frame_len(&buf).unwrap(), Some(5));
    }
}
