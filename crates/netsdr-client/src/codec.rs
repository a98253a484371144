//! NetSDR control item encoding and inbound frame classification.
//!
//! Control messages share one layout on the TCP channel:
//!
//! ```text
//! [header: 2][item code: 2 LE][parameters...]
//! ```
//!
//! The header carries the total length and the message type (see
//! [`netsdr_core::frame`]). A bare two-byte message of type 0 from the
//! receiver is a NAK: the item is unsupported or the parameters were
//! rejected.
//!
//! All encoding/decoding in this module is pure -- no I/O is performed.

use bytes::{BufMut, BytesMut};
use netsdr_core::frame::{self, HEADER_LEN, MessageType};
use netsdr_core::{Error, Result};

/// Default IQ output sample rate sent during initialization.
pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 100_000;

/// Largest frequency the 40-bit frequency field can carry.
pub const MAX_FREQUENCY_HZ: u64 = 0xFF_FFFF_FFFF;

/// Bytes in the item code that follows the header.
const ITEM_CODE_LEN: usize = 2;

// ---------------------------------------------------------------------------
// Control items
// ---------------------------------------------------------------------------

/// Control item codes used by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlItem {
    /// 0x0018: run/stop the IQ data stream.
    ReceiverState,
    /// 0x0020: NCO frequency for one channel.
    ReceiverFrequency,
    /// 0x0044: RF filter selection.
    RfFilter,
    /// 0x008A: A/D converter dither and gain.
    AdModes,
    /// 0x00B8: IQ output sample rate.
    IqOutputSampleRate,
    /// Any other item code.
    Other(u16),
}

impl ControlItem {
    pub fn from_code(code: u16) -> Self {
        match code {
            0x0018 => ControlItem::ReceiverState,
            0x0020 => ControlItem::ReceiverFrequency,
            0x0044 => ControlItem::RfFilter,
            0x008A => ControlItem::AdModes,
            0x00B8 => ControlItem::IqOutputSampleRate,
            other => ControlItem::Other(other),
        }
    }

    pub fn code(self) -> u16 {
        match self {
            ControlItem::ReceiverState => 0x0018,
            ControlItem::ReceiverFrequency => 0x0020,
            ControlItem::RfFilter => 0x0044,
            ControlItem::AdModes => 0x008A,
            ControlItem::IqOutputSampleRate => 0x00B8,
            ControlItem::Other(code) => code,
        }
    }
}

/// The three commands sent, in this order, after the control connection
/// opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitCommand {
    SampleRate,
    RfFilter,
    AdModes,
}

impl InitCommand {
    /// Initialization order.
    pub const ALL: [InitCommand; 3] = [
        InitCommand::SampleRate,
        InitCommand::RfFilter,
        InitCommand::AdModes,
    ];

    /// The control item this command sets.
    pub fn item(self) -> ControlItem {
        match self {
            InitCommand::SampleRate => ControlItem::IqOutputSampleRate,
            InitCommand::RfFilter => ControlItem::RfFilter,
            InitCommand::AdModes => ControlItem::AdModes,
        }
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode a control item message.
///
/// # Example
///
/// ```
/// use netsdr_client::codec::{encode_control_item, ControlItem};
/// use netsdr_core::MessageType;
///
/// // Request the current receiver state.
/// let frame =
///     encode_control_item(MessageType::CurrentControlItem, ControlItem::ReceiverState, &[])
///         .unwrap();
/// assert_eq!(frame, vec![0x04, 0x20, 0x18, 0x00]);
/// ```
pub fn encode_control_item(
    message_type: MessageType,
    item: ControlItem,
    params: &[u8],
) -> Result<Vec<u8>> {
    if message_type.is_data_item() {
        return Err(Error::InvalidParameter(format!(
            "{:?} is not a control item message type",
            message_type
        )));
    }

    let length = HEADER_LEN + ITEM_CODE_LEN + params.len();
    let header = frame::encode_header(message_type, length)?;

    let mut buf = BytesMut::with_capacity(length);
    buf.put_slice(&header);
    buf.put_u16_le(item.code());
    buf.put_slice(params);
    Ok(buf.to_vec())
}

/// Build one of the initialization frames.
///
/// - sample rate: channel 0, 32-bit little-endian rate in Hz
/// - RF filter: channel 0, automatic selection
/// - A/D modes: channel 0, dither on, 1.5x gain
pub fn cmd_init(command: InitCommand, sample_rate_hz: u32) -> Result<Vec<u8>> {
    match command {
        InitCommand::SampleRate => {
            let mut params = [0u8; 5];
            params[1..].copy_from_slice(&sample_rate_hz.to_le_bytes());
            set_item(command.item(), &params)
        }
        InitCommand::RfFilter => set_item(command.item(), &[0x00, 0x00]),
        InitCommand::AdModes => set_item(command.item(), &[0x00, 0x03]),
    }
}

/// Start the IQ stream: complex data, run, 16-bit FIFO capture, one block.
pub fn cmd_start_iq() -> Result<Vec<u8>> {
    set_item(ControlItem::ReceiverState, &[0x80, 0x02, 0x01, 0x01])
}

/// Stop the IQ stream.
pub fn cmd_stop_iq() -> Result<Vec<u8>> {
    set_item(ControlItem::ReceiverState, &[0x00, 0x01, 0x00, 0x00])
}

/// Set the receiver frequency for one channel.
///
/// The frequency is sent as a 40-bit little-endian integer, so any value
/// up to [`MAX_FREQUENCY_HZ`] (about 1.1 THz) is accepted, including 0.
pub fn cmd_set_frequency(frequency_hz: u64, channel: u8) -> Result<Vec<u8>> {
    if frequency_hz > MAX_FREQUENCY_HZ {
        return Err(Error::InvalidParameter(format!(
            "frequency {} Hz exceeds the 40-bit field",
            frequency_hz
        )));
    }

    let mut params = [0u8; 6];
    params[0] = channel;
    params[1..].copy_from_slice(&frequency_hz.to_le_bytes()[..5]);
    set_item(ControlItem::ReceiverFrequency, &params)
}

fn set_item(item: ControlItem, params: &[u8]) -> Result<Vec<u8>> {
    encode_control_item(MessageType::SetControlItem, item, params)
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// A classified inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// The receiver rejected the last command.
    Nak,
    /// A control item response or unsolicited update.
    ControlItem {
        message_type: MessageType,
        item: ControlItem,
        params: Vec<u8>,
    },
    /// A data item (acknowledgement or sample data).
    DataItem {
        message_type: MessageType,
        payload: Vec<u8>,
    },
}

/// Classify one complete inbound message.
///
/// The buffer must hold exactly the number of bytes its header declares.
pub fn classify(data: &[u8]) -> Result<InboundFrame> {
    if data.len() < HEADER_LEN {
        return Err(Error::Protocol(format!(
            "message too short: {} bytes",
            data.len()
        )));
    }

    let header = frame::decode_header([data[0], data[1]])?;
    if header.length != data.len() {
        return Err(Error::Protocol(format!(
            "header declares {} bytes, got {}",
            header.length,
            data.len()
        )));
    }

    let body = &data[HEADER_LEN..];

    if header.message_type.is_data_item() || header.message_type == MessageType::DataItemAck {
        return Ok(InboundFrame::DataItem {
            message_type: header.message_type,
            payload: body.to_vec(),
        });
    }

    if body.is_empty() {
        if header.message_type == MessageType::SetControlItem {
            return Ok(InboundFrame::Nak);
        }
        return Err(Error::Protocol(format!(
            "{:?} message without item code",
            header.message_type
        )));
    }

    if body.len() < ITEM_CODE_LEN {
        return Err(Error::Protocol("truncated item code".into()));
    }

    Ok(InboundFrame::ControlItem {
        message_type: header.message_type,
        item: ControlItem::from_code(u16::from_le_bytes([body[0], body[1]])),
        params: body[ITEM_CODE_LEN..].to_vec(),
    })
}

/// Check that `response` answers a set of `expected`.
///
/// The receiver echoes a successful set as a type-0 message with the same
/// item code. Anything else is reported as [`Error::UnexpectedResponse`].
pub fn check_response(expected: ControlItem, response: &[u8]) -> Result<()> {
    let classified = classify(response)
        .map_err(|e| Error::UnexpectedResponse(format!("unparseable response: {}", e)))?;

    match classified {
        InboundFrame::ControlItem {
            message_type: MessageType::SetControlItem,
            item,
            ..
        } if item == expected => Ok(()),
        InboundFrame::Nak => Err(Error::UnexpectedResponse(format!(
            "NAK for item 0x{:04X}",
            expected.code()
        ))),
        other => Err(Error::UnexpectedResponse(format!(
            "expected item 0x{:04X}, got {:?}",
            expected.code(),
            other
        ))),
    }
}
