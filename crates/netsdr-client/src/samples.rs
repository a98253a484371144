//! IQ sample data items received on the UDP channel.
//!
//! Each datagram is one data item message:
//!
//! ```text
//! [header: 2][sequence: 2 LE][I0 Q0 I1 Q1 ... as i16 LE]
//! ```
//!
//! The sequence number increments per datagram and wraps from 65535 to 1;
//! zero is only sent by the first packet after the stream starts.

use bytes::Bytes;
use netsdr_core::frame::{self, HEADER_LEN, MessageType};
use netsdr_core::{Error, Result};
use tokio::sync::mpsc;

const SEQUENCE_LEN: usize = 2;

/// Bytes per complex 16-bit sample.
const SAMPLE_LEN: usize = 4;

/// Distinct nonzero sequence numbers (1..=65535).
const SEQUENCE_RING: u32 = u16::MAX as u32;

/// How far behind the newest sequence a datagram may arrive and still be
/// taken as late rather than as a jump forward.
const REORDER_WINDOW: u32 = 1024;

/// One complex sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IqSample {
    pub i: i16,
    pub q: i16,
}

/// A parsed IQ data item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IqPacket {
    pub message_type: MessageType,
    pub sequence: u16,
    pub samples: Vec<IqSample>,
}

/// Parse one UDP datagram into an [`IqPacket`].
pub fn parse_iq_packet(data: &[u8]) -> Result<IqPacket> {
    if data.len() < HEADER_LEN + SEQUENCE_LEN {
        return Err(Error::Protocol(format!(
            "IQ datagram too short: {} bytes",
            data.len()
        )));
    }

    let header = frame::decode_header([data[0], data[1]])?;
    if !header.message_type.is_data_item() {
        return Err(Error::Protocol(format!(
            "expected a data item, got {:?}",
            header.message_type
        )));
    }
    if header.length != data.len() {
        return Err(Error::Protocol(format!(
            "IQ header declares {} bytes, datagram has {}",
            header.length,
            data.len()
        )));
    }

    let sequence = u16::from_le_bytes([data[2], data[3]]);
    let body = &data[HEADER_LEN + SEQUENCE_LEN..];
    if body.len() % SAMPLE_LEN != 0 {
        return Err(Error::Protocol(format!(
            "IQ payload of {} bytes is not a whole number of samples",
            body.len()
        )));
    }

    let samples = body
        .chunks_exact(SAMPLE_LEN)
        .map(|c| IqSample {
            i: i16::from_le_bytes([c[0], c[1]]),
            q: i16::from_le_bytes([c[2], c[3]]),
        })
        .collect();

    Ok(IqPacket {
        message_type: header.message_type,
        sequence,
        samples,
    })
}

/// The sequence number that should follow `sequence`.
pub fn next_sequence(sequence: u16) -> u16 {
    match sequence {
        u16::MAX => 1,
        n => n + 1,
    }
}

/// Steps from `from` forward to `to` on the 1..=65535 ring.
///
/// Zero sits just before 1, so the distance from 0 to `n` is `n`.
fn forward_distance(from: u16, to: u16) -> u32 {
    let (from, to) = (u32::from(from), u32::from(to));
    if from == 0 {
        to
    } else {
        (to + SEQUENCE_RING - from) % SEQUENCE_RING
    }
}

/// Counts datagrams lost between consecutive sequence numbers.
///
/// Duplicates and datagrams arriving up to [`REORDER_WINDOW`] behind the
/// newest one count as nothing and do not move the tracker back.
#[derive(Debug, Clone, Default)]
pub struct SequenceTracker {
    last: Option<u16>,
    lost: u64,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a received sequence number and return how many datagrams
    /// were skipped since the previous one.
    pub fn observe(&mut self, sequence: u16) -> u64 {
        let gap = match self.last {
            // A zero restarts the count (stream restarted).
            _ if sequence == 0 => 0,
            None => 0,
            Some(last) => {
                let distance = forward_distance(last, sequence);
                if distance == 0 || distance > SEQUENCE_RING - REORDER_WINDOW {
                    tracing::trace!(sequence, last, "Duplicate or late IQ datagram");
                    return 0;
                }
                u64::from(distance - 1)
            }
        };
        self.last = Some(sequence);
        self.lost += gap;
        gap
    }

    /// Total datagrams lost so far.
    pub fn lost(&self) -> u64 {
        self.lost
    }
}

/// Receiving end of the IQ stream.
///
/// Wraps the raw datagram channel of the UDP transport, parses each
/// datagram, and tracks sequence gaps.
pub struct IqReceiver {
    datagrams: mpsc::Receiver<Bytes>,
    tracker: SequenceTracker,
}

impl IqReceiver {
    pub fn new(datagrams: mpsc::Receiver<Bytes>) -> Self {
        Self {
            datagrams,
            tracker: SequenceTracker::new(),
        }
    }

    /// Wait for the next packet.
    ///
    /// Returns `None` once the transport side of the channel is gone.
    /// Malformed datagrams are returned as errors and do not end the stream.
    pub async fn recv(&mut self) -> Option<Result<IqPacket>> {
        let datagram = self.datagrams.recv().await?;
        Some(parse_iq_packet(&datagram).map(|packet| {
            let gap = self.tracker.observe(packet.sequence);
            if gap > 0 {
                tracing::debug!(
                    sequence = packet.sequence,
                    lost = gap,
                    "IQ datagrams lost"
                );
            }
            packet
        }))
    }

    /// Datagrams lost so far, judging by sequence numbers.
    pub fn lost(&self) -> u64 {
        self.tracker.lost()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn datagram(sequence: u16, samples: &[(i16, i16)]) -> Vec<u8> {
        let length = HEADER_LEN + SEQUENCE_LEN + samples.len() * SAMPLE_LEN;
        let mut buf = frame::encode_header(MessageType::DataItem0, length)
            .unwrap()
            .to_vec();
        buf.extend_from_slice(&sequence.to_le_bytes());
        for (i, q) in samples {
            buf.extend_from_slice(&i.to_le_bytes());
            buf.extend_from_slice(&q.to_le_bytes());
        }
        buf
    }

    #[test]
    fn parse_two_samples() {
        let data = datagram(7, &[(1, -1), (i16::MAX, i16::MIN)]);
        let packet = parse_iq_packet(&data).unwrap();
        assert_eq!(packet.message_type, MessageType::DataItem0);
        assert_eq!(packet.sequence, 7);
        assert_eq!(
            packet.samples,
            vec![
                IqSample { i: 1, q: -1 },
                IqSample {
                    i: i16::MAX,
                    q: i16::MIN
                }
            ]
        );
    }

    #[test]
    fn parse_empty_payload() {
        let packet = parse_iq_packet(&datagram(1, &[])).unwrap();
        assert!(packet.samples.is_empty());
    }

    #[test]
    fn parse_standard_1028_byte_packet() {
        let samples = vec![(0i16, 0i16); 256];
        let data = datagram(42, &samples);
        assert_eq!(data.len(), 1028);
        assert_eq!(&data[..2], &[0x04, 0x84]);
        assert_eq!(parse_iq_packet(&data).unwrap().samples.len(), 256);
    }

    #[test]
    fn parse_rejects_control_item() {
        let data = [0x04, 0x00, 0x18, 0x00];
        assert!(matches!(parse_iq_packet(&data), Err(Error::Protocol(_))));
    }

    #[test]
    fn parse_rejects_length_mismatch() {
        let mut data = datagram(1, &[(1, 1)]);
        data.push(0);
        assert!(matches!(parse_iq_packet(&data), Err(Error::Protocol(_))));
    }

    #[test]
    fn parse_rejects_partial_sample() {
        // Header says 7 bytes: 2 header + 2 sequence + 3 sample bytes.
        let data = [0x07, 0x80, 0x01, 0x00, 0x01, 0x02, 0x03];
        assert!(matches!(parse_iq_packet(&data), Err(Error::Protocol(_))));
    }

    #[test]
    fn parse_rejects_short_datagram() {
        assert!(matches!(
            parse_iq_packet(&[0x04, 0x80, 0x01]),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn next_sequence_skips_zero_on_wrap() {
        assert_eq!(next_sequence(0), 1);
        assert_eq!(next_sequence(41), 42);
        assert_eq!(next_sequence(u16::MAX), 1);
    }

    #[test]
    fn tracker_counts_gaps() {
        let mut tracker = SequenceTracker::new();
        assert_eq!(tracker.observe(0), 0);
        assert_eq!(tracker.observe(1), 0);
        assert_eq!(tracker.observe(4), 2);
        assert_eq!(tracker.observe(5), 0);
        assert_eq!(tracker.lost(), 2);
    }

    #[test]
    fn tracker_handles_wrap() {
        let mut tracker = SequenceTracker::new();
        tracker.observe(u16::MAX - 1);
        assert_eq!(tracker.observe(u16::MAX), 0);
        assert_eq!(tracker.observe(1), 0);
        assert_eq!(tracker.observe(3), 1);
    }

    #[test]
    fn tracker_zero_restarts() {
        let mut tracker = SequenceTracker::new();
        tracker.observe(100);
        assert_eq!(tracker.observe(0), 0);
        assert_eq!(tracker.observe(1), 0);
        assert_eq!(tracker.lost(), 0);
    }

    #[test]
    fn tracker_ignores_duplicates_and_late_datagrams() {
        let mut tracker = SequenceTracker::new();
        assert_eq!(tracker.observe(10), 0);
        assert_eq!(tracker.observe(11), 0);
        assert_eq!(tracker.observe(11), 0);
        assert_eq!(tracker.observe(10), 0);
        assert_eq!(tracker.lost(), 0);

        // Still anchored at 11.
        assert_eq!(tracker.observe(12), 0);
        assert_eq!(tracker.lost(), 0);
    }

    #[test]
    fn tracker_reorder_after_gap() {
        let mut tracker = SequenceTracker::new();
        tracker.observe(20);
        assert_eq!(tracker.observe(22), 1);
        assert_eq!(tracker.observe(21), 0);
        assert_eq!(tracker.observe(23), 0);
        assert_eq!(tracker.lost(), 1);
    }

    #[test]
    fn tracker_late_datagram_across_wrap() {
        let mut tracker = SequenceTracker::new();
        tracker.observe(u16::MAX);
        assert_eq!(tracker.observe(2), 1);
        // 65535 again, from before the wrap.
        assert_eq!(tracker.observe(u16::MAX), 0);
        assert_eq!(tracker.observe(3), 0);
        assert_eq!(tracker.lost(), 1);
    }

    #[test]
    fn tracker_large_forward_jump() {
        let mut tracker = SequenceTracker::new();
        tracker.observe(1);
        assert_eq!(tracker.observe(5001), 4999);
        // Just past the late window counts as a jump forward.
        let mut tracker = SequenceTracker::new();
        tracker.observe(2000);
        let ahead = 2000 - REORDER_WINDOW as u16 - 1;
        assert_eq!(tracker.observe(ahead), u64::from(SEQUENCE_RING - REORDER_WINDOW - 2));
    }

    #[tokio::test]
    async fn receiver_parses_and_tracks() {
        let (tx, rx) = mpsc::channel(4);
        let mut receiver = IqReceiver::new(rx);

        tx.send(Bytes::from(datagram(1, &[(5, 6)]))).await.unwrap();
        tx.send(Bytes::from_static(&[0x04, 0x00, 0x18, 0x00]))
            .await
            .unwrap();
        tx.send(Bytes::from(datagram(3, &[]))).await.unwrap();
        drop(tx);

        let first = receiver.recv().await.unwrap().unwrap();
        assert_eq!(first.samples, vec![IqSample { i: 5, q: 6 }]);
        assert!(receiver.recv().await.unwrap().is_err());
        assert_eq!(receiver.recv().await.unwrap().unwrap().sequence, 3);
        assert_eq!(receiver.lost(), 1);
        assert!(receiver.recv().await.is_none());
    }
}
