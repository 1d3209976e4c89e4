//! Binary wire codec for the push gateway protocol.
//!
//! Pure, stateless transforms, no I/O. The notification frame and the
//! feedback record both use network byte order throughout.

pub mod payload;
pub use payload::NotificationPayload;

use crate::{
    token::{DeviceToken, DEVICE_TOKEN_LEN},
    Error, Result,
};
use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

/// Simple-notification command id.
pub const NOTIFICATION_COMMAND: u8 = 0;

/// Ceiling on the serialized JSON payload, imposed by the protocol.
pub const MAX_PAYLOAD_LEN: usize = 256;

/// Fixed size of one feedback record on the wire.
pub const FEEDBACK_RECORD_LEN: usize = 38;

/// Encode one notification frame:
/// `u8 command | u16 token_len | token | u16 payload_len | payload`.
///
/// The payload must already be serialized JSON; anything over
/// [`MAX_PAYLOAD_LEN`] is rejected with `PayloadTooLarge`. Token length
/// is guaranteed by the `DeviceToken` type.
pub fn encode_notification(token: &DeviceToken, payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(Error::PayloadTooLarge(payload.len()));
    }

    let mut frame = Vec::with_capacity(1 + 2 + DEVICE_TOKEN_LEN + 2 + payload.len());
    frame.push(NOTIFICATION_COMMAND);
    frame.extend_from_slice(&(DEVICE_TOKEN_LEN as u16).to_be_bytes());
    frame.extend_from_slice(token.as_bytes());
    frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// One feedback-service record: the device token became permanently
/// invalid as of `timestamp` (seconds since epoch).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedbackRecord {
    pub timestamp: u32,
    pub token: DeviceToken,
}

/// Incremental decoder for the feedback stream.
///
/// Yields complete 38-byte records and leaves any partial tail in the
/// buffer until more bytes arrive, so reads may be split at arbitrary
/// chunk boundaries.
#[derive(Debug, Default)]
pub struct FeedbackCodec;

impl Decoder for FeedbackCodec {
    type Item = FeedbackRecord;
    type Error = crate::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<FeedbackRecord>> {
        if src.len() < FEEDBACK_RECORD_LEN {
            return Ok(None);
        }

        let timestamp = u32::from_be_bytes(src[0..4].try_into().expect("4-byte slice"));
        let token_len = u16::from_be_bytes(src[4..6].try_into().expect("2-byte slice")) as usize;
        if token_len != DEVICE_TOKEN_LEN {
            return Err(Error::MalformedFeedback(format!(
                "embedded token length {}, expected {}",
                token_len, DEVICE_TOKEN_LEN
            )));
        }

        let token = DeviceToken::from_slice(&src[6..FEEDBACK_RECORD_LEN])?;
        src.advance(FEEDBACK_RECORD_LEN);
        Ok(Some(FeedbackRecord { timestamp, token }))
    }
}

/// Decode exactly one feedback record from exactly 38 bytes.
pub fn decode_feedback_record(bytes: &[u8]) -> Result<FeedbackRecord> {
    if bytes.len() != FEEDBACK_RECORD_LEN {
        return Err(Error::MalformedFeedback(format!(
            "record is {} bytes, expected {}",
            bytes.len(),
            FEEDBACK_RECORD_LEN
        )));
    }
    let mut buf = BytesMut::from(bytes);
    match FeedbackCodec.decode(&mut buf)? {
        Some(record) => Ok(record),
        None => unreachable!("exact-length record always decodes"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(fill: u8) -> DeviceToken {
        DeviceToken::from_slice(&[fill; DEVICE_TOKEN_LEN]).unwrap()
    }

    fn feedback_bytes(timestamp: u32, fill: u8) -> Vec<u8> {
        let mut rec = Vec::with_capacity(FEEDBACK_RECORD_LEN);
        rec.extend_from_slice(&timestamp.to_be_bytes());
        rec.extend_from_slice(&(DEVICE_TOKEN_LEN as u16).to_be_bytes());
        rec.extend_from_slice(&[fill; DEVICE_TOKEN_LEN]);
        rec
    }

    #[test]
    fn notification_frame_round_trips() {
        let token = token(0x5a);
        let payload = br#"{"aps":{"alert":"ring"}}"#;
        let frame = encode_notification(&token, payload).unwrap();

        // Independent parse of the frame layout.
        assert_eq!(frame[0], NOTIFICATION_COMMAND);
        let token_len = u16::from_be_bytes([frame[1], frame[2]]) as usize;
        assert_eq!(token_len, DEVICE_TOKEN_LEN);
        assert_eq!(&frame[3..3 + token_len], token.as_bytes());
        let payload_len =
            u16::from_be_bytes([frame[3 + token_len], frame[4 + token_len]]) as usize;
        assert_eq!(payload_len, payload.len());
        assert_eq!(&frame[5 + token_len..], &payload[..]);
        assert_eq!(frame.len(), 5 + token_len + payload_len);
    }

    #[test]
    fn oversized_payload_rejected() {
        let payload = vec![b'x'; MAX_PAYLOAD_LEN + 1];
        assert_eq!(
            encode_notification(&token(1), &payload),
            Err(Error::PayloadTooLarge(MAX_PAYLOAD_LEN + 1))
        );
    }

    #[test]
    fn payload_at_ceiling_accepted() {
        let payload = vec![b'x'; MAX_PAYLOAD_LEN];
        assert!(encode_notification(&token(1), &payload).is_ok());
    }

    #[test]
    fn decodes_concatenated_records_in_order() {
        let mut buf = BytesMut::new();
        for (ts, fill) in [(100u32, 1u8), (200, 2), (300, 3)] {
            buf.extend_from_slice(&feedback_bytes(ts, fill));
        }

        let mut codec = FeedbackCodec;
        let mut out = Vec::new();
        while let Some(rec) = codec.decode(&mut buf).unwrap() {
            out.push(rec);
        }
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].timestamp, 100);
        assert_eq!(out[1].token, token(2));
        assert_eq!(out[2].timestamp, 300);
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_tail_is_retained() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&feedback_bytes(7, 9));
        buf.extend_from_slice(&feedback_bytes(8, 10)[..20]);

        let mut codec = FeedbackCodec;
        assert!(codec.decode(&mut buf).unwrap().is_some());
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 20);

        // The rest of the record arrives later.
        buf.extend_from_slice(&feedback_bytes(8, 10)[20..]);
        let rec = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(rec.timestamp, 8);
        assert_eq!(rec.token, token(10));
    }

    #[test]
    fn byte_at_a_time_equals_single_read() {
        let mut stream = Vec::new();
        for (ts, fill) in [(1u32, 1u8), (2, 2), (3, 3)] {
            stream.extend_from_slice(&feedback_bytes(ts, fill));
        }

        let drain = |buf: &mut BytesMut| {
            let mut codec = FeedbackCodec;
            let mut out = Vec::new();
            while let Some(rec) = codec.decode(buf).unwrap() {
                out.push(rec);
            }
            out
        };

        let mut whole = BytesMut::from(&stream[..]);
        let all_at_once = drain(&mut whole);

        let mut trickle = BytesMut::new();
        let mut one_at_a_time = Vec::new();
        let mut codec = FeedbackCodec;
        for byte in &stream {
            trickle.extend_from_slice(&[*byte]);
            while let Some(rec) = codec.decode(&mut trickle).unwrap() {
                one_at_a_time.push(rec);
            }
        }

        assert_eq!(all_at_once, one_at_a_time);
        assert_eq!(all_at_once.len(), 3);
    }

    #[test]
    fn bad_embedded_token_length_is_malformed() {
        let mut rec = feedback_bytes(1, 1);
        rec[4] = 0;
        rec[5] = 16;
        let mut buf = BytesMut::from(&rec[..]);
        assert!(matches!(
            FeedbackCodec.decode(&mut buf),
            Err(Error::MalformedFeedback(_))
        ));
    }

    #[test]
    fn exact_record_decoder_requires_38_bytes() {
        let rec = feedback_bytes(42, 5);
        let decoded = decode_feedback_record(&rec).unwrap();
        assert_eq!(decoded.timestamp, 42);
        assert!(matches!(
            decode_feedback_record(&rec[..37]),
            Err(Error::MalformedFeedback(_))
        ));
    }
}
