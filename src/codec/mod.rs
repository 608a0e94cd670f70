//! Binary frame envelope
//!
//! Every frame travels as a fixed 32-byte little-endian header followed
//! by the raw sample payload:
//!
//! | offset | size | field |
//! |--------|------|------------------------------|
//! | 0      | 4    | magic constant               |
//! | 4      | 4    | sequence number (u32)        |
//! | 8      | 8    | capture timestamp ms (f64)   |
//! | 16     | 2    | sample count (u16)           |
//! | 18     | 2    | frame duration ms (u16)      |
//! | 20     | 4    | sample rate Hz (u32)         |
//! | 24     | 2    | channel count (u16)          |
//! | 26     | 2    | format code (u16, 1=PCM16LE) |
//! | 28     | 4    | payload length (u32)         |
//! | 32     | N    | raw sample payload           |
//!
//! Decoding is strict: bad magic, unknown format codes, truncation, and
//! length mismatches are all hard failures. The transport drops and
//! counts offending frames instead of crashing the pipeline.

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

use crate::pcm::{PcmFrame, SampleFormat};

/// Format identifier at the head of every envelope ("VLPC" on the wire).
pub const FRAME_MAGIC: u32 = 0x4350_4C56;

/// Fixed header length in bytes.
pub const HEADER_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("frame truncated: {actual} bytes, need at least {needed}")]
    Truncated { needed: usize, actual: usize },

    #[error("bad magic constant: {found:#010x}")]
    BadMagic { found: u32 },

    #[error("unknown format code: {0}")]
    UnknownFormat(u16),

    #[error("payload length mismatch: header says {header}, buffer holds {actual}")]
    PayloadLength { header: usize, actual: usize },

    #[error("sample count {sample_count} does not match {payload_len}-byte payload")]
    SampleCount {
        sample_count: u16,
        payload_len: usize,
    },
}

/// Encode a frame into its wire envelope. Encoding a well-formed frame
/// cannot fail.
pub fn encode_frame(frame: &PcmFrame) -> Vec<u8> {
    let mut header = [0u8; HEADER_LEN];

    LittleEndian::write_u32(&mut header[0..4], FRAME_MAGIC);
    LittleEndian::write_u32(&mut header[4..8], frame.sequence_number);
    LittleEndian::write_f64(&mut header[8..16], frame.capture_timestamp_ms);
    LittleEndian::write_u16(&mut header[16..18], frame.sample_count);
    LittleEndian::write_u16(&mut header[18..20], frame.frame_duration_ms);
    LittleEndian::write_u32(&mut header[20..24], frame.sample_rate_hz);
    LittleEndian::write_u16(&mut header[24..26], frame.channel_count);
    LittleEndian::write_u16(&mut header[26..28], frame.format.code());
    LittleEndian::write_u32(&mut header[28..32], frame.payload.len() as u32);

    let mut buf = Vec::with_capacity(HEADER_LEN + frame.payload.len());
    buf.extend_from_slice(&header);
    buf.extend_from_slice(&frame.payload);
    buf
}

/// Decode one wire envelope back into a frame.
///
/// No field is trusted beyond the header: the magic constant, the
/// format code, and both length invariants are checked before any
/// payload byte is interpreted.
pub fn decode_frame(buf: &[u8]) -> Result<PcmFrame, WireError> {
    if buf.len() < HEADER_LEN {
        return Err(WireError::Truncated {
            needed: HEADER_LEN,
            actual: buf.len(),
        });
    }

    let magic = LittleEndian::read_u32(&buf[0..4]);
    if magic != FRAME_MAGIC {
        return Err(WireError::BadMagic { found: magic });
    }

    let format_code = LittleEndian::read_u16(&buf[26..28]);
    let format = SampleFormat::from_code(format_code)
        .ok_or(WireError::UnknownFormat(format_code))?;

    let payload_len = LittleEndian::read_u32(&buf[28..32]) as usize;
    let actual_payload = buf.len() - HEADER_LEN;
    if payload_len != actual_payload {
        return Err(WireError::PayloadLength {
            header: payload_len,
            actual: actual_payload,
        });
    }

    let sample_count = LittleEndian::read_u16(&buf[16..18]);
    if sample_count as usize * format.bytes_per_sample() != payload_len {
        return Err(WireError::SampleCount {
            sample_count,
            payload_len,
        });
    }

    Ok(PcmFrame {
        sequence_number: LittleEndian::read_u32(&buf[4..8]),
        capture_timestamp_ms: LittleEndian::read_f64(&buf[8..16]),
        sample_rate_hz: LittleEndian::read_u32(&buf[20..24]),
        frame_duration_ms: LittleEndian::read_u16(&buf[18..20]),
        sample_count,
        channel_count: LittleEndian::read_u16(&buf[24..26]),
        format,
        payload: buf[HEADER_LEN..].to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> PcmFrame {
        PcmFrame::from_samples(&[0, 1_000, -1_000, i16::MAX, i16::MIN], 42, 840.5, 16_000, 20)
    }

    #[test]
    fn test_round_trip() {
        let frame = sample_frame();
        let encoded = encode_frame(&frame);
        let decoded = decode_frame(&encoded).unwrap();

        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_header_layout() {
        let frame = sample_frame();
        let encoded = encode_frame(&frame);

        assert_eq!(&encoded[0..4], b"VLPC");
        assert_eq!(LittleEndian::read_u32(&encoded[4..8]), 42);
        assert_eq!(LittleEndian::read_f64(&encoded[8..16]), 840.5);
        assert_eq!(LittleEndian::read_u16(&encoded[16..18]), 5);
        assert_eq!(LittleEndian::read_u16(&encoded[18..20]), 20);
        assert_eq!(LittleEndian::read_u32(&encoded[20..24]), 16_000);
        assert_eq!(LittleEndian::read_u16(&encoded[24..26]), 1);
        assert_eq!(LittleEndian::read_u16(&encoded[26..28]), 1);
        assert_eq!(LittleEndian::read_u32(&encoded[28..32]), 10);
        assert_eq!(encoded.len(), HEADER_LEN + 10);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut encoded = encode_frame(&sample_frame());
        encoded[0] ^= 0xFF;

        assert!(matches!(
            decode_frame(&encoded),
            Err(WireError::BadMagic { .. })
        ));
    }

    #[test]
    fn test_unknown_format_is_hard_failure() {
        let mut encoded = encode_frame(&sample_frame());
        LittleEndian::write_u16(&mut encoded[26..28], 7);

        assert_eq!(decode_frame(&encoded), Err(WireError::UnknownFormat(7)));
    }

    #[test]
    fn test_truncated_header_rejected() {
        let encoded = encode_frame(&sample_frame());

        assert!(matches!(
            decode_frame(&encoded[..16]),
            Err(WireError::Truncated { .. })
        ));
        assert!(matches!(decode_frame(&[]), Err(WireError::Truncated { .. })));
    }

    #[test]
    fn test_payload_length_mismatch_rejected() {
        let mut encoded = encode_frame(&sample_frame());
        encoded.pop();

        assert!(matches!(
            decode_frame(&encoded),
            Err(WireError::PayloadLength { .. })
        ));
    }

    #[test]
    fn test_sample_count_mismatch_rejected() {
        let mut encoded = encode_frame(&sample_frame());
        // Claim one more sample than the payload holds, and fix the
        // payload length field so only the sample invariant trips.
        LittleEndian::write_u16(&mut encoded[16..18], 6);

        assert!(matches!(
            decode_frame(&encoded),
            Err(WireError::SampleCount { .. })
        ));
    }

    #[test]
    fn test_empty_payload_round_trips() {
        let frame = PcmFrame::from_samples(&[], 0, 0.0, 16_000, 20);
        let decoded = decode_frame(&encode_frame(&frame)).unwrap();

        assert_eq!(decoded.sample_count, 0);
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn test_corrupted_magic_never_panics() {
        let encoded = encode_frame(&sample_frame());
        for i in 0..4 {
            let mut corrupt = encoded.clone();
            corrupt[i] = corrupt[i].wrapping_add(1);
            let _ = decode_frame(&corrupt); // must return Err, not panic
        }
    }
}
