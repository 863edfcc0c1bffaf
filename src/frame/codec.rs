//! Encoding and decoding of the RFC 6455 frame layout.
//!
//! ```text
//! byte 0: FIN | RSV1-3 | opcode(4)
//! byte 1: MASK | len(7)        126 => u16 length follows, 127 => u64 length follows
//! [extended length, big-endian] [mask key, 4 bytes] payload
//! ```

use super::mask::apply_mask;
use super::{Frame, Head, Opcode};
use crate::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

const MAX_HEAD_LEN: usize = 14;

/// Control frames carry at most this much payload and are never fragmented.
const MAX_CONTROL_PAYLOAD: u64 = 125;

/// Decoding limits applied by [`read_frame`].
#[derive(Clone, Copy, Debug)]
pub struct Limits {
    pub max_payload: usize,
    /// Reject frames whose MASK bit is clear, as a server must.
    pub require_mask: bool,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_payload: 16 * 1024 * 1024,
            require_mask: true,
        }
    }
}

/// Encodes a complete, unmasked frame.
pub fn encode(opcode: Opcode, fin: bool, payload: &[u8]) -> Bytes {
    encode_with(opcode, fin, payload, None)
}

/// Encodes a complete frame masked with `mask`, as a client sends it.
pub fn encode_masked(opcode: Opcode, fin: bool, payload: &[u8], mask: [u8; 4]) -> Bytes {
    encode_with(opcode, fin, payload, Some(mask))
}

fn encode_with(opcode: Opcode, fin: bool, payload: &[u8], mask: Option<[u8; 4]>) -> Bytes {
    let mut buf = BytesMut::with_capacity(MAX_HEAD_LEN + payload.len());
    buf.put_u8((fin as u8) << 7 | u8::from(opcode));

    let mask_bit = if mask.is_some() { 1 << 7 } else { 0 };
    let len = payload.len();
    if len <= 125 {
        buf.put_u8(mask_bit | len as u8);
    } else if len <= u16::MAX as usize {
        buf.put_u8(mask_bit | 126);
        buf.put_u16(len as u16);
    } else {
        buf.put_u8(mask_bit | 127);
        buf.put_u64(len as u64);
    }

    match mask {
        Some(mask) => {
            buf.put_slice(&mask);
            let start = buf.len();
            buf.put_slice(payload);
            apply_mask(&mut buf[start..], mask);
        }
        None => buf.put_slice(payload),
    }

    buf.freeze()
}

/// Reads the two fixed header bytes and any extended length.
///
/// Returns `None` if the stream ends cleanly before the first byte, and
/// `TruncatedFrame` if it ends anywhere after that.
pub async fn decode_header<R>(reader: &mut R) -> Result<Option<Head>>
where
    R: AsyncRead + Unpin,
{
    let mut first = [0; 1];
    if reader.read(&mut first).await? == 0 {
        return Ok(None);
    }
    let first = first[0];
    let second = reader.read_u8().await?;

    let payload_len = match second & 0x7F {
        126 => u64::from(reader.read_u16().await?),
        127 => reader.read_u64().await?,
        len => u64::from(len),
    };

    Ok(Some(Head {
        fin: first & 0x80 != 0,
        rsv: [first & 0x40 != 0, first & 0x20 != 0, first & 0x10 != 0],
        opcode: Opcode::from(first),
        masked: second & 0x80 != 0,
        payload_len,
    }))
}

pub async fn decode_mask<R>(reader: &mut R) -> Result<[u8; 4]>
where
    R: AsyncRead + Unpin,
{
    let mut mask = [0; 4];
    reader.read_exact(&mut mask).await?;
    Ok(mask)
}

/// Reads exactly `len` payload bytes.
///
/// The buffer grows with the data actually received, so a bogus length in a
/// header never causes a large allocation up front.
pub async fn read_payload<R>(reader: &mut R, len: usize) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(len.min(8 * 1024));
    let read = (&mut *reader).take(len as u64).read_to_end(&mut buf).await?;
    if read < len {
        return Err(Error::TruncatedFrame);
    }
    Ok(buf)
}

/// Reads one whole frame and unmasks its payload.
pub async fn read_frame<R>(reader: &mut R, limits: Limits) -> Result<Option<Frame>>
where
    R: AsyncRead + Unpin,
{
    let head = match decode_header(reader).await? {
        Some(head) => head,
        None => return Ok(None),
    };

    if !head.masked && limits.require_mask {
        return Err(Error::Protocol("unmasked client frame"));
    }
    if head.opcode.is_control() {
        if !head.fin {
            return Err(Error::Protocol("fragmented control frame"));
        }
        if head.payload_len > MAX_CONTROL_PAYLOAD {
            return Err(Error::Protocol("control frame too large"));
        }
    }
    let len = match usize::try_from(head.payload_len) {
        Ok(len) if len <= limits.max_payload => len,
        _ => return Err(Error::Protocol("frame payload too large")),
    };

    let mask = if head.masked {
        Some(decode_mask(reader).await?)
    } else {
        None
    };

    let mut payload = read_payload(reader, len).await?;
    if let Some(mask) = mask {
        apply_mask(&mut payload, mask);
    }

    Ok(Some(Frame::new(head.opcode, head.fin, payload)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::mask::random_mask;

    async fn decode(mut bytes: &[u8]) -> Result<Option<Frame>> {
        read_frame(&mut bytes, Limits::default()).await
    }

    #[test]
    fn rfc_unmasked_hello() {
        let bytes = encode(Opcode::Text, true, b"Hello");
        assert_eq!(&bytes[..], &[0x81, 0x05, 0x48, 0x65, 0x6c, 0x6c, 0x6f]);
    }

    #[test]
    fn rfc_masked_hello() {
        let bytes = encode_masked(Opcode::Text, true, b"Hello", [0x37, 0xfa, 0x21, 0x3d]);
        assert_eq!(
            &bytes[..],
            &[0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58]
        );
    }

    #[test]
    fn length_encoding_boundaries() {
        let cases = [
            (0usize, 0u8, 2usize),
            (125, 125, 2),
            (126, 126, 4),
            (65535, 126, 4),
            (65536, 127, 10),
        ];
        for (len, marker, head_len) in cases {
            let payload = vec![b'a'; len];
            let bytes = encode(Opcode::Text, true, &payload);
            assert_eq!(bytes[1], marker, "len {}", len);
            assert_eq!(bytes.len(), head_len + len, "len {}", len);
        }

        let bytes = encode(Opcode::Text, true, &[0; 65535]);
        assert_eq!(&bytes[2..4], &[0xff, 0xff]);
        let bytes = encode(Opcode::Text, true, &[0; 65536]);
        assert_eq!(&bytes[2..10], &[0, 0, 0, 0, 0, 1, 0, 0]);
    }

    #[test]
    fn fin_and_opcode_bits() {
        let bytes = encode(Opcode::Continue, false, b"");
        assert_eq!(&bytes[..], &[0x00, 0x00]);
        let bytes = encode(Opcode::Pong, true, b"");
        assert_eq!(&bytes[..], &[0x8a, 0x00]);
    }

    #[tokio::test]
    async fn client_frames_decode_to_original_text() {
        let texts = [
            String::new(),
            "ping".to_owned(),
            "grüße, 世界 🦀".to_owned(),
            "x".repeat(125),
            "x".repeat(126),
            "y".repeat(65535),
            "z".repeat(65536),
        ];
        for text in texts.iter() {
            let bytes = encode_masked(Opcode::Text, true, text.as_bytes(), random_mask());
            let frame = decode(&bytes).await.unwrap().unwrap();
            assert_eq!(frame.opcode, Opcode::Text);
            assert!(frame.fin);
            assert_eq!(&frame.payload[..], text.as_bytes());
        }
    }

    #[tokio::test]
    async fn header_fields() {
        let bytes = encode_masked(Opcode::Ping, false, &[1; 300], [1, 2, 3, 4]);
        let mut reader = &bytes[..];
        let head = decode_header(&mut reader).await.unwrap().unwrap();
        assert_eq!(
            head,
            Head {
                fin: false,
                rsv: [false; 3],
                opcode: Opcode::Ping,
                masked: true,
                payload_len: 300,
            }
        );
        assert_eq!(decode_mask(&mut reader).await.unwrap(), [1, 2, 3, 4]);
        assert_eq!(reader.len(), 300);
    }

    #[tokio::test]
    async fn clean_eof_is_none() {
        assert!(decode(&[]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn truncated_header() {
        let cases: [&[u8]; 3] = [&[0x81], &[0x81, 0xfe, 0x01], &[0x81, 0xff, 0, 0, 0]];
        for bytes in cases {
            assert!(matches!(decode(bytes).await, Err(Error::TruncatedFrame)));
        }
    }

    #[tokio::test]
    async fn truncated_mask_and_payload() {
        assert!(matches!(
            decode(&[0x81, 0x85, 1, 2]).await,
            Err(Error::TruncatedFrame)
        ));

        let bytes = encode_masked(Opcode::Text, true, b"Hello", [9, 9, 9, 9]);
        assert!(matches!(
            decode(&bytes[..bytes.len() - 1]).await,
            Err(Error::TruncatedFrame)
        ));

        let mut reader = &b"abc"[..];
        assert!(matches!(
            read_payload(&mut reader, 4).await,
            Err(Error::TruncatedFrame)
        ));
    }

    #[tokio::test]
    async fn unmasked_rejected_unless_allowed() {
        let bytes = encode(Opcode::Text, true, b"Hello");
        assert!(matches!(decode(&bytes).await, Err(Error::Protocol(_))));

        let limits = Limits {
            require_mask: false,
            ..Limits::default()
        };
        let frame = read_frame(&mut &bytes[..], limits).await.unwrap().unwrap();
        assert_eq!(&frame.payload[..], b"Hello");
    }

    #[tokio::test]
    async fn oversized_payload_rejected_before_reading() {
        // announces 2^40 bytes but carries none
        let bytes = [0x82, 0xff, 0, 0, 1, 0, 0, 0, 0, 0, 1, 2, 3, 4];
        assert!(matches!(decode(&bytes).await, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn control_frames_are_small_and_final() {
        let mask = random_mask();
        let largest = encode_masked(Opcode::Ping, true, &[7; 125], mask);
        let frame = decode(&largest).await.unwrap().unwrap();
        assert_eq!(frame.payload.len(), 125);

        let too_large = encode_masked(Opcode::Ping, true, &[7; 126], mask);
        assert!(matches!(
            decode(&too_large).await,
            Err(Error::Protocol("control frame too large"))
        ));

        let fragmented = encode_masked(Opcode::Close, false, &[3, 232], mask);
        assert!(matches!(
            decode(&fragmented).await,
            Err(Error::Protocol("fragmented control frame"))
        ));
    }
}
