//! # Batches
//!
//! Packets always travel in batches: `{VARINT len}{frame}` repeated, with the
//! whole body optionally compressed. A batch is the unit a transport frame
//! carries and the unit the bridges forward.

use bytes::{Buf, Bytes, BytesMut};
use tideway_core::{ProxyError, Result};

use crate::codecs::{read_var_u32, write_var_u32};
use crate::compression::{compress, decompress, CompressionType};

/// Join encoded packet frames into one batch payload
pub fn encode_batch(frames: &[Bytes], compression: CompressionType) -> Result<Bytes> {
    let body_len: usize = frames.iter().map(|f| f.len() + 5).sum();
    let mut body = BytesMut::with_capacity(body_len);
    for frame in frames {
        write_var_u32(&mut body, frame.len() as u32);
        body.extend_from_slice(frame);
    }

    match compression {
        CompressionType::None => Ok(body.freeze()),
        _ => Ok(Bytes::from(compress(&body, compression)?)),
    }
}

/// Split a batch payload back into packet frames
pub fn decode_batch(payload: Bytes, compression: CompressionType) -> Result<Vec<Bytes>> {
    let mut body = match compression {
        CompressionType::None => payload,
        _ => Bytes::from(decompress(&payload, compression)?),
    };

    let mut frames = Vec::new();
    while body.has_remaining() {
        let len = read_var_u32(&mut body)? as usize;
        if len > body.remaining() {
            return Err(ProxyError::InvalidData(format!(
                "Frame length {} exceeds remaining {} bytes",
                len,
                body.remaining()
            )));
        }
        frames.push(body.split_to(len));
    }
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Packet;

    #[test]
    fn test_batch_preserves_frame_order() {
        let frames = vec![
            Packet::PlayStatus { status: 3 }.encode(),
            Packet::RequestChunkRadius { radius: 8 }.encode(),
            Bytes::from_static(&[0x90, 0x01]),
        ];

        for compression in [CompressionType::None, CompressionType::Zlib] {
            let batch = encode_batch(&frames, compression).unwrap();
            assert_eq!(decode_batch(batch, compression).unwrap(), frames);
        }
    }

    #[test]
    fn test_empty_batch() {
        let batch = encode_batch(&[], CompressionType::None).unwrap();
        assert!(batch.is_empty());
        assert!(decode_batch(batch, CompressionType::None).unwrap().is_empty());
    }

    #[test]
    fn test_overlong_frame_rejected() {
        let payload = Bytes::from_static(&[0x05, 0x01, 0x02]);
        assert!(decode_batch(payload, CompressionType::None).is_err());
    }
}
