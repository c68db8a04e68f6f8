//! Binary codecs for packet fields
//!
//! Integers use LEB128-style variable-length encoding (7 data bits per byte,
//! high bit set when more bytes follow). Signed values are zigzag encoded
//! first so small negative numbers stay short. Floats are little-endian.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tideway_core::{ProxyError, Result, Vector3f, Vector3i};
use uuid::Uuid;

/// Longest legal encoding of a 32-bit varint
const MAX_VARINT32_BYTES: usize = 5;
/// Longest legal encoding of a 64-bit varint
const MAX_VARINT64_BYTES: usize = 10;

#[inline]
fn need(buf: &Bytes, len: usize, what: &str) -> Result<()> {
    if buf.remaining() < len {
        return Err(ProxyError::InvalidData(format!("Not enough bytes for {}", what)));
    }
    Ok(())
}

/// Write an unsigned 32-bit varint
#[inline]
pub fn write_var_u32(buf: &mut BytesMut, mut val: u32) {
    while val >= 0x80 {
        buf.put_u8((val as u8 & 0x7F) | 0x80);
        val >>= 7;
    }
    buf.put_u8(val as u8);
}

/// Read an unsigned 32-bit varint
#[inline]
pub fn read_var_u32(buf: &mut Bytes) -> Result<u32> {
    let mut result = 0u32;
    for i in 0..MAX_VARINT32_BYTES {
        need(buf, 1, "VarInt")?;
        let byte = buf.get_u8();
        result |= ((byte & 0x7F) as u32) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(result);
        }
    }
    Err(ProxyError::InvalidData("VarInt too long".into()))
}

/// Write an unsigned 64-bit varint
#[inline]
pub fn write_var_u64(buf: &mut BytesMut, mut val: u64) {
    while val >= 0x80 {
        buf.put_u8((val as u8 & 0x7F) | 0x80);
        val >>= 7;
    }
    buf.put_u8(val as u8);
}

/// Read an unsigned 64-bit varint
#[inline]
pub fn read_var_u64(buf: &mut Bytes) -> Result<u64> {
    let mut result = 0u64;
    for i in 0..MAX_VARINT64_BYTES {
        need(buf, 1, "VarLong")?;
        let byte = buf.get_u8();
        result |= ((byte & 0x7F) as u64) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(result);
        }
    }
    Err(ProxyError::InvalidData("VarLong too long".into()))
}

/// Write a zigzag-encoded signed 32-bit varint
#[inline]
pub fn write_var_i32(buf: &mut BytesMut, val: i32) {
    write_var_u32(buf, ((val << 1) ^ (val >> 31)) as u32);
}

/// Read a zigzag-encoded signed 32-bit varint
#[inline]
pub fn read_var_i32(buf: &mut Bytes) -> Result<i32> {
    let raw = read_var_u32(buf)?;
    Ok(((raw >> 1) as i32) ^ -((raw & 1) as i32))
}

/// Write a zigzag-encoded signed 64-bit varint
#[inline]
pub fn write_var_i64(buf: &mut BytesMut, val: i64) {
    write_var_u64(buf, ((val << 1) ^ (val >> 63)) as u64);
}

/// Read a zigzag-encoded signed 64-bit varint
#[inline]
pub fn read_var_i64(buf: &mut Bytes) -> Result<i64> {
    let raw = read_var_u64(buf)?;
    Ok(((raw >> 1) as i64) ^ -((raw & 1) as i64))
}

#[inline]
pub fn write_u8(buf: &mut BytesMut, val: u8) {
    buf.put_u8(val);
}

#[inline]
pub fn read_u8(buf: &mut Bytes) -> Result<u8> {
    need(buf, 1, "byte")?;
    Ok(buf.get_u8())
}

#[inline]
pub fn write_bool(buf: &mut BytesMut, val: bool) {
    buf.put_u8(val as u8);
}

#[inline]
pub fn read_bool(buf: &mut Bytes) -> Result<bool> {
    Ok(read_u8(buf)? != 0)
}

#[inline]
pub fn write_i16_le(buf: &mut BytesMut, val: i16) {
    buf.put_i16_le(val);
}

#[inline]
pub fn read_i16_le(buf: &mut Bytes) -> Result<i16> {
    need(buf, 2, "short")?;
    Ok(buf.get_i16_le())
}

#[inline]
pub fn write_f32_le(buf: &mut BytesMut, val: f32) {
    buf.put_f32_le(val);
}

#[inline]
pub fn read_f32_le(buf: &mut Bytes) -> Result<f32> {
    need(buf, 4, "float")?;
    Ok(buf.get_f32_le())
}

/// Write a varint-length-prefixed UTF-8 string
#[inline]
pub fn write_string(buf: &mut BytesMut, val: &str) {
    write_var_u32(buf, val.len() as u32);
    buf.put_slice(val.as_bytes());
}

/// Read a varint-length-prefixed UTF-8 string
#[inline]
pub fn read_string(buf: &mut Bytes) -> Result<String> {
    let len = read_var_u32(buf)? as usize;
    need(buf, len, "string")?;
    let bytes = buf.copy_to_bytes(len);
    String::from_utf8(bytes.to_vec())
        .map_err(|e| ProxyError::InvalidData(format!("Invalid UTF-8: {}", e)))
}

/// Write a varint-length-prefixed byte array
#[inline]
pub fn write_byte_array(buf: &mut BytesMut, val: &[u8]) {
    write_var_u32(buf, val.len() as u32);
    buf.put_slice(val);
}

/// Read a varint-length-prefixed byte array
#[inline]
pub fn read_byte_array(buf: &mut Bytes) -> Result<Bytes> {
    let len = read_var_u32(buf)? as usize;
    need(buf, len, "byte array")?;
    Ok(buf.copy_to_bytes(len))
}

/// Write a UUID as two little-endian 64-bit halves (most significant first)
#[inline]
pub fn write_uuid(buf: &mut BytesMut, val: &Uuid) {
    let (most, least) = val.as_u64_pair();
    buf.put_u64_le(most);
    buf.put_u64_le(least);
}

#[inline]
pub fn read_uuid(buf: &mut Bytes) -> Result<Uuid> {
    need(buf, 16, "UUID")?;
    let most = buf.get_u64_le();
    let least = buf.get_u64_le();
    Ok(Uuid::from_u64_pair(most, least))
}

#[inline]
pub fn write_vector3f(buf: &mut BytesMut, val: Vector3f) {
    write_f32_le(buf, val.x);
    write_f32_le(buf, val.y);
    write_f32_le(buf, val.z);
}

#[inline]
pub fn read_vector3f(buf: &mut Bytes) -> Result<Vector3f> {
    Ok(Vector3f::new(read_f32_le(buf)?, read_f32_le(buf)?, read_f32_le(buf)?))
}

/// Block position: signed x/z, unsigned y
#[inline]
pub fn write_block_position(buf: &mut BytesMut, val: Vector3i) {
    write_var_i32(buf, val.x);
    write_var_u32(buf, val.y as u32);
    write_var_i32(buf, val.z);
}

#[inline]
pub fn read_block_position(buf: &mut Bytes) -> Result<Vector3i> {
    let x = read_var_i32(buf)?;
    let y = read_var_u32(buf)? as i32;
    let z = read_var_i32(buf)?;
    Ok(Vector3i::new(x, y, z))
}

/// Signed variant used where negative heights are legal
#[inline]
pub fn write_vector3i(buf: &mut BytesMut, val: Vector3i) {
    write_var_i32(buf, val.x);
    write_var_i32(buf, val.y);
    write_var_i32(buf, val.z);
}

#[inline]
pub fn read_vector3i(buf: &mut Bytes) -> Result<Vector3i> {
    Ok(Vector3i::new(read_var_i32(buf)?, read_var_i32(buf)?, read_var_i32(buf)?))
}

/// Take whatever is left in the buffer
#[inline]
pub fn read_remaining(buf: &mut Bytes) -> Bytes {
    buf.split_off(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_var_u32_encoding_matches_leb128() {
        let mut buf = BytesMut::new();
        write_var_u32(&mut buf, 300);
        assert_eq!(&buf[..], &[0xAC, 0x02]);
    }

    #[test]
    fn test_zigzag_small_negatives_stay_short() {
        let mut buf = BytesMut::new();
        write_var_i32(&mut buf, -1);
        assert_eq!(&buf[..], &[0x01]);

        let mut bytes = buf.freeze();
        assert_eq!(read_var_i32(&mut bytes).unwrap(), -1);
    }

    #[test]
    fn test_var_i64_extremes() {
        for val in [i64::MIN, -1, 0, 1, i64::MAX] {
            let mut buf = BytesMut::new();
            write_var_i64(&mut buf, val);
            let mut bytes = buf.freeze();
            assert_eq!(read_var_i64(&mut bytes).unwrap(), val, "Failed for {}", val);
            assert!(bytes.is_empty());
        }
    }

    #[test]
    fn test_overlong_varint_rejected() {
        let mut bytes = Bytes::from_static(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]);
        assert!(read_var_u32(&mut bytes).is_err());
    }

    #[test]
    fn test_truncated_string_rejected() {
        let mut buf = BytesMut::new();
        write_var_u32(&mut buf, 10);
        buf.put_slice(b"abc");
        let mut bytes = buf.freeze();
        assert!(read_string(&mut bytes).is_err());
    }

    #[test]
    fn test_block_position_keeps_unsigned_height() {
        let mut buf = BytesMut::new();
        write_block_position(&mut buf, Vector3i::new(-20, 70, 5));
        let mut bytes = buf.freeze();
        assert_eq!(read_block_position(&mut bytes).unwrap(), Vector3i::new(-20, 70, 5));
    }
}
