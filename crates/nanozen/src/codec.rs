//! Variable-length-encoded integers and the bit-packed flag fields that ride
//! alongside them on the wire (§2 "Bit-set & VLE codec"). Every multi-byte
//! integer on the wire — resource ids, sequence numbers, lengths — uses the
//! same little-endian base-128 VLE the rest of the Zenoh family uses: seven
//! payload bits per byte, the top bit set on every byte but the last.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("buffer exhausted while decoding")]
    Truncated,
    #[error("VLE value exceeds 32 bits")]
    Overflow,
    #[error("encode target buffer too small")]
    NoSpace,
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Appends `v` to `buf` in VLE form, returning the number of bytes written.
pub fn vle_encode(buf: &mut [u8], mut v: u32) -> CodecResult<usize> {
    let mut i = 0;
    loop {
        if i >= buf.len() {
            return Err(CodecError::NoSpace);
        }
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            buf[i] = byte;
            i += 1;
            return Ok(i);
        }
        buf[i] = byte | 0x80;
        i += 1;
    }
}

/// Decodes a VLE integer from the front of `buf`, returning the value and the
/// number of bytes consumed. At most 5 bytes are read (`5 * 7 == 35 >= 32`
/// bits), matching the source's rejection of VLEs that cannot fit a `u32`.
pub fn vle_decode(buf: &[u8]) -> CodecResult<(u32, usize)> {
    let mut v: u32 = 0;
    for (i, &byte) in buf.iter().enumerate().take(5) {
        let payload = (byte & 0x7f) as u32;
        let shift = 7 * i;
        if shift >= 32 && payload != 0 {
            return Err(CodecError::Overflow);
        }
        v |= payload.checked_shl(shift as u32).unwrap_or(0);
        if byte & 0x80 == 0 {
            return Ok((v, i + 1));
        }
    }
    if buf.len() < 5 { Err(CodecError::Truncated) } else { Err(CodecError::Overflow) }
}

/// Number of bytes `vle_encode` would need for `v`.
pub fn vle_len(v: u32) -> usize {
    let mut n = 1;
    let mut rest = v >> 7;
    while rest != 0 {
        n += 1;
        rest >>= 7;
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(v: u32) {
        let mut buf = [0u8; 8];
        let n = vle_encode(&mut buf, v).unwrap();
        assert_eq!(n, vle_len(v));
        let (decoded, consumed) = vle_decode(&buf).unwrap();
        assert_eq!(consumed, n);
        assert_eq!(decoded, v);
    }

    #[test]
    fn encode_then_decode_is_identity() {
        for v in [0u32, 1, 127, 128, 300, 16384, u16::MAX as u32, u32::MAX] {
            roundtrip(v);
        }
    }

    #[test]
    fn single_byte_values_fit_in_one_byte() {
        let mut buf = [0u8; 8];
        assert_eq!(vle_encode(&mut buf, 42).unwrap(), 1);
        assert_eq!(buf[0], 42);
    }

    #[test]
    fn truncated_input_is_reported() {
        let buf = [0x80u8, 0x80];
        assert_eq!(vle_decode(&buf), Err(CodecError::Truncated));
    }

    #[test]
    fn undersized_target_buffer_is_reported() {
        let mut buf = [0u8; 1];
        assert_eq!(vle_encode(&mut buf, 300), Err(CodecError::NoSpace));
    }
}
