/*
Copyright (c) 2021 VMware, Inc.
SPDX-License-Identifier: MIT
Permission is hereby granted, free of charge, to any person obtaining a copy
of this software and associated documentation files (the "Software"), to deal
in the Software without restriction, including without limitation the rights
to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
copies of the Software, and to permit persons to whom the Software is
furnished to do so, subject to the following conditions:
The above copyright notice and this permission notice shall be included in all
copies or substantial portions of the Software.
THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
SOFTWARE.
*/

//! Canonical byte strings for P4Runtime values.
//!
//! P4Runtime carries every match value, mask and action parameter as a
//! big-endian byte string of exactly `(bitwidth + 7) / 8` bytes.

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

use crate::error::{P4Error, Result};

/// Number of bytes occupied by a value of `bitwidth` bits.
pub fn byte_width(bitwidth: usize) -> usize {
    (bitwidth + 7) / 8
}

/// Encodes `value` as a big-endian byte string `byte_width(bitwidth)` bytes
/// long.  Widths above 64 bits get extra leading zero bytes.
pub fn encode_value(value: u64, bitwidth: usize) -> Result<Vec<u8>> {
    if bitwidth == 0 {
        return Err(P4Error::invalid("bit width must be positive"));
    }
    if bitwidth < 64 && value >> bitwidth != 0 {
        return Err(P4Error::invalid(format!(
            "value {:#x} does not fit in {} bits",
            value, bitwidth
        )));
    }

    let mut enc_val: Vec<u8> = vec![];
    enc_val
        .write_u64::<BigEndian>(value)
        .map_err(|e| P4Error::invalid(e.to_string()))?;

    let num_bytes = byte_width(bitwidth);
    if num_bytes <= enc_val.len() {
        Ok(enc_val.split_off(enc_val.len() - num_bytes))
    } else {
        let mut padded = vec![0u8; num_bytes - enc_val.len()];
        padded.extend_from_slice(&enc_val);
        Ok(padded)
    }
}

/// Decodes a big-endian byte string of any length whose significant part
/// fits in 64 bits.
pub fn decode_value(bytes: &[u8]) -> Result<u64> {
    let significant = match bytes.iter().position(|&b| b != 0) {
        Some(first) => &bytes[first..],
        None => return Ok(0),
    };
    if significant.len() > 8 {
        return Err(P4Error::invalid(format!(
            "{}-byte value does not fit in 64 bits",
            significant.len()
        )));
    }

    let mut buf = [0u8; 8];
    buf[8 - significant.len()..].copy_from_slice(significant);
    Ok(BigEndian::read_u64(&buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn max_value(width: usize) -> u64 {
        if width == 64 {
            u64::MAX
        } else {
            (1 << width) - 1
        }
    }

    #[test]
    fn pads_to_bitwidth() {
        assert_eq!(encode_value(10, 9).unwrap(), vec![0x00, 0x0a]);
        assert_eq!(encode_value(0, 32).unwrap(), vec![0, 0, 0, 0]);
        assert_eq!(encode_value(0x0a00_0001, 32).unwrap(), vec![10, 0, 0, 1]);
        assert_eq!(encode_value(1, 1).unwrap(), vec![1]);
    }

    #[test]
    fn wide_fields_get_leading_zeros() {
        let v = encode_value(0xffff, 128).unwrap();
        assert_eq!(v.len(), 16);
        assert!(v[..14].iter().all(|&b| b == 0));
        assert_eq!(&v[14..], &[0xff, 0xff]);
        assert_eq!(decode_value(&v).unwrap(), 0xffff);
    }

    #[test]
    fn rejects_misuse() {
        assert!(encode_value(1, 0).is_err());
        assert!(encode_value(256, 8).is_err());
        assert!(encode_value(0x1000, 12).is_err());
        assert!(encode_value(u64::MAX, 64).is_ok());
        assert!(decode_value(&[1, 0, 0, 0, 0, 0, 0, 0, 0]).is_err());
    }

    #[test]
    fn decode_is_left_inverse() {
        for &(value, width) in &[(0u64, 8usize), (0x7ff, 12), (0xdead_beef, 48), (u64::MAX, 64)] {
            let bytes = encode_value(value, width).unwrap();
            assert_eq!(bytes.len(), byte_width(width));
            assert_eq!(decode_value(&bytes).unwrap(), value);
        }
        assert_eq!(decode_value(&[]).unwrap(), 0);
    }

    #[test]
    fn every_width_holds_its_extremes() {
        for width in 1..=64 {
            for &value in &[0, 1, max_value(width)] {
                let bytes = encode_value(value, width).unwrap();
                assert_eq!(bytes.len(), byte_width(width), "width {}", width);
                assert_eq!(decode_value(&bytes).unwrap(), value, "width {}", width);
            }
            if width < 64 {
                assert!(encode_value(max_value(width) + 1, width).is_err());
            }
        }
    }

    proptest! {
        #[test]
        fn in_range_values_round_trip(width in 1usize..=64, raw in any::<u64>()) {
            let value = raw & max_value(width);
            let bytes = encode_value(value, width).unwrap();
            prop_assert_eq!(bytes.len(), byte_width(width));
            prop_assert_eq!(decode_value(&bytes).unwrap(), value);
        }
    }
}
