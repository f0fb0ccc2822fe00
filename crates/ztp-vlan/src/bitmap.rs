//! Port bitmap codec
//!
//! Switches report VLAN membership as a hex string with one bit per port.
//! Reading left to right, the most significant bit of the first digit is
//! port 1, the next bit port 2, and so on: digit `k` (counting from 1)
//! covers ports `4k-3..=4k`.
//!
//! ```text
//! "a0" = 1010 0000 -> {1, 3}
//! ```

use std::collections::BTreeSet;

use crate::error::{Result, VlanError};

/// Ordered set of 1-based port numbers
pub type PortSet = BTreeSet<u16>;

/// Ports covered by one hex digit
const PORTS_PER_DIGIT: usize = 4;

fn strip_prefix(hex: &str) -> &str {
    hex.strip_prefix("0x")
        .or_else(|| hex.strip_prefix("0X"))
        .unwrap_or(hex)
}

/// Number of hex digits in a device-supplied bitmap, prefix excluded
pub fn digit_width(hex: &str) -> usize {
    strip_prefix(hex.trim()).len()
}

/// Decode a bitmap into the set of member ports
///
/// Accepts an optional `0x` prefix as returned by SNMP walks.
pub fn decode(hex: &str) -> Result<PortSet> {
    let digits = strip_prefix(hex.trim());
    let mut ports = PortSet::new();

    for (index, c) in digits.chars().enumerate() {
        let nibble = c.to_digit(16).ok_or_else(|| VlanError::InvalidBitmap {
            value: hex.to_string(),
            reason: format!("non-hex digit {c:?} at position {index}"),
        })?;
        for bit in 0..PORTS_PER_DIGIT {
            if nibble & (0b1000 >> bit) != 0 {
                let port = index * PORTS_PER_DIGIT + bit + 1;
                let port = u16::try_from(port).map_err(|_| VlanError::InvalidBitmap {
                    value: hex.to_string(),
                    reason: "bitmap longer than any port numbering".to_string(),
                })?;
                ports.insert(port);
            }
        }
    }

    Ok(ports)
}

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Encode a port set as exactly `digits` lowercase hex digits
///
/// Unused positions are zero. A port of 0 or beyond `4 * digits` is an error.
pub fn encode(ports: &PortSet, digits: usize) -> Result<String> {
    let mut nibbles = vec![0u8; digits];

    for &port in ports {
        let position = usize::from(port);
        if position == 0 || position > digits * PORTS_PER_DIGIT {
            return Err(VlanError::PortOutOfRange { port, digits });
        }
        let offset = position - 1;
        nibbles[offset / PORTS_PER_DIGIT] |= 0b1000 >> (offset % PORTS_PER_DIGIT);
    }

    Ok(nibbles
        .iter()
        .map(|&n| char::from(HEX_DIGITS[usize::from(n)]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ports(list: &[u16]) -> PortSet {
        list.iter().copied().collect()
    }

    #[test]
    fn test_decode_bit_order() {
        assert_eq!(decode("a0").unwrap(), ports(&[1, 3]));
        assert_eq!(decode("0x8001").unwrap(), ports(&[1, 16]));
        assert_eq!(decode("0XF").unwrap(), ports(&[1, 2, 3, 4]));
        assert_eq!(decode("0000").unwrap(), PortSet::new());
        assert_eq!(decode("").unwrap(), PortSet::new());
    }

    #[test]
    fn test_decode_rejects_non_hex() {
        let err = decode("0x00g0").unwrap_err();
        assert!(matches!(err, VlanError::InvalidBitmap { .. }));
    }

    #[test]
    fn test_encode_fixed_width() {
        assert_eq!(encode(&ports(&[1, 3]), 2).unwrap(), "a0");
        assert_eq!(encode(&ports(&[24]), 8).unwrap(), "00000100");
        assert_eq!(encode(&PortSet::new(), 6).unwrap(), "000000");
        assert_eq!(encode(&ports(&[5, 6, 7, 8]), 4).unwrap(), "0f00");
    }

    #[test]
    fn test_encode_every_digit() {
        for nibble in 0u8..16 {
            let set: PortSet = (1..=4u16)
                .filter(|port| nibble & (0b1000 >> (port - 1)) != 0)
                .collect();
            assert_eq!(encode(&set, 1).unwrap(), format!("{nibble:x}"));
        }
    }

    #[test]
    fn test_encode_rejects_out_of_range() {
        assert!(matches!(
            encode(&ports(&[9]), 2),
            Err(VlanError::PortOutOfRange { port: 9, digits: 2 })
        ));
        assert!(encode(&ports(&[0]), 2).is_err());
        assert!(encode(&ports(&[8]), 2).is_ok());
    }

    #[test]
    fn test_round_trip() {
        let sets = [
            ports(&[1]),
            ports(&[48]),
            ports(&[1, 2, 3, 4, 5, 6, 7, 8]),
            ports(&[2, 11, 23, 24, 47]),
        ];
        for set in sets {
            let hex = encode(&set, 12).unwrap();
            assert_eq!(hex.len(), 12);
            assert_eq!(decode(&hex).unwrap(), set);
        }
    }

    #[test]
    fn test_digit_width() {
        assert_eq!(digit_width("0xffffff000000"), 12);
        assert_eq!(digit_width("ffff"), 4);
        assert_eq!(digit_width(""), 0);
    }
}
