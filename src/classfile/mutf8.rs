//! Modified UTF-8, the string encoding of `CONSTANT_Utf8` entries.
//!
//! It differs from standard UTF-8 in two ways: NUL is written as the two bytes
//! `C0 80`, and supplementary characters are written as two encoded UTF-16 surrogates
//! of three bytes each.

use crate::Result;

/// Decodes modified UTF-8 into a Rust string.
///
/// Unpaired surrogates, which the format allows but Rust strings do not, are replaced
/// with U+FFFD.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for invalid lead bytes, raw NUL bytes and
/// truncated sequences.
pub fn decode(bytes: &[u8]) -> Result<String> {
    // Pure ASCII is by far the most common case
    if bytes.iter().all(|&b| b != 0 && b < 0x80) {
        return Ok(bytes.iter().map(|&b| char::from(b)).collect());
    }

    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut position = 0;
    while position < bytes.len() {
        let lead = bytes[position];
        let unit = match lead {
            0x01..=0x7F => {
                position += 1;
                u16::from(lead)
            }
            0xC0..=0xDF => {
                let second = continuation(bytes, position + 1)?;
                position += 2;
                (u16::from(lead & 0x1F) << 6) | second
            }
            0xE0..=0xEF => {
                let second = continuation(bytes, position + 1)?;
                let third = continuation(bytes, position + 2)?;
                position += 3;
                (u16::from(lead & 0x0F) << 12) | (second << 6) | third
            }
            _ => {
                return Err(malformed_error!(
                    "Invalid modified UTF-8 byte {:#04x} at offset {}",
                    lead,
                    position
                ))
            }
        };
        units.push(unit);
    }

    Ok(String::from_utf16_lossy(&units))
}

fn continuation(bytes: &[u8], position: usize) -> Result<u16> {
    match bytes.get(position) {
        Some(&byte) if byte & 0xC0 == 0x80 => Ok(u16::from(byte & 0x3F)),
        Some(&byte) => Err(malformed_error!(
            "Invalid modified UTF-8 continuation byte {:#04x} at offset {}",
            byte,
            position
        )),
        None => Err(malformed_error!("Truncated modified UTF-8 sequence")),
    }
}

/// Encodes a string as modified UTF-8.
#[must_use]
pub fn encode(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for unit in text.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit.to_be_bytes()[1]),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | ((unit >> 6) & 0x1F).to_be_bytes()[1]);
                out.push(0x80 | (unit & 0x3F).to_be_bytes()[1]);
            }
            _ => {
                out.push(0xE0 | ((unit >> 12) & 0x0F).to_be_bytes()[1]);
                out.push(0x80 | ((unit >> 6) & 0x3F).to_be_bytes()[1]);
                out.push(0x80 | (unit & 0x3F).to_be_bytes()[1]);
            }
        }
    }
    out
}
