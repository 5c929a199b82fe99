//! Firmware images and the Intel HEX parser.
//!
//! A [`FirmwareImage`] is an ordered address → byte mapping; uploading it
//! writes each byte verbatim into the code space. [`parse_hex`] builds one
//! from Intel HEX text (`:LLAAAATT[DD...]CC`), supporting record types
//! 00 (data), 01 (EOF), 02 (extended segment address) and 04 (extended
//! linear address). Start-address records (03, 05) carry no data and are
//! skipped.

use std::collections::BTreeMap;

use crate::error::Error;

/// Sparse firmware contents keyed by byte address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FirmwareImage {
    bytes: BTreeMap<usize, u8>,
}

impl FirmwareImage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Contiguous image starting at `base`.
    pub fn from_bytes(base: usize, data: &[u8]) -> Self {
        let bytes = data.iter().enumerate().map(|(i, &b)| (base + i, b)).collect();
        FirmwareImage { bytes }
    }

    /// Image of little-endian instruction words starting at address 0.
    pub fn from_words(words: &[u16]) -> Self {
        let data: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        Self::from_bytes(0, &data)
    }

    /// Set one byte; a later write to the same address wins.
    pub fn insert(&mut self, addr: usize, byte: u8) {
        self.bytes.insert(addr, byte);
    }

    pub fn get(&self, addr: usize) -> Option<u8> {
        self.bytes.get(&addr).copied()
    }

    /// `(address, byte)` pairs in ascending address order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, u8)> + '_ {
        self.bytes.iter().map(|(&a, &b)| (a, b))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// One past the highest address, or 0 when empty.
    pub fn end(&self) -> usize {
        self.bytes.keys().next_back().map_or(0, |&a| a + 1)
    }
}

fn hex_error(line: usize, reason: impl Into<String>) -> Error {
    Error::Hex { line, reason: reason.into() }
}

/// Parse Intel HEX text. Line numbers in errors are 1-based.
pub fn parse_hex(hex: &str) -> Result<FirmwareImage, Error> {
    let mut image = FirmwareImage::new();
    let mut base_addr: usize = 0;

    for (index, line) in hex.lines().enumerate() {
        let line_no = index + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let body = line
            .strip_prefix(':')
            .ok_or_else(|| hex_error(line_no, "missing ':' start code"))?;

        let bytes = hex_line_to_bytes(body).map_err(|reason| hex_error(line_no, reason))?;
        if bytes.len() < 5 {
            return Err(hex_error(line_no, "record too short"));
        }

        let byte_count = bytes[0] as usize;
        if bytes.len() != byte_count + 5 {
            return Err(hex_error(
                line_no,
                format!("length field says {} data bytes, record has {}", byte_count, bytes.len() - 5),
            ));
        }
        let addr = ((bytes[1] as usize) << 8) | bytes[2] as usize;
        let record_type = bytes[3];
        let data = &bytes[4..4 + byte_count];

        let sum = bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
        if sum != 0 {
            return Err(hex_error(line_no, format!("checksum mismatch (sum 0x{:02X})", sum)));
        }

        match record_type {
            0x00 => {
                for (i, &b) in data.iter().enumerate() {
                    image.insert(base_addr + addr + i, b);
                }
            }
            0x01 => break,
            0x02 | 0x04 => {
                if byte_count != 2 {
                    return Err(hex_error(line_no, "address record needs 2 data bytes"));
                }
                let value = ((data[0] as usize) << 8) | data[1] as usize;
                base_addr = if record_type == 0x02 { value << 4 } else { value << 16 };
            }
            0x03 | 0x05 => {}
            other => {
                return Err(hex_error(line_no, format!("unsupported record type 0x{:02X}", other)));
            }
        }
    }

    Ok(image)
}

/// Convert hex character pairs to bytes
fn hex_line_to_bytes(hex_str: &str) -> Result<Vec<u8>, String> {
    if hex_str.len() % 2 != 0 {
        return Err("odd number of hex characters".into());
    }
    hex_str
        .as_bytes()
        .chunks(2)
        .map(|pair| -> Result<u8, String> { Ok(hex_digit(pair[0])? << 4 | hex_digit(pair[1])?) })
        .collect()
}

fn hex_digit(c: u8) -> Result<u8, String> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(format!("invalid hex character {:?}", c as char)),
    }
}
