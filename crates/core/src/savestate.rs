//! Save states for the simulated machine.
//!
//! A [`SaveState`] captures everything that changes while firmware runs:
//! program counter, cycle count, the whole data space (registers, I/O
//! cells, port latches, SRAM), the level of every pin, and the display and
//! pad state. Flash is not included; load the same firmware before
//! restoring.
//!
//! ## File format
//!
//! ```text
//! +------------------+
//! | Magic "ABWS"     |  4 bytes
//! +------------------+
//! | Format version   |  u32 little-endian (currently 1)
//! +------------------+
//! | Compressed data  |  deflate-compressed bincode payload
//! +------------------+
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::peripherals::{DisplayState, PadState};
use crate::wire::Level;

/// Magic bytes identifying a save state file.
const MAGIC: &[u8; 4] = b"ABWS";
/// Current save state format version.
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveState {
    /// Program counter (word address)
    pub pc: u32,
    pub cycles: u64,
    /// Data-space image in region order
    pub data: Vec<u8>,
    /// Level of every physical pin, pin 1 first
    pub wires: Vec<Level>,
    pub display: DisplayState,
    pub pad: PadState,
}

/// Encode with header and deflate compression.
pub fn to_bytes(state: &SaveState) -> Result<Vec<u8>, Error> {
    let payload = bincode::serialize(state)?;
    let compressed = miniz_oxide::deflate::compress_to_vec(&payload, 6);

    let mut out = Vec::with_capacity(HEADER_LEN + compressed.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&compressed);
    Ok(out)
}

/// Decode, verifying magic and version.
pub fn from_bytes(data: &[u8]) -> Result<SaveState, Error> {
    if data.len() < HEADER_LEN {
        return Err(Error::State("file too small".into()));
    }
    if &data[0..4] != MAGIC {
        return Err(Error::State("bad magic".into()));
    }
    let version = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
    if version != FORMAT_VERSION {
        return Err(Error::State(format!(
            "unsupported version {} (expected {})",
            version, FORMAT_VERSION
        )));
    }
    let decompressed = miniz_oxide::inflate::decompress_to_vec(&data[HEADER_LEN..])
        .map_err(|e| Error::State(format!("decompress: {:?}", e)))?;
    Ok(bincode::deserialize(&decompressed)?)
}

pub fn save_to_file(state: &SaveState, path: &Path) -> Result<(), Error> {
    std::fs::write(path, to_bytes(state)?)?;
    Ok(())
}

pub fn load_from_file(path: &Path) -> Result<SaveState, Error> {
    from_bytes(&std::fs::read(path)?)
}

/// Save state path next to a firmware file: `game.hex` → `game.state`.
pub fn state_path(firmware_path: &Path) -> PathBuf {
    firmware_path.with_extension("state")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SaveState {
        SaveState {
            pc: 0x1234,
            cycles: 99,
            data: (0..=255).collect(),
            wires: vec![Level::Low, Level::High, Level::Floating],
            display: DisplayState {
                pixels: vec![true, false, false, true],
                row: vec![true, false],
                shifted: 1,
                cursor: 1,
                last_sclk: Level::High,
            },
            pad: PadState { pressed: [false, true, false, false] },
        }
    }

    #[test]
    fn test_bytes_roundtrip() {
        let bytes = to_bytes(&sample()).unwrap();
        assert_eq!(&bytes[0..4], b"ABWS");
        assert_eq!(from_bytes(&bytes).unwrap(), sample());
    }

    #[test]
    fn test_rejects_bad_header() {
        let mut bytes = to_bytes(&sample()).unwrap();
        assert!(matches!(from_bytes(&bytes[..5]), Err(Error::State(_))));
        bytes[4] = 9;
        match from_bytes(&bytes) {
            Err(Error::State(msg)) => assert!(msg.contains("version 9")),
            other => panic!("expected version error, got {:?}", other.map(|_| ())),
        }
        bytes[0] = b'X';
        assert!(matches!(from_bytes(&bytes), Err(Error::State(_))));
    }

    #[test]
    fn test_corrupt_payload() {
        let mut bytes = to_bytes(&sample()).unwrap();
        bytes.truncate(HEADER_LEN + 3);
        assert!(from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_file_roundtrip() {
        let path = std::env::temp_dir().join(format!("arduboy-sim-{}.state", std::process::id()));
        save_to_file(&sample(), &path).unwrap();
        let back = load_from_file(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(back, sample());
    }

    #[test]
    fn test_state_path() {
        assert_eq!(state_path(Path::new("dir/game.hex")), PathBuf::from("dir/game.state"));
        assert_eq!(state_path(Path::new("game")), PathBuf::from("game.state"));
    }
}
