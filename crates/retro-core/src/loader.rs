//! Program image loaders: raw binary, Intel HEX and Motorola S-record.
//!
//! Images are written with `poke`, so read-only spaces can be filled and no
//! observers fire. Each loader reports the span of addresses written.

use std::fs;
use std::io;
use std::path::Path;

use thiserror::Error;
use tracing::debug;

use crate::{Fault, MemoryMap, SpaceId};

/// Loader failure.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The image could not be read.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    /// A record does not follow the format.
    #[error("line {line}: {message}")]
    Malformed {
        /// 1-based line number.
        line: usize,
        /// What was wrong.
        message: String,
    },
    /// A record checksum does not match.
    #[error("line {line}: checksum {found:#04x}, expected {expected:#04x}")]
    Checksum {
        /// 1-based line number.
        line: usize,
        /// Computed checksum.
        expected: u8,
        /// Checksum stored in the record.
        found: u8,
    },
    /// The image contains no data.
    #[error("image contains no data")]
    Empty,
    /// A byte landed outside the target space.
    #[error(transparent)]
    Fault(#[from] Fault),
}

/// First and last address written by a load, both inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoadedRange {
    /// Lowest address written.
    pub start: u32,
    /// Highest address written.
    pub end: u32,
}

impl LoadedRange {
    const fn single(address: u32) -> Self {
        Self {
            start: address,
            end: address,
        }
    }

    fn include(range: Option<Self>, address: u32) -> Self {
        match range {
            None => Self::single(address),
            Some(range) => Self {
                start: range.start.min(address),
                end: range.end.max(address),
            },
        }
    }

    /// Number of bytes spanned.
    #[must_use]
    pub const fn len(&self) -> u32 {
        self.end - self.start + 1
    }

    /// Always `false`; a range holds at least one byte.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }
}

/// Writes `bytes` at `base`.
///
/// # Errors
///
/// [`LoadError::Empty`] for an empty image; [`LoadError::Fault`] when the
/// image does not fit.
pub fn load_binary(
    memory: &mut MemoryMap,
    space: SpaceId,
    base: u32,
    bytes: &[u8],
) -> Result<LoadedRange, LoadError> {
    if bytes.is_empty() {
        return Err(LoadError::Empty);
    }
    memory.space_mut(space)?.poke_slice(base, bytes)?;
    let last = u32::try_from(bytes.len() - 1).unwrap_or(u32::MAX);
    let range = LoadedRange {
        start: base,
        end: target_address(memory, space, &[base, last])?,
    };
    debug!(start = range.start, end = range.end, "binary image loaded");
    Ok(range)
}

/// Sums a record's address parts without wrapping; an overflowing sum is
/// reported against the target space.
fn target_address(memory: &MemoryMap, space: SpaceId, parts: &[u32]) -> Result<u32, Fault> {
    parts
        .iter()
        .try_fold(0u32, |sum, part| sum.checked_add(*part))
        .map_or_else(
            || {
                let target = memory.space(space)?;
                Err(Fault::out_of_range(target.name(), u32::MAX, target.size()))
            },
            Ok,
        )
}

fn hex_byte(text: &str, offset: usize, line: usize) -> Result<u8, LoadError> {
    text.get(offset..offset + 2)
        .and_then(|pair| u8::from_str_radix(pair, 16).ok())
        .ok_or_else(|| LoadError::Malformed {
            line,
            message: format!("bad hex digits at column {}", offset + 1),
        })
}

fn record_bytes(text: &str, line: usize) -> Result<Vec<u8>, LoadError> {
    if text.len() % 2 != 0 {
        return Err(LoadError::Malformed {
            line,
            message: "odd number of hex digits".into(),
        });
    }
    (0..text.len())
        .step_by(2)
        .map(|offset| hex_byte(text, offset, line))
        .collect()
}

/// Parses an Intel HEX image and writes its data records at `base` plus the
/// record address.
///
/// Data (`00`), end-of-file (`01`), extended segment (`02`) and extended
/// linear (`04`) records are honored; start-address records (`03`, `05`)
/// are skipped.
///
/// # Errors
///
/// Malformed records, checksum mismatches, an image without data, or data
/// outside the space.
pub fn load_intel_hex(
    memory: &mut MemoryMap,
    space: SpaceId,
    base: u32,
    text: &str,
) -> Result<LoadedRange, LoadError> {
    let mut range = None;
    let mut upper = 0u32;
    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let Some(body) = raw.strip_prefix(':') else {
            return Err(LoadError::Malformed {
                line,
                message: "record does not start with ':'".into(),
            });
        };
        let bytes = record_bytes(body, line)?;
        if bytes.len() < 5 || bytes.len() != usize::from(bytes[0]) + 5 {
            return Err(LoadError::Malformed {
                line,
                message: "record length does not match its count".into(),
            });
        }
        let sum = bytes.iter().fold(0u8, |acc, byte| acc.wrapping_add(*byte));
        if sum != 0 {
            let found = bytes[bytes.len() - 1];
            return Err(LoadError::Checksum {
                line,
                expected: found.wrapping_sub(sum),
                found,
            });
        }
        let offset = u32::from(u16::from_be_bytes([bytes[1], bytes[2]]));
        let data = &bytes[4..bytes.len() - 1];
        match bytes[3] {
            0x00 => {
                for (delta, byte) in (0u32..).zip(data) {
                    let address = target_address(memory, space, &[base, upper, offset, delta])?;
                    memory.poke(space, address, *byte)?;
                    range = Some(LoadedRange::include(range, address));
                }
            }
            0x01 => break,
            0x02 if data.len() == 2 => {
                upper = u32::from(u16::from_be_bytes([data[0], data[1]])) << 4;
            }
            0x04 if data.len() == 2 => {
                upper = u32::from(u16::from_be_bytes([data[0], data[1]])) << 16;
            }
            0x02 | 0x04 => {
                return Err(LoadError::Malformed {
                    line,
                    message: format!(
                        "record type {:#04x} carries {} data bytes, expected 2",
                        bytes[3],
                        data.len()
                    ),
                })
            }
            0x03 | 0x05 => {}
            kind => {
                return Err(LoadError::Malformed {
                    line,
                    message: format!("unsupported record type {kind:#04x}"),
                })
            }
        }
    }
    let range = range.ok_or(LoadError::Empty)?;
    debug!(start = range.start, end = range.end, "intel hex image loaded");
    Ok(range)
}

/// Parses a Motorola S-record image and writes its data records at `base`
/// plus the record address.
///
/// `S1`/`S2`/`S3` carry data with 16/24/32-bit addresses; `S0` headers and
/// `S5`/`S6` counts are skipped; `S7`/`S8`/`S9` end the image.
///
/// # Errors
///
/// Malformed records, checksum mismatches, an image without data, or data
/// outside the space.
pub fn load_srecord(
    memory: &mut MemoryMap,
    space: SpaceId,
    base: u32,
    text: &str,
) -> Result<LoadedRange, LoadError> {
    let mut range = None;
    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let mut chars = raw.chars();
        let (Some('S'), Some(kind)) = (chars.next(), chars.next()) else {
            return Err(LoadError::Malformed {
                line,
                message: "record does not start with 'S'".into(),
            });
        };
        let bytes = record_bytes(chars.as_str(), line)?;
        if bytes.len() < 3 || bytes.len() != usize::from(bytes[0]) + 1 {
            return Err(LoadError::Malformed {
                line,
                message: "record length does not match its count".into(),
            });
        }
        let found = bytes[bytes.len() - 1];
        let expected = !bytes[..bytes.len() - 1]
            .iter()
            .fold(0u8, |acc, byte| acc.wrapping_add(*byte));
        if expected != found {
            return Err(LoadError::Checksum {
                line,
                expected,
                found,
            });
        }
        let address_width = match kind {
            '0' | '5' | '6' => continue,
            '7' | '8' | '9' => break,
            '1' => 2,
            '2' => 3,
            '3' => 4,
            other => {
                return Err(LoadError::Malformed {
                    line,
                    message: format!("unsupported record type S{other}"),
                })
            }
        };
        let payload = &bytes[1..bytes.len() - 1];
        if payload.len() < address_width {
            return Err(LoadError::Malformed {
                line,
                message: "record shorter than its address".into(),
            });
        }
        let (address, data) = payload.split_at(address_width);
        let offset = address
            .iter()
            .fold(0u32, |acc, byte| (acc << 8) | u32::from(*byte));
        for (delta, byte) in (0u32..).zip(data) {
            let address = target_address(memory, space, &[base, offset, delta])?;
            memory.poke(space, address, *byte)?;
            range = Some(LoadedRange::include(range, address));
        }
    }
    let range = range.ok_or(LoadError::Empty)?;
    debug!(start = range.start, end = range.end, "s-record image loaded");
    Ok(range)
}

/// Loads a file, choosing the format from its extension: `.hex`/`.ihx` for
/// Intel HEX, `.s19`/`.s28`/`.s37`/`.srec`/`.mot` for S-records, anything
/// else as raw binary.
///
/// # Errors
///
/// I/O failures plus every error of the selected loader.
pub fn load_file(
    memory: &mut MemoryMap,
    space: SpaceId,
    base: u32,
    path: impl AsRef<Path>,
) -> Result<LoadedRange, LoadError> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|extension| extension.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("hex" | "ihx") => load_intel_hex(memory, space, base, &fs::read_to_string(path)?),
        Some("s19" | "s28" | "s37" | "srec" | "mot") => {
            load_srecord(memory, space, base, &fs::read_to_string(path)?)
        }
        _ => load_binary(memory, space, base, &fs::read(path)?),
    }
}

#[cfg(test)]
mod tests {
    use super::{load_binary, load_intel_hex, load_srecord, LoadError, LoadedRange};
    use crate::{AddressSpace, Fault, MemoryMap, SpaceId};

    fn rom(size: u32) -> (MemoryMap, SpaceId) {
        let mut memory = MemoryMap::new();
        let id = memory
            .add(AddressSpace::flat("ROM", size).read_only())
            .expect("first space");
        (memory, id)
    }

    #[test]
    fn binary_fills_read_only_space() {
        let (mut memory, rom) = rom(0x100);
        let range = load_binary(&mut memory, rom, 0x10, &[1, 2, 3]).expect("fits");
        assert_eq!(range, LoadedRange { start: 0x10, end: 0x12 });
        assert_eq!(range.len(), 3);
        assert_eq!(memory.peek(rom, 0x12), Ok(3));
        assert!(matches!(
            load_binary(&mut memory, rom, 0xFF, &[1, 2]),
            Err(LoadError::Fault(_))
        ));
    }

    #[test]
    fn intel_hex_data_and_eof() {
        let (mut memory, rom) = rom(0x200);
        let image = ":0300300002337A1E\n:00000001FF\n";
        let range = load_intel_hex(&mut memory, rom, 0, image).expect("valid");
        assert_eq!(range, LoadedRange { start: 0x30, end: 0x32 });
        assert_eq!(memory.peek(rom, 0x30), Ok(0x02));
        assert_eq!(memory.peek(rom, 0x32), Ok(0x7A));
    }

    #[test]
    fn intel_hex_rejects_bad_checksum() {
        let (mut memory, rom) = rom(0x200);
        let result = load_intel_hex(&mut memory, rom, 0, ":0300300002337A1F\n");
        assert!(matches!(result, Err(LoadError::Checksum { line: 1, .. })));
        let result = load_intel_hex(&mut memory, rom, 0, "0300300002337A1E\n");
        assert!(matches!(result, Err(LoadError::Malformed { line: 1, .. })));
    }

    #[test]
    fn srecord_s1_records() {
        let (mut memory, rom) = rom(0x100);
        let image = "S00600004844521B\nS1050010AABB85\nS9030000FC\n";
        let range = load_srecord(&mut memory, rom, 0, image).expect("valid");
        assert_eq!(range, LoadedRange { start: 0x10, end: 0x11 });
        assert_eq!(memory.peek(rom, 0x11), Ok(0xBB));
    }

    #[test]
    fn wrapping_record_addresses_are_out_of_range() {
        let (mut memory, rom) = rom(0x100);
        let result = load_srecord(&mut memory, rom, 0x10, "S306FFFFFFF8AB59\n");
        assert!(matches!(
            result,
            Err(LoadError::Fault(Fault::AddressOutOfRange { .. }))
        ));
        assert_eq!(memory.peek(rom, 0x08), Ok(0x00));

        // extended linear 0xFFFF, then data at 0xFFFF plus a base of 0x10
        let image = ":02000004FFFFFC\n:01FFFF00AB56\n:00000001FF\n";
        let result = load_intel_hex(&mut memory, rom, 0x10, image);
        assert!(matches!(
            result,
            Err(LoadError::Fault(Fault::AddressOutOfRange { .. }))
        ));
        assert!(matches!(
            load_binary(&mut memory, rom, u32::MAX, &[1]),
            Err(LoadError::Fault(Fault::AddressOutOfRange { .. }))
        ));
    }

    #[test]
    fn short_extended_address_record_is_a_length_error() {
        let (mut memory, rom) = rom(0x100);
        let result = load_intel_hex(&mut memory, rom, 0, ":0100000400FB\n");
        let Err(LoadError::Malformed { line, message }) = result else {
            panic!("expected a malformed record, got {result:?}");
        };
        assert_eq!(line, 1);
        assert!(message.contains("expected 2"), "{message}");
    }

    #[test]
    fn empty_images_are_rejected() {
        let (mut memory, rom) = rom(0x10);
        assert!(matches!(
            load_intel_hex(&mut memory, rom, 0, ":00000001FF\n"),
            Err(LoadError::Empty)
        ));
        assert!(matches!(
            load_binary(&mut memory, rom, 0, &[]),
            Err(LoadError::Empty)
        ));
    }
}
