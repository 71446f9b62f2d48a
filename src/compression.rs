//! Block compression strategies.
//!
//! Each strategy is a pure transform over one block of bytes and carries a
//! permanent one-byte wire id. New strategies may be added; existing ids never
//! change meaning.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Top bit of the compression id byte: an encoding id byte follows.
/// Compression ids therefore stay below `0x80`.
pub const ENCODING_FLAG: u8 = 0x80;

const ZSTD_LEVEL: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionStrategy {
    #[default]
    Lz4,
    Zstd,
    Uncompressed,
}

impl CompressionStrategy {
    /// Compression assumed for legacy-version columns, which carry no id byte.
    pub const LEGACY: CompressionStrategy = CompressionStrategy::Lz4;

    pub const ALL: [CompressionStrategy; 3] = [
        CompressionStrategy::Lz4,
        CompressionStrategy::Zstd,
        CompressionStrategy::Uncompressed,
    ];

    pub fn id(self) -> u8 {
        match self {
            CompressionStrategy::Lz4 => 0x01,
            CompressionStrategy::Zstd => 0x02,
            CompressionStrategy::Uncompressed => 0x7F,
        }
    }

    pub fn for_id(id: u8) -> Result<Self> {
        match id {
            0x01 => Ok(CompressionStrategy::Lz4),
            0x02 => Ok(CompressionStrategy::Zstd),
            0x7F => Ok(CompressionStrategy::Uncompressed),
            other => Err(Error::Format(format!(
                "unknown compression id[{other:#04x}]"
            ))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CompressionStrategy::Lz4 => "lz4",
            CompressionStrategy::Zstd => "zstd",
            CompressionStrategy::Uncompressed => "uncompressed",
        }
    }

    pub fn compress(self, raw: &[u8]) -> Result<Vec<u8>> {
        match self {
            CompressionStrategy::Lz4 => Ok(lz4_flex::compress_prepend_size(raw)),
            CompressionStrategy::Zstd => zstd::bulk::compress(raw, ZSTD_LEVEL)
                .map_err(|e| Error::io("zstd compress", e)),
            CompressionStrategy::Uncompressed => Ok(raw.to_vec()),
        }
    }

    /// Reverses [`compress`](Self::compress). Blocks that would expand past
    /// `max_len` bytes are rejected before their output is allocated.
    pub fn decompress(self, compressed: &[u8], max_len: usize) -> Result<Vec<u8>> {
        match self {
            CompressionStrategy::Lz4 => {
                let (prefix, body) = compressed
                    .split_first_chunk::<4>()
                    .ok_or_else(|| Error::truncated("lz4 block", 4, compressed.len()))?;
                let len = u32::from_le_bytes(*prefix) as usize;
                check_block_len(len, max_len)?;
                lz4_flex::decompress(body, len)
                    .map_err(|e| Error::Format(format!("corrupt lz4 block: {e}")))
            }
            CompressionStrategy::Zstd => zstd::bulk::decompress(compressed, max_len)
                .map_err(|e| Error::Format(format!("corrupt zstd block: {e}"))),
            CompressionStrategy::Uncompressed => {
                check_block_len(compressed.len(), max_len)?;
                Ok(compressed.to_vec())
            }
        }
    }
}

fn check_block_len(len: usize, max_len: usize) -> Result<()> {
    if len > max_len {
        return Err(Error::Format(format!(
            "block of {len} bytes exceeds bound[{max_len}]"
        )));
    }
    Ok(())
}

impl fmt::Display for CompressionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub fn has_encoding_flag(id: u8) -> bool {
    id & ENCODING_FLAG != 0
}

pub fn set_encoding_flag(id: u8) -> u8 {
    id | ENCODING_FLAG
}

pub fn clear_encoding_flag(id: u8) -> u8 {
    id & !ENCODING_FLAG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_resolve_back() {
        for strategy in CompressionStrategy::ALL {
            assert_eq!(CompressionStrategy::for_id(strategy.id()).unwrap(), strategy);
        }
    }

    #[test]
    fn unknown_id_names_the_byte() {
        match CompressionStrategy::for_id(0x33) {
            Err(Error::Format(msg)) => assert!(msg.contains("0x33"), "{msg}"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn blocks_survive_every_strategy() {
        let raw: Vec<u8> = (0..4096u32).map(|i| (i % 17) as u8).collect();
        for strategy in CompressionStrategy::ALL {
            let packed = strategy.compress(&raw).unwrap();
            assert_eq!(strategy.decompress(&packed, raw.len()).unwrap(), raw, "{strategy}");
        }
    }

    #[test]
    fn ids_leave_flag_bit_clear() {
        for strategy in CompressionStrategy::ALL {
            assert!(!has_encoding_flag(strategy.id()), "{strategy}");
        }
    }

    #[test]
    fn flag_bit_helpers() {
        let id = CompressionStrategy::Lz4.id();
        let flagged = set_encoding_flag(id);
        assert_eq!(flagged, 0x81);
        assert!(has_encoding_flag(flagged));
        assert!(!has_encoding_flag(id));
        assert_eq!(clear_encoding_flag(flagged), id);
    }

    #[test]
    fn garbage_lz4_is_format_error() {
        let err = CompressionStrategy::Lz4
            .decompress(&[8, 0, 0, 0, 0xFF], 8)
            .unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn oversized_blocks_are_rejected_before_allocation() {
        let err = CompressionStrategy::Lz4
            .decompress(&[0xFF, 0xFF, 0xFF, 0xFF, 0x00], 64)
            .unwrap_err();
        assert!(matches!(err, Error::Format(msg) if msg.contains("4294967295")));

        let raw = vec![7u8; 1024];
        for strategy in CompressionStrategy::ALL {
            let packed = strategy.compress(&raw).unwrap();
            assert!(
                matches!(strategy.decompress(&packed, 512), Err(Error::Format(_))),
                "{strategy}"
            );
        }
    }
}
