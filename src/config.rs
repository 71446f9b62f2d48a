//! Codec configuration.
//!
//! Defines the byte order, compression, long encoding and block sizing used
//! when building columns, plus the file size ceiling for metric files.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::blocks::size_per_for;
use crate::compression::CompressionStrategy;
use crate::encoding::LongEncoding;
use crate::error::IoContext;
use crate::order::ByteOrder;
use crate::{Error, Result};

/// Configuration for column writers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Byte order of headers and block contents.
    /// Default: little-endian
    pub byte_order: ByteOrder,

    /// Block compression.
    /// Default: lz4
    pub compression: CompressionStrategy,

    /// Long encoding applied before compression.
    /// Default: longs (written without an encoding id byte)
    pub long_encoding: LongEncoding,

    /// Uncompressed bytes per block; the element count is rounded down to a
    /// power of two.
    /// Default: 64 KiB
    pub block_bytes: usize,

    /// Largest metric file that may be produced.
    /// Default: i32::MAX bytes
    pub max_file_size: u64,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            byte_order: ByteOrder::LittleEndian,
            compression: CompressionStrategy::Lz4,
            long_encoding: LongEncoding::Longs,
            block_bytes: 0x10000,
            max_file_size: i32::MAX as u64,
        }
    }
}

impl CodecConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::InvalidInput(format!("bad codec config: {e}")))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).io_context(|| format!("read {}", path.display()))?;
        Self::from_json(&json)
    }

    pub fn long_size_per(&self) -> u32 {
        size_per_for(self.block_bytes, 8)
    }

    pub fn float_size_per(&self) -> u32 {
        size_per_for(self.block_bytes, 4)
    }
}
