//! Block framing shared by the block-compressed column codecs.
//!
//! A column is a header followed by `ceil(totalSize / sizePer)` blocks. Each
//! block is framed as `[compressedLength:u32][compressed bytes]` in the column
//! byte order, so block boundaries are recovered without decompressing.
//!
//! ```text
//! legacy  (0x01): [version][totalSize:u32][sizePer:u32][blocks...]
//! current (0x02): [version][totalSize:u32][sizePer:u32]
//!                 [compressionId (top bit = encoding flag)][encodingId?][blocks...]
//! ```

use log::debug;

use crate::compression::{self, CompressionStrategy};
use crate::container::Region;
use crate::encoding::LongEncoding;
use crate::order::ByteOrder;
use crate::{Error, Result};

pub const LEGACY_VERSION: u8 = 0x01;
pub const VERSION: u8 = 0x02;

/// `totalSize` is a signed 32-bit count on the wire.
pub const MAX_TOTAL_SIZE: u32 = i32::MAX as u32;

/// version + totalSize + sizePer
const PREFIX_SIZE: usize = 1 + 4 + 4;
const FRAME_LEN_SIZE: usize = 4;

/// Largest power-of-two element count whose raw bytes fit in `block_bytes`.
pub fn size_per_for(block_bytes: usize, value_bytes: usize) -> u32 {
    let fits = (block_bytes / value_bytes.max(1)).clamp(1, 1 << 30);
    1u32 << (usize::BITS - 1 - fits.leading_zeros())
}

pub(crate) fn validate_size_per(size_per: u32) -> Result<()> {
    if size_per == 0 || !size_per.is_power_of_two() {
        return Err(Error::InvalidInput(format!(
            "sizePer[{size_per}] must be a power of two"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: u8,
    pub total_size: u32,
    pub size_per: u32,
    pub compression: CompressionStrategy,
    /// `None` when no encoding id byte is present.
    pub encoding: Option<LongEncoding>,
}

impl BlockHeader {
    pub fn new(
        total_size: u32,
        size_per: u32,
        compression: CompressionStrategy,
        encoding: Option<LongEncoding>,
    ) -> Self {
        Self {
            version: VERSION,
            total_size,
            size_per,
            compression,
            encoding,
        }
    }

    pub fn num_blocks(&self) -> usize {
        (self.total_size as usize).div_ceil(self.size_per as usize)
    }

    pub fn encoded_len(&self) -> usize {
        match (self.version, self.encoding) {
            (LEGACY_VERSION, _) => PREFIX_SIZE,
            (_, None) => PREFIX_SIZE + 1,
            (_, Some(_)) => PREFIX_SIZE + 2,
        }
    }

    /// Current-version header bytes; legacy headers are only ever read.
    pub fn to_bytes(&self, order: ByteOrder) -> Vec<u8> {
        let mut out = Vec::with_capacity(PREFIX_SIZE + 2);
        out.push(VERSION);
        out.extend_from_slice(&order.u32_bytes(self.total_size));
        out.extend_from_slice(&order.u32_bytes(self.size_per));
        match self.encoding {
            None => out.push(self.compression.id()),
            Some(encoding) => {
                out.push(compression::set_encoding_flag(self.compression.id()));
                out.push(encoding.id());
            }
        }
        out
    }

    /// Parses a header from the front of `region` and advances past it.
    pub fn read_from(region: &mut Region, order: ByteOrder) -> Result<Self> {
        let version = *region
            .first()
            .ok_or_else(|| Error::truncated("column header", 1, 0))?;
        if version != LEGACY_VERSION && version != VERSION {
            return Err(Error::Format(format!("unknown version[{version:#04x}]")));
        }
        let total_size = order.read_u32(region, 1)?;
        let size_per = order.read_u32(region, 5)?;
        if total_size > MAX_TOTAL_SIZE {
            return Err(Error::Format(format!("negative totalSize[{}]", total_size as i32)));
        }
        if total_size > 0 && (size_per == 0 || !size_per.is_power_of_two()) {
            return Err(Error::Format(format!(
                "sizePer[{size_per}] is not a power of two"
            )));
        }

        let mut header = Self {
            version,
            total_size,
            size_per: size_per.max(1),
            compression: CompressionStrategy::LEGACY,
            encoding: None,
        };
        if version == VERSION {
            let id = *region
                .get(PREFIX_SIZE)
                .ok_or_else(|| Error::truncated("column header", PREFIX_SIZE + 1, region.len()))?;
            if compression::has_encoding_flag(id) {
                let encoding_id = *region.get(PREFIX_SIZE + 1).ok_or_else(|| {
                    Error::truncated("column header", PREFIX_SIZE + 2, region.len())
                })?;
                header.encoding = Some(LongEncoding::for_id(encoding_id)?);
            }
            header.compression =
                CompressionStrategy::for_id(compression::clear_encoding_flag(id))?;
        }
        region.split_to(header.encoded_len())?;
        Ok(header)
    }
}

/// Compresses finished blocks and appends them, framed, to an in-memory store.
pub(crate) struct BlockSink {
    name: String,
    order: ByteOrder,
    compression: CompressionStrategy,
    payload: Vec<u8>,
    blocks: usize,
}

impl BlockSink {
    pub(crate) fn new(name: String, order: ByteOrder, compression: CompressionStrategy) -> Self {
        Self {
            name,
            order,
            compression,
            payload: Vec::new(),
            blocks: 0,
        }
    }

    pub(crate) fn push(&mut self, raw: &[u8]) -> Result<()> {
        let compressed = self.compression.compress(raw)?;
        let len = u32::try_from(compressed.len()).map_err(|_| {
            Error::InvalidInput(format!("block of {} bytes too large", compressed.len()))
        })?;
        self.payload.extend_from_slice(&self.order.u32_bytes(len));
        self.payload.extend_from_slice(&compressed);
        debug!(
            "column {} flushed block {} ({} -> {} bytes, {})",
            self.name,
            self.blocks,
            raw.len(),
            compressed.len(),
            self.compression
        );
        self.blocks += 1;
        Ok(())
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn compression(&self) -> CompressionStrategy {
        self.compression
    }

    pub(crate) fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// Block boundaries within a mapped column, found by walking the frames once.
#[derive(Debug)]
pub(crate) struct BlockIndex {
    region: Region,
    frames: Vec<(usize, usize)>,
}

impl BlockIndex {
    /// Indexes `num_blocks` frames from the front of `region` and advances past them.
    pub(crate) fn read_from(region: &mut Region, num_blocks: usize, order: ByteOrder) -> Result<Self> {
        let mut frames = Vec::with_capacity(num_blocks.min(region.len() / FRAME_LEN_SIZE));
        let mut offset = 0usize;
        for _ in 0..num_blocks {
            let len = order.read_u32(region, offset)? as usize;
            let start = offset + FRAME_LEN_SIZE;
            let end = start
                .checked_add(len)
                .filter(|end| *end <= region.len())
                .ok_or_else(|| Error::truncated("block", start.saturating_add(len), region.len()))?;
            frames.push((start, end));
            offset = end;
        }
        let region = region.split_to(offset)?;
        Ok(Self { region, frames })
    }

    pub(crate) fn block(&self, index: usize) -> Option<&[u8]> {
        self.frames
            .get(index)
            .map(|&(start, end)| &self.region[start..end])
    }

    /// Framed payload bytes, exactly as they were written.
    pub(crate) fn payload(&self) -> &[u8] {
        &self.region
    }
}

/// Most recently decoded block of a reader.
pub(crate) struct CachedBlock<T> {
    pub(crate) index: usize,
    pub(crate) values: Vec<T>,
}
