//! Block-compressed long columns.
//!
//! Values are grouped into blocks of `sizePer` (a power of two), each block is
//! run through a [`LongEncoding`] and then a [`CompressionStrategy`]. Readers
//! decode one block at a time and keep only the most recent one.

use std::io::Write;
use std::sync::Arc;

use log::debug;

use crate::blocks::{self, BlockHeader, BlockIndex, BlockSink, CachedBlock};
use crate::compression::CompressionStrategy;
use crate::config::CodecConfig;
use crate::container::{write_fully, Region};
use crate::encoding::LongEncoding;
use crate::order::ByteOrder;
use crate::{Error, Result};

pub const LEGACY_VERSION: u8 = blocks::LEGACY_VERSION;
pub const VERSION: u8 = blocks::VERSION;
/// 64 KiB of raw longs per block.
pub const DEFAULT_SIZE_PER: u32 = 0x10000 / 8;

/// Write side of a block-compressed long column.
///
/// A writer exists only while open. `write_to` consumes it, so nothing can be
/// appended after the column is written. Not safe for concurrent use; callers
/// own one writer per column.
pub struct CompressedLongsWriter {
    order: ByteOrder,
    encoding: LongEncoding,
    size_per: u32,
    pending: Vec<i64>,
    sink: BlockSink,
    total: u32,
    sealed: bool,
}

impl CompressedLongsWriter {
    pub fn open(
        name: impl Into<String>,
        order: ByteOrder,
        compression: CompressionStrategy,
        encoding: LongEncoding,
    ) -> Self {
        Self::open_inner(name.into(), order, compression, encoding, DEFAULT_SIZE_PER)
    }

    pub fn open_with_size_per(
        name: impl Into<String>,
        order: ByteOrder,
        compression: CompressionStrategy,
        encoding: LongEncoding,
        size_per: u32,
    ) -> Result<Self> {
        blocks::validate_size_per(size_per)?;
        Ok(Self::open_inner(name.into(), order, compression, encoding, size_per))
    }

    pub fn open_with_config(name: impl Into<String>, config: &CodecConfig) -> Self {
        Self::open_inner(
            name.into(),
            config.byte_order,
            config.compression,
            config.long_encoding,
            config.long_size_per(),
        )
    }

    fn open_inner(
        name: String,
        order: ByteOrder,
        compression: CompressionStrategy,
        encoding: LongEncoding,
        size_per: u32,
    ) -> Self {
        Self {
            order,
            encoding,
            size_per,
            pending: Vec::with_capacity(size_per as usize),
            sink: BlockSink::new(name, order, compression),
            total: 0,
            sealed: false,
        }
    }

    pub fn size_per(&self) -> u32 {
        self.size_per
    }

    pub fn len(&self) -> u32 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn add(&mut self, value: i64) -> Result<()> {
        if self.sealed {
            return Err(Error::InvalidState("column already sized; no more values accepted"));
        }
        if self.total == blocks::MAX_TOTAL_SIZE {
            return Err(Error::InvalidInput(format!(
                "column {} is full",
                self.sink.name()
            )));
        }
        self.pending.push(value);
        self.total += 1;
        if self.pending.len() == self.size_per as usize {
            self.flush_pending()?;
        }
        Ok(())
    }

    fn flush_pending(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let raw = self.encoding.encode_block(&self.pending, self.order);
        self.sink.push(&raw)?;
        self.pending.clear();
        Ok(())
    }

    fn header(&self) -> BlockHeader {
        let encoding = (self.encoding != LongEncoding::LEGACY).then_some(self.encoding);
        BlockHeader::new(self.total, self.size_per, self.sink.compression(), encoding)
    }

    /// Exact byte size of the finished column.
    ///
    /// Flushes the partial last block, after which the column is sealed.
    pub fn serialized_size(&mut self) -> Result<u64> {
        self.flush_pending()?;
        self.sealed = true;
        Ok((self.header().encoded_len() + self.sink.payload().len()) as u64)
    }

    pub fn write_to(mut self, out: &mut dyn Write) -> Result<()> {
        self.flush_pending()?;
        let header = self.header();
        write_fully(out, &header.to_bytes(self.order), self.sink.name())?;
        write_fully(out, self.sink.payload(), self.sink.name())?;
        debug!(
            "column {} written: {} values in {} blocks ({})",
            self.sink.name(),
            self.total,
            header.num_blocks(),
            self.encoding
        );
        Ok(())
    }
}

struct LongsInner {
    header: BlockHeader,
    order: ByteOrder,
    encoding: LongEncoding,
    blocks: BlockIndex,
    shift: u32,
    mask: usize,
}

/// Read side of a block-compressed long column over immutable bytes.
///
/// The supplier is cheap to clone and may be shared between threads; every
/// reader obtained from [`get`](Self::get) has its own block cache.
#[derive(Clone)]
pub struct CompressedLongsSupplier {
    inner: Arc<LongsInner>,
}

impl CompressedLongsSupplier {
    /// Parses a column from the front of `region` and advances past it.
    pub fn from_region(region: &mut Region, order: ByteOrder) -> Result<Self> {
        let header = BlockHeader::read_from(region, order)?;
        let encoding = header.encoding.unwrap_or(LongEncoding::LEGACY);
        let blocks = BlockIndex::read_from(region, header.num_blocks(), order)?;
        Ok(Self {
            inner: Arc::new(LongsInner {
                shift: header.size_per.trailing_zeros(),
                mask: header.size_per as usize - 1,
                header,
                order,
                encoding,
                blocks,
            }),
        })
    }

    pub fn len(&self) -> usize {
        self.inner.header.total_size as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn version(&self) -> u8 {
        self.inner.header.version
    }

    pub fn size_per(&self) -> u32 {
        self.inner.header.size_per
    }

    pub fn compression(&self) -> CompressionStrategy {
        self.inner.header.compression
    }

    pub fn encoding(&self) -> LongEncoding {
        self.inner.encoding
    }

    /// Whether the column header carried an explicit encoding id.
    pub fn has_encoding_id(&self) -> bool {
        self.inner.header.encoding.is_some()
    }

    pub fn get(&self) -> CompressedLongs {
        CompressedLongs {
            inner: Arc::clone(&self.inner),
            cached: None,
        }
    }

    fn current_header(&self) -> BlockHeader {
        let header = &self.inner.header;
        let encoding = (self.inner.encoding != LongEncoding::LEGACY).then_some(self.inner.encoding);
        BlockHeader::new(header.total_size, header.size_per, header.compression, encoding)
    }

    pub fn serialized_size(&self) -> u64 {
        (self.current_header().encoded_len() + self.inner.blocks.payload().len()) as u64
    }

    /// Re-emits the column in the current format.
    pub fn write_to(&self, out: &mut dyn Write) -> Result<()> {
        write_fully(out, &self.current_header().to_bytes(self.inner.order), "long column")?;
        write_fully(out, self.inner.blocks.payload(), "long column")
    }
}

/// Random-access reader; keeps the last decoded block.
pub struct CompressedLongs {
    inner: Arc<LongsInner>,
    cached: Option<CachedBlock<i64>>,
}

impl CompressedLongs {
    pub fn len(&self) -> usize {
        self.inner.header.total_size as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&mut self, index: usize) -> Result<i64> {
        if index >= self.len() {
            return Err(Error::InvalidInput(format!(
                "index[{index}] out of bounds for size[{}]",
                self.len()
            )));
        }
        let block = index >> self.inner.shift;
        let offset = index & self.inner.mask;
        let values = self.load_block(block)?;
        Ok(values[offset])
    }

    /// Copies `out.len()` values starting at `index`.
    pub fn fill(&mut self, index: usize, out: &mut [i64]) -> Result<()> {
        let end = index
            .checked_add(out.len())
            .filter(|end| *end <= self.len())
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "range[{index}, +{}) out of bounds for size[{}]",
                    out.len(),
                    self.len()
                ))
            })?;
        let mut pos = index;
        while pos < end {
            let block = pos >> self.inner.shift;
            let offset = pos & self.inner.mask;
            let values = self.load_block(block)?;
            let n = (values.len() - offset).min(end - pos);
            out[pos - index..pos - index + n].copy_from_slice(&values[offset..offset + n]);
            pos += n;
        }
        Ok(())
    }

    pub fn to_vec(&mut self) -> Result<Vec<i64>> {
        let mut out = vec![0; self.len()];
        self.fill(0, &mut out)?;
        Ok(out)
    }

    fn load_block(&mut self, block: usize) -> Result<&[i64]> {
        let hit = matches!(&self.cached, Some(cached) if cached.index == block);
        if !hit {
            let inner = &self.inner;
            let framed = inner.blocks.block(block).ok_or_else(|| {
                Error::InvalidInput(format!("block[{block}] out of range"))
            })?;
            let start = block << inner.shift;
            let count = (inner.header.size_per as usize).min(self.len() - start);
            let raw = inner
                .header
                .compression
                .decompress(framed, inner.encoding.max_encoded_len(count))?;
            let values = inner.encoding.decode_block(&raw, count, inner.order)?;
            self.cached = Some(CachedBlock { index: block, values });
        }
        match &self.cached {
            Some(cached) => Ok(&cached.values),
            None => Err(Error::InvalidState("block cache empty after load")),
        }
    }
}
