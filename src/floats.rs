//! Block-compressed float columns.
//!
//! Same header and block framing as long columns, without an encoding step:
//! each block is the raw `f32` values in column byte order, compressed.

use std::io::Write;
use std::sync::Arc;

use log::debug;

use crate::blocks::{self, BlockHeader, BlockIndex, BlockSink, CachedBlock};
use crate::compression::CompressionStrategy;
use crate::config::CodecConfig;
use crate::container::{write_fully, Region};
use crate::order::ByteOrder;
use crate::{Error, Result};

/// 64 KiB of raw floats per block.
pub const DEFAULT_SIZE_PER: u32 = 0x10000 / 4;

pub struct CompressedFloatsWriter {
    order: ByteOrder,
    size_per: u32,
    pending: Vec<u8>,
    pending_count: u32,
    sink: BlockSink,
    total: u32,
    sealed: bool,
}

impl CompressedFloatsWriter {
    pub fn open(name: impl Into<String>, order: ByteOrder, compression: CompressionStrategy) -> Self {
        Self::open_inner(name.into(), order, compression, DEFAULT_SIZE_PER)
    }

    pub fn open_with_size_per(
        name: impl Into<String>,
        order: ByteOrder,
        compression: CompressionStrategy,
        size_per: u32,
    ) -> Result<Self> {
        blocks::validate_size_per(size_per)?;
        Ok(Self::open_inner(name.into(), order, compression, size_per))
    }

    pub fn open_with_config(name: impl Into<String>, config: &CodecConfig) -> Self {
        Self::open_inner(
            name.into(),
            config.byte_order,
            config.compression,
            config.float_size_per(),
        )
    }

    fn open_inner(name: String, order: ByteOrder, compression: CompressionStrategy, size_per: u32) -> Self {
        Self {
            order,
            size_per,
            pending: Vec::with_capacity(size_per as usize * 4),
            pending_count: 0,
            sink: BlockSink::new(name, order, compression),
            total: 0,
            sealed: false,
        }
    }

    pub fn len(&self) -> u32 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn add(&mut self, value: f32) -> Result<()> {
        if self.sealed {
            return Err(Error::InvalidState("column already sized; no more values accepted"));
        }
        if self.total == blocks::MAX_TOTAL_SIZE {
            return Err(Error::InvalidInput(format!("column {} is full", self.sink.name())));
        }
        self.pending.extend_from_slice(&self.order.f32_bytes(value));
        self.pending_count += 1;
        self.total += 1;
        if self.pending_count == self.size_per {
            self.flush_pending()?;
        }
        Ok(())
    }

    fn flush_pending(&mut self) -> Result<()> {
        if self.pending_count == 0 {
            return Ok(());
        }
        self.sink.push(&self.pending)?;
        self.pending.clear();
        self.pending_count = 0;
        Ok(())
    }

    fn header(&self) -> BlockHeader {
        BlockHeader::new(self.total, self.size_per, self.sink.compression(), None)
    }

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
            "column {} written: {} floats in {} blocks",
            self.sink.name(),
            self.total,
            header.num_blocks()
        );
        Ok(())
    }
}

struct FloatsInner {
    header: BlockHeader,
    order: ByteOrder,
    blocks: BlockIndex,
    shift: u32,
    mask: usize,
}

#[derive(Clone)]
pub struct CompressedFloatsSupplier {
    inner: Arc<FloatsInner>,
}

impl CompressedFloatsSupplier {
    pub fn from_region(region: &mut Region, order: ByteOrder) -> Result<Self> {
        let header = BlockHeader::read_from(region, order)?;
        if let Some(encoding) = header.encoding {
            return Err(Error::Format(format!(
                "float column carries encoding id[{:#04x}]",
                encoding.id()
            )));
        }
        let blocks = BlockIndex::read_from(region, header.num_blocks(), order)?;
        Ok(Self {
            inner: Arc::new(FloatsInner {
                shift: header.size_per.trailing_zeros(),
                mask: header.size_per as usize - 1,
                header,
                order,
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

    pub fn compression(&self) -> CompressionStrategy {
        self.inner.header.compression
    }

    pub fn get(&self) -> CompressedFloats {
        CompressedFloats {
            inner: Arc::clone(&self.inner),
            cached: None,
        }
    }
}

pub struct CompressedFloats {
    inner: Arc<FloatsInner>,
    cached: Option<CachedBlock<f32>>,
}

impl CompressedFloats {
    pub fn len(&self) -> usize {
        self.inner.header.total_size as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&mut self, index: usize) -> Result<f32> {
        if index >= self.len() {
            return Err(Error::InvalidInput(format!(
                "index[{index}] out of bounds for size[{}]",
                self.len()
            )));
        }
        let block = index >> self.inner.shift;
        let offset = index & self.inner.mask;
        if !matches!(&self.cached, Some(cached) if cached.index == block) {
            let inner = &self.inner;
            let framed = inner
                .blocks
                .block(block)
                .ok_or_else(|| Error::InvalidInput(format!("block[{block}] out of range")))?;
            let count = (inner.header.size_per as usize).min(self.len() - (block << inner.shift));
            let raw = inner.header.compression.decompress(framed, count * 4)?;
            let values = (0..count)
                .map(|i| inner.order.read_f32(&raw, i * 4))
                .collect::<Result<Vec<_>>>()?;
            self.cached = Some(CachedBlock { index: block, values });
        }
        self.cached
            .as_ref()
            .map(|cached| cached.values[offset])
            .ok_or(Error::InvalidState("block cache empty after load"))
    }

    pub fn to_vec(&mut self) -> Result<Vec<f32>> {
        (0..self.len()).map(|i| self.get(i)).collect()
    }
}
