//! Long-encoding strategies applied to a block before compression.
//!
//! Encodings are block-local: every encoded block carries whatever metadata it
//! needs (base, table, bit width), so the column header only records the
//! encoding id.
//!
//! ```text
//! Longs: [value:i64]*
//! Delta: [base:i64][bits:u8][bit-packed (value - base)]*
//! Table: [entries:u32][entry:i64]*[bits:u8][bit-packed table index]*
//! ```
//!
//! Multi-byte fields follow the column byte order; bit-packed runs are
//! MSB-first.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::order::ByteOrder;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LongEncoding {
    Delta,
    Table,
    #[default]
    Longs,
}

impl LongEncoding {
    /// Encoding assumed when a column header carries no encoding id.
    pub const LEGACY: LongEncoding = LongEncoding::Longs;

    pub const ALL: [LongEncoding; 3] = [LongEncoding::Delta, LongEncoding::Table, LongEncoding::Longs];

    pub fn id(self) -> u8 {
        match self {
            LongEncoding::Delta => 0x00,
            LongEncoding::Table => 0x01,
            LongEncoding::Longs => 0x02,
        }
    }

    pub fn for_id(id: u8) -> Result<Self> {
        match id {
            0x00 => Ok(LongEncoding::Delta),
            0x01 => Ok(LongEncoding::Table),
            0x02 => Ok(LongEncoding::Longs),
            other => Err(Error::Format(format!("unknown long encoding id[{other:#04x}]"))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            LongEncoding::Delta => "delta",
            LongEncoding::Table => "table",
            LongEncoding::Longs => "longs",
        }
    }

    /// Upper bound on the encoded size of a block of `count` values.
    pub fn max_encoded_len(self, count: usize) -> usize {
        let values = count.saturating_mul(8);
        match self {
            LongEncoding::Longs => values,
            LongEncoding::Delta => values.saturating_add(9),
            LongEncoding::Table => values.saturating_mul(2).saturating_add(5),
        }
    }

    pub fn encode_block(self, values: &[i64], order: ByteOrder) -> Vec<u8> {
        match self {
            LongEncoding::Longs => {
                let mut out = Vec::with_capacity(values.len() * 8);
                for &v in values {
                    out.extend_from_slice(&order.i64_bytes(v));
                }
                out
            }
            LongEncoding::Delta => {
                let base = values.iter().copied().min().unwrap_or(0);
                let max_delta = values
                    .iter()
                    .map(|&v| v.wrapping_sub(base) as u64)
                    .max()
                    .unwrap_or(0);
                let bits = bits_for(max_delta);
                let mut out = Vec::with_capacity(9 + (values.len() * bits as usize + 7) / 8);
                out.extend_from_slice(&order.i64_bytes(base));
                out.push(bits as u8);
                let mut writer = BitWriter::new(out);
                for &v in values {
                    writer.write(v.wrapping_sub(base) as u64, bits);
                }
                writer.finish()
            }
            LongEncoding::Table => {
                let table: Vec<i64> = values
                    .iter()
                    .copied()
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect();
                let bits = bits_for(table.len().saturating_sub(1) as u64);
                let mut out = Vec::with_capacity(5 + table.len() * 8);
                out.extend_from_slice(&order.u32_bytes(table.len() as u32));
                for &entry in &table {
                    out.extend_from_slice(&order.i64_bytes(entry));
                }
                out.push(bits as u8);
                let mut writer = BitWriter::new(out);
                for v in values {
                    // Every value is in the table by construction.
                    let idx = table.binary_search(v).unwrap_or_default();
                    writer.write(idx as u64, bits);
                }
                writer.finish()
            }
        }
    }

    /// Decodes exactly `count` values from one encoded block.
    pub fn decode_block(self, bytes: &[u8], count: usize, order: ByteOrder) -> Result<Vec<i64>> {
        match self {
            LongEncoding::Longs => {
                let needed = count
                    .checked_mul(8)
                    .ok_or_else(|| Error::Format(format!("block count[{count}] overflows")))?;
                if bytes.len() < needed {
                    return Err(Error::truncated("longs block", needed, bytes.len()));
                }
                (0..count).map(|i| order.read_i64(bytes, i * 8)).collect()
            }
            LongEncoding::Delta => {
                let base = order.read_i64(bytes, 0)?;
                let bits = read_bits_byte(bytes, 8)?;
                let mut reader = BitReader::new(&bytes[9..]);
                let mut out = Vec::with_capacity(count);
                for _ in 0..count {
                    out.push(base.wrapping_add(reader.read(bits)? as i64));
                }
                Ok(out)
            }
            LongEncoding::Table => {
                let entries = order.read_u32(bytes, 0)? as usize;
                let mut table = Vec::with_capacity(entries.min(bytes.len() / 8));
                for i in 0..entries {
                    table.push(order.read_i64(bytes, 4 + i * 8)?);
                }
                let bits_at = 4 + entries * 8;
                let bits = read_bits_byte(bytes, bits_at)?;
                let mut reader = BitReader::new(&bytes[bits_at + 1..]);
                let mut out = Vec::with_capacity(count);
                for _ in 0..count {
                    let idx = reader.read(bits)? as usize;
                    let value = table.get(idx).copied().ok_or_else(|| {
                        Error::Format(format!("table index[{idx}] >= entries[{entries}]"))
                    })?;
                    out.push(value);
                }
                Ok(out)
            }
        }
    }
}

impl fmt::Display for LongEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn bits_for(max: u64) -> u32 {
    64 - max.leading_zeros()
}

fn read_bits_byte(bytes: &[u8], at: usize) -> Result<u32> {
    let bits = *bytes
        .get(at)
        .ok_or_else(|| Error::truncated("encoded block header", at + 1, bytes.len()))?;
    if bits > 64 {
        return Err(Error::Format(format!("bad bit width[{bits}]")));
    }
    Ok(bits as u32)
}

/// MSB-first bit writer appending to an existing buffer.
struct BitWriter {
    buf: Vec<u8>,
    current: u8,
    filled: u32,
}

impl BitWriter {
    fn new(buf: Vec<u8>) -> Self {
        Self {
            buf,
            current: 0,
            filled: 0,
        }
    }

    fn write(&mut self, value: u64, bits: u32) {
        let mut remaining = bits;
        while remaining > 0 {
            let free = 8 - self.filled;
            let take = free.min(remaining);
            let chunk = ((value >> (remaining - take)) & ((1u64 << take) - 1)) as u8;
            self.current |= chunk << (free - take);
            self.filled += take;
            remaining -= take;
            if self.filled == 8 {
                self.buf.push(self.current);
                self.current = 0;
                self.filled = 0;
            }
        }
    }

    fn finish(mut self) -> Vec<u8> {
        if self.filled > 0 {
            self.buf.push(self.current);
        }
        self.buf
    }
}

struct BitReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn read(&mut self, bits: u32) -> Result<u64> {
        let mut value = 0u64;
        let mut remaining = bits;
        while remaining > 0 {
            let byte = *self.buf.get(self.pos / 8).ok_or_else(|| {
                Error::truncated("bit-packed run", self.pos / 8 + 1, self.buf.len())
            })?;
            let avail = 8 - (self.pos % 8) as u32;
            let take = avail.min(remaining);
            let chunk = (byte >> (avail - take)) & (((1u16 << take) - 1) as u8);
            value = (value << take) | chunk as u64;
            self.pos += take as usize;
            remaining -= take;
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(encoding: LongEncoding, values: &[i64]) {
        for order in [ByteOrder::LittleEndian, ByteOrder::BigEndian] {
            let bytes = encoding.encode_block(values, order);
            let decoded = encoding.decode_block(&bytes, values.len(), order).unwrap();
            assert_eq!(decoded, values, "{encoding} {order:?}");
        }
    }

    #[test]
    fn ids_resolve_back() {
        for encoding in LongEncoding::ALL {
            assert_eq!(LongEncoding::for_id(encoding.id()).unwrap(), encoding);
        }
        assert!(matches!(LongEncoding::for_id(0x09), Err(Error::Format(_))));
    }

    #[test]
    fn every_encoding_handles_extremes() {
        let values = [i64::MIN, -1, 0, 1, i64::MAX, 42, 42];
        for encoding in LongEncoding::ALL {
            round_trip(encoding, &values);
            round_trip(encoding, &[]);
            round_trip(encoding, &[7; 5]);
        }
    }

    #[test]
    fn delta_packs_narrow_ranges() {
        let values: Vec<i64> = (1_000_000..1_000_256).collect();
        let bytes = LongEncoding::Delta.encode_block(&values, ByteOrder::LittleEndian);
        assert_eq!(bytes[8], 8);
        assert_eq!(bytes.len(), 9 + 256);
        round_trip(LongEncoding::Delta, &values);
    }

    #[test]
    fn encoded_blocks_fit_their_bound() {
        let spread = [i64::MIN, i64::MAX, 0, -1, 3, 9, 27, 81];
        for encoding in LongEncoding::ALL {
            for len in [0, 1, 5, spread.len()] {
                let bytes = encoding.encode_block(&spread[..len], ByteOrder::LittleEndian);
                assert!(bytes.len() <= encoding.max_encoded_len(len), "{encoding} {len}");
            }
        }
    }

    #[test]
    fn constant_delta_block_has_no_payload() {
        let bytes = LongEncoding::Delta.encode_block(&[5, 5, 5], ByteOrder::LittleEndian);
        assert_eq!(bytes.len(), 9);
        assert_eq!(bytes[8], 0);
    }

    #[test]
    fn table_uses_index_bits() {
        let values = [100, -3, 100, 7, -3, 7, 7];
        let bytes = LongEncoding::Table.encode_block(&values, ByteOrder::BigEndian);
        // 3 entries need 2 bits each: 7 values -> 14 bits -> 2 bytes
        assert_eq!(bytes.len(), 4 + 3 * 8 + 1 + 2);
        round_trip(LongEncoding::Table, &values);
    }

    #[test]
    fn bad_table_index_is_format_error() {
        let mut bytes = LongEncoding::Table.encode_block(&[1, 2], ByteOrder::LittleEndian);
        // one entry claimed, indexes still one bit wide
        bytes[0] = 1;
        bytes.drain(12..20);
        let err = LongEncoding::Table
            .decode_block(&bytes, 2, ByteOrder::LittleEndian)
            .unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn truncated_longs_block_is_format_error() {
        let err = LongEncoding::Longs
            .decode_block(&[0; 12], 2, ByteOrder::LittleEndian)
            .unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn bit_writer_spans_bytes() {
        let mut writer = BitWriter::new(Vec::new());
        writer.write(0b101, 3);
        writer.write(u64::MAX, 64);
        writer.write(0b1, 1);
        let buf = writer.finish();
        assert_eq!(buf.len(), 9);
        let mut reader = BitReader::new(&buf);
        assert_eq!(reader.read(3).unwrap(), 0b101);
        assert_eq!(reader.read(64).unwrap(), u64::MAX);
        assert_eq!(reader.read(1).unwrap(), 1);
    }
}
