//! Generic indexed object columns.
//!
//! Stores variable-length serialized objects with an end-offset table so any
//! element can be located without scanning.
//!
//! ```text
//! [version:1 = 0x01][reverseLookup:1 = 0x00][bytesUsed:i32][count:i32]
//! [endOffset:i32]*count [entry]*count
//! entry = [present:1][object bytes]
//! ```
//!
//! Integers are big-endian. `bytesUsed` counts everything after itself.

use std::io::Write;

use crate::container::{write_fully, Region};
use crate::{Error, Result};

pub const VERSION: u8 = 0x01;
const META_SIZE: usize = 1 + 1 + 4 + 4;

/// Converts objects to and from their stored bytes.
pub trait ObjectStrategy {
    type Value;

    fn to_bytes(&self, value: &Self::Value) -> Vec<u8>;

    fn from_bytes(&self, bytes: &[u8]) -> Result<Self::Value>;
}

/// Raw byte strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesStrategy;

impl ObjectStrategy for BytesStrategy {
    type Value = Vec<u8>;

    fn to_bytes(&self, value: &Vec<u8>) -> Vec<u8> {
        value.clone()
    }

    fn from_bytes(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}

/// UTF-8 strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8Strategy;

impl ObjectStrategy for Utf8Strategy {
    type Value = String;

    fn to_bytes(&self, value: &String) -> Vec<u8> {
        value.as_bytes().to_vec()
    }

    fn from_bytes(&self, bytes: &[u8]) -> Result<String> {
        String::from_utf8(bytes.to_vec()).map_err(|e| Error::Format(format!("bad utf-8: {e}")))
    }
}

pub struct GenericIndexedWriter<S: ObjectStrategy> {
    name: String,
    strategy: S,
    end_offsets: Vec<u32>,
    values: Vec<u8>,
}

impl<S: ObjectStrategy> GenericIndexedWriter<S> {
    pub fn open(name: impl Into<String>, strategy: S) -> Self {
        Self {
            name: name.into(),
            strategy,
            end_offsets: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.end_offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.end_offsets.is_empty()
    }

    /// Appends one object; `None` is stored as an absent entry.
    pub fn write(&mut self, value: Option<&S::Value>) -> Result<()> {
        match value {
            Some(value) => {
                self.values.push(1);
                self.values.extend_from_slice(&self.strategy.to_bytes(value));
            }
            None => self.values.push(0),
        }
        let end = u32::try_from(self.values.len())
            .ok()
            .filter(|end| *end <= i32::MAX as u32)
            .ok_or_else(|| Error::InvalidInput(format!("column {} exceeds 2GiB", self.name)))?;
        self.end_offsets.push(end);
        Ok(())
    }

    pub fn serialized_size(&self) -> u64 {
        (META_SIZE + self.end_offsets.len() * 4 + self.values.len()) as u64
    }

    pub fn write_to(self, out: &mut dyn Write) -> Result<()> {
        let bytes_used = 4 + self.end_offsets.len() * 4 + self.values.len();
        let bytes_used = i32::try_from(bytes_used)
            .map_err(|_| Error::InvalidInput(format!("column {} exceeds 2GiB", self.name)))?;
        let mut meta = Vec::with_capacity(META_SIZE + self.end_offsets.len() * 4);
        meta.push(VERSION);
        meta.push(0);
        meta.extend_from_slice(&bytes_used.to_be_bytes());
        meta.extend_from_slice(&(self.end_offsets.len() as i32).to_be_bytes());
        for end in &self.end_offsets {
            meta.extend_from_slice(&end.to_be_bytes());
        }
        write_fully(out, &meta, &self.name)?;
        write_fully(out, &self.values, &self.name)
    }
}

/// Read-only view over a generic indexed column.
pub struct GenericIndexed<S: ObjectStrategy> {
    strategy: S,
    offsets: Region,
    values: Region,
    count: usize,
}

impl<S: ObjectStrategy> GenericIndexed<S> {
    /// Reads a column from the front of `region` and advances past it.
    pub fn read_from(region: &mut Region, strategy: S) -> Result<Self> {
        if region.len() < META_SIZE {
            return Err(Error::truncated("indexed header", META_SIZE, region.len()));
        }
        let version = region[0];
        if version != VERSION {
            return Err(Error::Format(format!("unknown version[{version:#04x}]")));
        }
        let bytes_used = read_be_i32(region, 2)?;
        let count = read_be_i32(region, 6)?;
        let (bytes_used, count) = match (usize::try_from(bytes_used), usize::try_from(count)) {
            (Ok(b), Ok(c)) if c.checked_mul(4).map_or(false, |o| o + 4 <= b) => (b, c),
            _ => {
                return Err(Error::Format(format!(
                    "bad indexed sizes: bytesUsed[{bytes_used}] count[{count}]"
                )))
            }
        };
        region.split_to(6)?;
        let mut body = region.split_to(bytes_used)?;
        body.split_to(4)?;
        let offsets = body.split_to(count * 4)?;
        Ok(Self {
            strategy,
            offsets,
            values: body,
            count,
        })
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn get_bytes(&self, index: usize) -> Result<Option<&[u8]>> {
        if index >= self.count {
            return Err(Error::InvalidInput(format!(
                "index[{index}] out of bounds for size[{}]",
                self.count
            )));
        }
        let start = match index {
            0 => 0,
            _ => read_be_i32(&self.offsets, (index - 1) * 4)? as usize,
        };
        let end = read_be_i32(&self.offsets, index * 4)? as usize;
        let entry = self
            .values
            .get(start..end)
            .filter(|entry| !entry.is_empty())
            .ok_or_else(|| Error::Format(format!("bad entry bounds[{start}, {end})")))?;
        Ok(match entry[0] {
            0 => None,
            _ => Some(&entry[1..]),
        })
    }

    pub fn get(&self, index: usize) -> Result<Option<S::Value>> {
        match self.get_bytes(index)? {
            Some(bytes) => self.strategy.from_bytes(bytes).map(Some),
            None => Ok(None),
        }
    }
}

fn read_be_i32(buf: &[u8], offset: usize) -> Result<i32> {
    buf.get(offset..offset + 4)
        .map(|b| i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| Error::truncated("indexed field", offset + 4, buf.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_round_trip_with_absent_entries() -> Result<()> {
        let mut writer = GenericIndexedWriter::open("names", Utf8Strategy);
        writer.write(Some(&"alpha".to_string()))?;
        writer.write(None)?;
        writer.write(Some(&String::new()))?;
        writer.write(Some(&"gamma".to_string()))?;
        let size = writer.serialized_size();
        let mut out = Vec::new();
        writer.write_to(&mut out)?;
        assert_eq!(out.len() as u64, size);
        out.push(0xEE);

        let mut region = Region::from_vec(out);
        let indexed = GenericIndexed::read_from(&mut region, Utf8Strategy)?;
        assert_eq!(indexed.len(), 4);
        assert_eq!(indexed.get(0)?, Some("alpha".to_string()));
        assert_eq!(indexed.get(1)?, None);
        assert_eq!(indexed.get(2)?, Some(String::new()));
        assert_eq!(indexed.get(3)?, Some("gamma".to_string()));
        assert!(matches!(indexed.get(4), Err(Error::InvalidInput(_))));
        assert_eq!(&region[..], &[0xEE]);
        Ok(())
    }

    #[test]
    fn empty_column() -> Result<()> {
        let writer = GenericIndexedWriter::open("empty", BytesStrategy);
        let mut out = Vec::new();
        writer.write_to(&mut out)?;
        let mut region = Region::from_vec(out);
        assert!(GenericIndexed::read_from(&mut region, BytesStrategy)?.is_empty());
        Ok(())
    }

    #[test]
    fn unknown_version_is_format_error() {
        let mut region = Region::from_vec(vec![0x05, 0, 0, 0, 0, 4, 0, 0, 0, 0]);
        assert!(matches!(
            GenericIndexed::read_from(&mut region, BytesStrategy),
            Err(Error::Format(_))
        ));
    }
}
