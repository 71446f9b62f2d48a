//! Runtime byte order for column payloads.
//!
//! Header integers and block contents follow the order chosen when the column
//! was built. Readers must be given the same order.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    #[default]
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    /// Name used in metric file names.
    pub fn file_tag(self) -> &'static str {
        match self {
            ByteOrder::LittleEndian => "LITTLE_ENDIAN",
            ByteOrder::BigEndian => "BIG_ENDIAN",
        }
    }

    pub fn u32_bytes(self, value: u32) -> [u8; 4] {
        match self {
            ByteOrder::LittleEndian => value.to_le_bytes(),
            ByteOrder::BigEndian => value.to_be_bytes(),
        }
    }

    pub fn i64_bytes(self, value: i64) -> [u8; 8] {
        match self {
            ByteOrder::LittleEndian => value.to_le_bytes(),
            ByteOrder::BigEndian => value.to_be_bytes(),
        }
    }

    pub fn f32_bytes(self, value: f32) -> [u8; 4] {
        self.u32_bytes(value.to_bits())
    }

    pub fn read_u32(self, buf: &[u8], offset: usize) -> Result<u32> {
        let raw: [u8; 4] = take(buf, offset)?;
        Ok(match self {
            ByteOrder::LittleEndian => u32::from_le_bytes(raw),
            ByteOrder::BigEndian => u32::from_be_bytes(raw),
        })
    }

    pub fn read_i64(self, buf: &[u8], offset: usize) -> Result<i64> {
        let raw: [u8; 8] = take(buf, offset)?;
        Ok(match self {
            ByteOrder::LittleEndian => i64::from_le_bytes(raw),
            ByteOrder::BigEndian => i64::from_be_bytes(raw),
        })
    }

    pub fn read_f32(self, buf: &[u8], offset: usize) -> Result<f32> {
        self.read_u32(buf, offset).map(f32::from_bits)
    }
}

fn take<const N: usize>(buf: &[u8], offset: usize) -> Result<[u8; N]> {
    offset
        .checked_add(N)
        .and_then(|end| buf.get(offset..end))
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| Error::truncated("field", offset.saturating_add(N), buf.len()))
}
