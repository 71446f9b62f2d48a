//! Fixed-width packed integer arrays.
//!
//! Every value is stored in the smallest byte width (1 to 4) that can hold the
//! declared maximum. The payload carries `4 - width` trailing pad bytes so any
//! element can be fetched with a single big-endian 4-byte read followed by a
//! right shift.
//!
//! # Layout
//!
//! ```text
//! [version:1 = 0x00][width:1][payloadLength:i32 BE][payload: payloadLength bytes]
//! ```
//!
//! `payloadLength` includes the padding. Packed values are big-endian
//! regardless of the column byte order.

use std::cmp::Ordering;
use std::io::Write;

use crate::container::{write_fully, Region};
use crate::{Error, Result};

pub const VERSION: u8 = 0x00;
/// version + width + payload length
pub const META_SIZE: usize = 1 + 1 + 4;

/// Minimal byte width able to represent `max_value`.
pub fn width_for(max_value: i32) -> Result<u8> {
    if max_value < 0 {
        return Err(Error::InvalidInput(format!(
            "maxValue[{max_value}] must be non-negative"
        )));
    }
    Ok(match max_value {
        0..=0xFF => 1,
        0x100..=0xFFFF => 2,
        0x1_0000..=0xFF_FFFF => 3,
        _ => 4,
    })
}

/// Immutable packed array, either freshly built or viewed over mapped bytes.
#[derive(Clone, Debug)]
pub struct PackedInts {
    buffer: Region,
    num_bytes: u8,
    size: usize,
}

impl PackedInts {
    pub fn empty() -> Self {
        // An empty slice with max 0 cannot fail.
        Self::build(&[], 1)
    }

    /// Packs `values` using their own maximum as the declared bound.
    pub fn from_slice(values: &[i32]) -> Result<Self> {
        let max = values.iter().copied().max().unwrap_or(0);
        Self::from_slice_with_max(values, max)
    }

    /// Packs `values` at the width implied by `max_value`.
    ///
    /// Every value is checked against the declared bound before anything is
    /// packed; a value above it would be truncated on read.
    pub fn from_slice_with_max(values: &[i32], max_value: i32) -> Result<Self> {
        let num_bytes = width_for(max_value)?;
        for (i, &val) in values.iter().enumerate() {
            if val < 0 {
                return Err(Error::InvalidInput(format!(
                    "integer values must be non-negative, got[{val}], i[{i}]"
                )));
            }
            if val > max_value {
                return Err(Error::InvalidInput(format!(
                    "val[{val}] > maxValue[{max_value}], i[{i}]"
                )));
            }
        }
        Ok(Self::build(values, num_bytes))
    }

    fn build(values: &[i32], num_bytes: u8) -> Self {
        let width = num_bytes as usize;
        let mut buf = Vec::with_capacity(values.len() * width + (4 - width));
        for &val in values {
            buf.extend_from_slice(&val.to_be_bytes()[4 - width..]);
        }
        buf.resize(buf.len() + (4 - width), 0);
        Self {
            buffer: Region::from_vec(buf),
            num_bytes,
            size: values.len(),
        }
    }

    /// Reads one array from the front of `region` and advances past it.
    pub fn read_from(region: &mut Region) -> Result<Self> {
        if region.len() < META_SIZE {
            return Err(Error::truncated("packed ints header", META_SIZE, region.len()));
        }
        let version = region[0];
        if version != VERSION {
            return Err(Error::Format(format!("unknown version[{version:#04x}]")));
        }
        let num_bytes = region[1];
        if !(1..=4).contains(&num_bytes) {
            return Err(Error::Format(format!("bad width[{num_bytes}]")));
        }
        let payload_len = i32::from_be_bytes([region[2], region[3], region[4], region[5]]);
        let payload_len = usize::try_from(payload_len)
            .map_err(|_| Error::Format(format!("negative payload length[{payload_len}]")))?;
        let padding = 4 - num_bytes as usize;
        if payload_len < padding || (payload_len - padding) % num_bytes as usize != 0 {
            return Err(Error::Format(format!(
                "payload length[{payload_len}] does not fit width[{num_bytes}]"
            )));
        }

        region.split_to(META_SIZE)?;
        let buffer = region.split_to(payload_len)?;
        Ok(Self {
            buffer,
            num_bytes,
            size: (payload_len - padding) / num_bytes as usize,
        })
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn num_bytes(&self) -> u8 {
        self.num_bytes
    }

    pub fn get(&self, index: usize) -> Result<i32> {
        if index >= self.size {
            return Err(Error::InvalidInput(format!(
                "index[{index}] out of bounds for size[{}]",
                self.size
            )));
        }
        Ok(self.get_unchecked(index))
    }

    fn get_unchecked(&self, index: usize) -> i32 {
        let offset = index * self.num_bytes as usize;
        let bytes = &self.buffer[offset..offset + 4];
        let word = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        (word >> (32 - 8 * self.num_bytes as u32)) as i32
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            ints: self,
            index: 0,
        }
    }

    /// Payload including the trailing padding.
    pub fn bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn bytes_no_padding(&self) -> &[u8] {
        &self.buffer[..self.size * self.num_bytes as usize]
    }

    pub fn write_bytes_no_padding(&self, out: &mut dyn Write) -> Result<()> {
        write_fully(out, self.bytes_no_padding(), "packed ints")
    }

    pub fn serialized_size(&self) -> u64 {
        (META_SIZE + self.buffer.len()) as u64
    }

    pub fn write_to(&self, out: &mut dyn Write) -> Result<()> {
        let payload_len = i32::try_from(self.buffer.len()).map_err(|_| {
            Error::InvalidInput(format!("payload of {} bytes too large", self.buffer.len()))
        })?;
        let mut meta = [0u8; META_SIZE];
        meta[0] = VERSION;
        meta[1] = self.num_bytes;
        meta[2..6].copy_from_slice(&payload_len.to_be_bytes());
        write_fully(out, &meta, "packed ints header")?;
        write_fully(out, &self.buffer, "packed ints payload")
    }
}

impl PartialEq for PackedInts {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PackedInts {}

impl PartialOrd for PackedInts {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Width first, then raw bytes compared as signed. Usable as a sort or dedup
/// key; this is not a numeric comparison of the decoded values.
impl Ord for PackedInts {
    fn cmp(&self, other: &Self) -> Ordering {
        self.num_bytes.cmp(&other.num_bytes).then_with(|| {
            let signed = |b: &u8| *b as i8;
            self.bytes().iter().map(signed).cmp(other.bytes().iter().map(signed))
        })
    }
}

pub struct Iter<'a> {
    ints: &'a PackedInts,
    index: usize,
}

impl Iterator for Iter<'_> {
    type Item = i32;

    fn next(&mut self) -> Option<i32> {
        if self.index >= self.ints.size {
            return None;
        }
        let val = self.ints.get_unchecked(self.index);
        self.index += 1;
        Some(val)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.ints.size - self.index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl<'a> IntoIterator for &'a PackedInts {
    type Item = i32;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}
