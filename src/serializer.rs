//! Column serializer lifecycle.
//!
//! Every column writer follows `open` -> `serialize`* -> `serialized_size` ->
//! `write_to`. Calls out of order fail with [`Error::InvalidState`] before any
//! I/O happens. A serializer is owned by a single ingestion thread; it performs
//! no locking of its own.
//!
//! Missing numeric values (`None`) are stored as zero.

use std::io::Write;
use std::mem;

use crate::compression::CompressionStrategy;
use crate::config::CodecConfig;
use crate::container::StreamSink;
use crate::encoding::LongEncoding;
use crate::floats::CompressedFloatsWriter;
use crate::indexed::{GenericIndexedWriter, ObjectStrategy};
use crate::longs::CompressedLongsWriter;
use crate::packed_ints::PackedInts;
use crate::{Error, Result};

pub trait GenericColumnSerializer {
    type Value;

    fn open(&mut self) -> Result<()>;

    fn serialize(&mut self, value: Option<Self::Value>) -> Result<()>;

    /// Exact size `write_to` will produce. Flushes buffered values, so no
    /// further `serialize` calls are accepted afterwards.
    fn serialized_size(&mut self) -> Result<u64>;

    /// Writes the column. Terminal: the serializer cannot be used again.
    fn write_to(&mut self, out: &mut dyn Write) -> Result<()>;
}

/// Writes a finished column as stream `name` of a container.
pub fn write_column<S, C>(serializer: &mut S, container: &mut C, name: &str) -> Result<u64>
where
    S: GenericColumnSerializer + ?Sized,
    C: StreamSink,
{
    let size = serializer.serialized_size()?;
    let mut out = container.open_output(name)?;
    serializer.write_to(&mut out)?;
    out.flush().map_err(|e| Error::io(name, e))?;
    Ok(size)
}

/// Runtime lifecycle state of a serializer's backing writer.
pub(crate) enum Lifecycle<W> {
    Unopened,
    Open(W),
    Done,
}

impl<W> Lifecycle<W> {
    pub(crate) fn ensure_unopened(&self) -> Result<()> {
        match self {
            Lifecycle::Unopened => Ok(()),
            Lifecycle::Open(_) => Err(Error::InvalidState("serializer already opened")),
            Lifecycle::Done => Err(Error::InvalidState("serializer already finished")),
        }
    }

    pub(crate) fn open_with(&mut self, make: impl FnOnce() -> W) -> Result<()> {
        self.ensure_unopened()?;
        *self = Lifecycle::Open(make());
        Ok(())
    }

    pub(crate) fn writer(&mut self) -> Result<&mut W> {
        match self {
            Lifecycle::Open(writer) => Ok(writer),
            Lifecycle::Unopened => Err(Error::InvalidState("serializer not opened")),
            Lifecycle::Done => Err(Error::InvalidState("serializer already finished")),
        }
    }

    /// Moves the writer out, leaving the serializer finished.
    pub(crate) fn finish(&mut self) -> Result<W> {
        self.writer()?;
        match mem::replace(self, Lifecycle::Done) {
            Lifecycle::Open(writer) => Ok(writer),
            _ => Err(Error::InvalidState("serializer not open")),
        }
    }
}

pub struct LongColumnSerializer {
    name: String,
    config: CodecConfig,
    state: Lifecycle<CompressedLongsWriter>,
}

impl LongColumnSerializer {
    pub fn create(filename_base: &str, compression: CompressionStrategy, encoding: LongEncoding) -> Self {
        let config = CodecConfig {
            compression,
            long_encoding: encoding,
            ..CodecConfig::default()
        };
        Self::with_config(filename_base, config)
    }

    pub fn with_config(filename_base: &str, config: CodecConfig) -> Self {
        Self {
            name: format!("{filename_base}.long_column"),
            config,
            state: Lifecycle::Unopened,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl GenericColumnSerializer for LongColumnSerializer {
    type Value = i64;

    fn open(&mut self) -> Result<()> {
        let (name, config) = (&self.name, &self.config);
        self.state
            .open_with(|| CompressedLongsWriter::open_with_config(name.as_str(), config))
    }

    fn serialize(&mut self, value: Option<i64>) -> Result<()> {
        self.state.writer()?.add(value.unwrap_or(0))
    }

    fn serialized_size(&mut self) -> Result<u64> {
        self.state.writer()?.serialized_size()
    }

    fn write_to(&mut self, out: &mut dyn Write) -> Result<()> {
        self.state.finish()?.write_to(out)
    }
}

pub struct FloatColumnSerializer {
    name: String,
    config: CodecConfig,
    state: Lifecycle<CompressedFloatsWriter>,
}

impl FloatColumnSerializer {
    pub fn create(filename_base: &str, compression: CompressionStrategy) -> Self {
        let config = CodecConfig {
            compression,
            ..CodecConfig::default()
        };
        Self::with_config(filename_base, config)
    }

    pub fn with_config(filename_base: &str, config: CodecConfig) -> Self {
        Self {
            name: format!("{filename_base}.float_column"),
            config,
            state: Lifecycle::Unopened,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl GenericColumnSerializer for FloatColumnSerializer {
    type Value = f32;

    fn open(&mut self) -> Result<()> {
        let (name, config) = (&self.name, &self.config);
        self.state
            .open_with(|| CompressedFloatsWriter::open_with_config(name.as_str(), config))
    }

    fn serialize(&mut self, value: Option<f32>) -> Result<()> {
        self.state.writer()?.add(value.unwrap_or(0.0))
    }

    fn serialized_size(&mut self) -> Result<u64> {
        self.state.writer()?.serialized_size()
    }

    fn write_to(&mut self, out: &mut dyn Write) -> Result<()> {
        self.state.finish()?.write_to(out)
    }
}

struct PackedIntsBuffer {
    values: Vec<i32>,
    packed: Option<PackedInts>,
}

/// Buffers dictionary ids and packs them at the width of a declared maximum.
pub struct PackedIntsColumnSerializer {
    max_value: i32,
    state: Lifecycle<PackedIntsBuffer>,
}

impl PackedIntsColumnSerializer {
    pub fn new(max_value: i32) -> Self {
        Self {
            max_value,
            state: Lifecycle::Unopened,
        }
    }

    fn packed(&mut self) -> Result<&PackedInts> {
        let max_value = self.max_value;
        let buffer = self.state.writer()?;
        if buffer.packed.is_none() {
            buffer.packed = Some(PackedInts::from_slice_with_max(&buffer.values, max_value)?);
        }
        buffer
            .packed
            .as_ref()
            .ok_or(Error::InvalidState("packed ints missing"))
    }
}

impl GenericColumnSerializer for PackedIntsColumnSerializer {
    type Value = i32;

    fn open(&mut self) -> Result<()> {
        crate::packed_ints::width_for(self.max_value)?;
        self.state.open_with(|| PackedIntsBuffer {
            values: Vec::new(),
            packed: None,
        })
    }

    fn serialize(&mut self, value: Option<i32>) -> Result<()> {
        let max_value = self.max_value;
        let buffer = self.state.writer()?;
        if buffer.packed.is_some() {
            return Err(Error::InvalidState("column already sized; no more values accepted"));
        }
        let value = value.unwrap_or(0);
        if value < 0 || value > max_value {
            return Err(Error::InvalidInput(format!(
                "val[{value}] outside [0, {max_value}], i[{}]",
                buffer.values.len()
            )));
        }
        buffer.values.push(value);
        Ok(())
    }

    fn serialized_size(&mut self) -> Result<u64> {
        Ok(self.packed()?.serialized_size())
    }

    fn write_to(&mut self, out: &mut dyn Write) -> Result<()> {
        self.packed()?;
        let buffer = self.state.finish()?;
        match buffer.packed {
            Some(packed) => packed.write_to(out),
            None => Err(Error::InvalidState("packed ints missing")),
        }
    }
}

/// Column of complex objects; absent values are kept as absent entries.
pub struct ComplexColumnSerializer<S: ObjectStrategy> {
    name: String,
    strategy: Option<S>,
    state: Lifecycle<GenericIndexedWriter<S>>,
}

impl<S: ObjectStrategy> ComplexColumnSerializer<S> {
    pub fn new(filename_base: &str, strategy: S) -> Self {
        Self {
            name: format!("{filename_base}.complex_column"),
            strategy: Some(strategy),
            state: Lifecycle::Unopened,
        }
    }
}

impl<S: ObjectStrategy> GenericColumnSerializer for ComplexColumnSerializer<S> {
    type Value = S::Value;

    fn open(&mut self) -> Result<()> {
        self.state.ensure_unopened()?;
        let strategy = self
            .strategy
            .take()
            .ok_or(Error::InvalidState("serializer already opened"))?;
        let name = self.name.clone();
        self.state.open_with(|| GenericIndexedWriter::open(name, strategy))
    }

    fn serialize(&mut self, value: Option<S::Value>) -> Result<()> {
        self.state.writer()?.write(value.as_ref())
    }

    fn serialized_size(&mut self) -> Result<u64> {
        Ok(self.state.writer()?.serialized_size())
    }

    fn write_to(&mut self, out: &mut dyn Write) -> Result<()> {
        self.state.finish()?.write_to(out)
    }
}
