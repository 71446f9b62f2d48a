//! Standalone metric files.
//!
//! Legacy segments keep each metric in its own file instead of a stream of a
//! shared container. A metric file is a small holder header followed by the
//! column payload:
//!
//! ```text
//! [version:1 = 0x00][nameLen:u32 BE][name utf-8][typeLen:u32 BE][type utf-8][payload]
//! ```
//!
//! `type` is `long`, `float`, or the type name of a complex metric. Files are
//! named `met_{name}_{ORDER}.drd` and may not exceed the configured ceiling.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::compression::CompressionStrategy;
use crate::config::CodecConfig;
use crate::container::{map_file, write_fully, Region};
use crate::encoding::LongEncoding;
use crate::error::IoContext;
use crate::floats::{CompressedFloatsSupplier, CompressedFloatsWriter};
use crate::indexed::{GenericIndexed, GenericIndexedWriter, ObjectStrategy};
use crate::longs::{CompressedLongsSupplier, CompressedLongsWriter};
use crate::order::ByteOrder;
use crate::serializer::Lifecycle;
use crate::{Error, Result};

pub const HOLDER_VERSION: u8 = 0x00;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricType {
    Long,
    Float,
    Complex(String),
}

impl MetricType {
    pub fn type_name(&self) -> &str {
        match self {
            MetricType::Long => "long",
            MetricType::Float => "float",
            MetricType::Complex(name) => name,
        }
    }

    fn from_type_name(name: String) -> Self {
        match name.as_str() {
            "long" => MetricType::Long,
            "float" => MetricType::Float,
            _ => MetricType::Complex(name),
        }
    }
}

/// A parsed metric file: holder header plus the undecoded column payload.
#[derive(Debug, Clone)]
pub struct MetricHolder {
    pub name: String,
    pub metric_type: MetricType,
    pub payload: Region,
}

impl MetricHolder {
    pub fn read(mut region: Region) -> Result<Self> {
        let version = *region
            .first()
            .ok_or_else(|| Error::truncated("metric header", 1, 0))?;
        if version != HOLDER_VERSION {
            return Err(Error::Format(format!("unknown version[{version:#04x}]")));
        }
        region.split_to(1)?;
        let name = read_string(&mut region)?;
        let type_name = read_string(&mut region)?;
        Ok(Self {
            name,
            metric_type: MetricType::from_type_name(type_name),
            payload: region,
        })
    }

    pub fn read_file(path: &Path) -> Result<Self> {
        Self::read(map_file(path)?)
    }

    pub fn long_column(&self, order: ByteOrder) -> Result<CompressedLongsSupplier> {
        self.expect_type(&MetricType::Long)?;
        CompressedLongsSupplier::from_region(&mut self.payload.clone(), order)
    }

    pub fn float_column(&self, order: ByteOrder) -> Result<CompressedFloatsSupplier> {
        self.expect_type(&MetricType::Float)?;
        CompressedFloatsSupplier::from_region(&mut self.payload.clone(), order)
    }

    pub fn complex_column<S: ObjectStrategy>(&self, strategy: S) -> Result<GenericIndexed<S>> {
        if !matches!(self.metric_type, MetricType::Complex(_)) {
            return Err(Error::InvalidInput(format!(
                "metric {} is {}, not complex",
                self.name,
                self.metric_type.type_name()
            )));
        }
        GenericIndexed::read_from(&mut self.payload.clone(), strategy)
    }

    fn expect_type(&self, expected: &MetricType) -> Result<()> {
        if &self.metric_type != expected {
            return Err(Error::InvalidInput(format!(
                "metric {} is {}, not {}",
                self.name,
                self.metric_type.type_name(),
                expected.type_name()
            )));
        }
        Ok(())
    }
}

fn write_string(out: &mut dyn Write, value: &str, context: &str) -> Result<()> {
    let len = u32::try_from(value.len())
        .map_err(|_| Error::InvalidInput(format!("string of {} bytes too long", value.len())))?;
    write_fully(out, &len.to_be_bytes(), context)?;
    write_fully(out, value.as_bytes(), context)
}

fn read_string(region: &mut Region) -> Result<String> {
    let len = ByteOrder::BigEndian.read_u32(region, 0)? as usize;
    region.split_to(4)?;
    let bytes = region.split_to(len)?;
    String::from_utf8(bytes.to_vec()).map_err(|e| Error::Format(format!("bad utf-8 string: {e}")))
}

pub fn metric_file_path(dir: &Path, metric_name: &str, order: ByteOrder) -> PathBuf {
    dir.join(format!("met_{}_{}.drd", metric_name, order.file_tag()))
}

/// Fails with [`Error::CapacityExceeded`] if the file is larger than `limit`.
pub fn check_file_size(path: &Path, limit: u64) -> Result<u64> {
    let size = std::fs::metadata(path)
        .io_context(|| format!("stat {}", path.display()))?
        .len();
    if size > limit {
        return Err(Error::CapacityExceeded {
            path: path.to_path_buf(),
            size,
            limit,
        });
    }
    Ok(size)
}

/// Replaces `path` with a holder header plus the payload written by `payload`.
fn write_metric_file(
    path: &Path,
    metric_name: &str,
    type_name: &str,
    limit: u64,
    payload: impl FnOnce(&mut dyn Write) -> Result<()>,
) -> Result<u64> {
    let context = path.display().to_string();
    match std::fs::remove_file(path) {
        Ok(()) => debug!("replacing existing metric file {context}"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(Error::io(context, err)),
    }

    let file = File::create(path).io_context(|| context.clone())?;
    let mut out = BufWriter::new(file);
    write_fully(&mut out, &[HOLDER_VERSION], &context)?;
    write_string(&mut out, metric_name, &context)?;
    write_string(&mut out, type_name, &context)?;
    payload(&mut out)?;
    let file = out
        .into_inner()
        .map_err(|err| Error::io(context.clone(), err.into_error()))?;
    file.sync_all().io_context(|| context.clone())?;

    let size = check_file_size(path, limit)?;
    info!("wrote metric {metric_name} ({type_name}) to {context}: {size} bytes");
    Ok(size)
}

/// Lifecycle of a metric persisted as its own file.
///
/// `open` -> `serialize`* -> `close` (or `close_file` with an explicit path).
/// The serializer cannot be reused once closed.
pub trait MetricColumnSerializer {
    type Value;

    fn open(&mut self) -> Result<()>;

    fn serialize(&mut self, value: Option<Self::Value>) -> Result<()>;

    /// Writes the metric to its canonical file under the output directory.
    fn close(&mut self) -> Result<PathBuf>;

    fn close_file(&mut self, path: &Path) -> Result<()>;
}

pub struct LongMetricColumnSerializer {
    metric_name: String,
    out_dir: PathBuf,
    config: CodecConfig,
    state: Lifecycle<CompressedLongsWriter>,
}

impl LongMetricColumnSerializer {
    pub fn new(
        metric_name: &str,
        out_dir: impl Into<PathBuf>,
        compression: CompressionStrategy,
        encoding: LongEncoding,
    ) -> Self {
        let config = CodecConfig {
            compression,
            long_encoding: encoding,
            ..CodecConfig::default()
        };
        Self::with_config(metric_name, out_dir, config)
    }

    pub fn with_config(metric_name: &str, out_dir: impl Into<PathBuf>, config: CodecConfig) -> Self {
        Self {
            metric_name: metric_name.to_string(),
            out_dir: out_dir.into(),
            config,
            state: Lifecycle::Unopened,
        }
    }
}

impl MetricColumnSerializer for LongMetricColumnSerializer {
    type Value = i64;

    fn open(&mut self) -> Result<()> {
        let name = format!("{}_little", self.metric_name);
        let config = &self.config;
        self.state
            .open_with(|| CompressedLongsWriter::open_with_config(name, config))
    }

    fn serialize(&mut self, value: Option<i64>) -> Result<()> {
        self.state.writer()?.add(value.unwrap_or(0))
    }

    fn close(&mut self) -> Result<PathBuf> {
        let path = metric_file_path(&self.out_dir, &self.metric_name, self.config.byte_order);
        self.close_file(&path)?;
        Ok(path)
    }

    fn close_file(&mut self, path: &Path) -> Result<()> {
        let writer = self.state.finish()?;
        write_metric_file(
            path,
            &self.metric_name,
            MetricType::Long.type_name(),
            self.config.max_file_size,
            |out| writer.write_to(out),
        )?;
        Ok(())
    }
}

pub struct FloatMetricColumnSerializer {
    metric_name: String,
    out_dir: PathBuf,
    config: CodecConfig,
    state: Lifecycle<CompressedFloatsWriter>,
}

impl FloatMetricColumnSerializer {
    pub fn new(metric_name: &str, out_dir: impl Into<PathBuf>, compression: CompressionStrategy) -> Self {
        let config = CodecConfig {
            compression,
            ..CodecConfig::default()
        };
        Self::with_config(metric_name, out_dir, config)
    }

    pub fn with_config(metric_name: &str, out_dir: impl Into<PathBuf>, config: CodecConfig) -> Self {
        Self {
            metric_name: metric_name.to_string(),
            out_dir: out_dir.into(),
            config,
            state: Lifecycle::Unopened,
        }
    }
}

impl MetricColumnSerializer for FloatMetricColumnSerializer {
    type Value = f32;

    fn open(&mut self) -> Result<()> {
        let name = format!("{}_little", self.metric_name);
        let config = &self.config;
        self.state
            .open_with(|| CompressedFloatsWriter::open_with_config(name, config))
    }

    fn serialize(&mut self, value: Option<f32>) -> Result<()> {
        self.state.writer()?.add(value.unwrap_or(0.0))
    }

    fn close(&mut self) -> Result<PathBuf> {
        let path = metric_file_path(&self.out_dir, &self.metric_name, self.config.byte_order);
        self.close_file(&path)?;
        Ok(path)
    }

    fn close_file(&mut self, path: &Path) -> Result<()> {
        let writer = self.state.finish()?;
        write_metric_file(
            path,
            &self.metric_name,
            MetricType::Float.type_name(),
            self.config.max_file_size,
            |out| writer.write_to(out),
        )?;
        Ok(())
    }
}

/// Serialization hooks for a complex metric type.
pub trait ComplexMetricSerde {
    type Strategy: ObjectStrategy;

    fn type_name(&self) -> &str;

    fn object_strategy(&self) -> Self::Strategy;
}

pub struct ComplexMetricColumnSerializer<T: ComplexMetricSerde> {
    metric_name: String,
    out_dir: PathBuf,
    serde: T,
    order: ByteOrder,
    max_file_size: u64,
    state: Lifecycle<GenericIndexedWriter<T::Strategy>>,
}

impl<T: ComplexMetricSerde> ComplexMetricColumnSerializer<T> {
    pub fn new(metric_name: &str, out_dir: impl Into<PathBuf>, serde: T) -> Self {
        let config = CodecConfig::default();
        Self {
            metric_name: metric_name.to_string(),
            out_dir: out_dir.into(),
            serde,
            order: config.byte_order,
            max_file_size: config.max_file_size,
            state: Lifecycle::Unopened,
        }
    }

    pub fn with_max_file_size(mut self, limit: u64) -> Self {
        self.max_file_size = limit;
        self
    }
}

impl<T: ComplexMetricSerde> MetricColumnSerializer for ComplexMetricColumnSerializer<T> {
    type Value = <T::Strategy as ObjectStrategy>::Value;

    fn open(&mut self) -> Result<()> {
        let dir_name = self
            .out_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = format!("{}_{}", self.metric_name, dir_name);
        let serde = &self.serde;
        self.state
            .open_with(|| GenericIndexedWriter::open(name, serde.object_strategy()))
    }

    fn serialize(&mut self, value: Option<Self::Value>) -> Result<()> {
        self.state.writer()?.write(value.as_ref())
    }

    fn close(&mut self) -> Result<PathBuf> {
        let path = metric_file_path(&self.out_dir, &self.metric_name, self.order);
        self.close_file(&path)?;
        Ok(path)
    }

    fn close_file(&mut self, path: &Path) -> Result<()> {
        let writer = self.state.finish()?;
        write_metric_file(
            path,
            &self.metric_name,
            self.serde.type_name(),
            self.max_file_size,
            |out| writer.write_to(out),
        )?;
        Ok(())
    }
}
