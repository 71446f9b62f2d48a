//! Columnar segment codecs.
//!
//! Building blocks for immutable column files: packed dictionary ids,
//! block-compressed long and float columns with a versioned header, generic
//! indexed object columns, and the serializers that drive them during
//! ingestion. Columns are written once through [`container::StreamSink`] and
//! read back zero-copy from a [`Region`], usually a memory-mapped file.

pub mod blocks;
pub mod compression;
pub mod config;
pub mod container;
pub mod encoding;
pub mod error;
pub mod floats;
pub mod indexed;
pub mod longs;
pub mod metric;
pub mod order;
pub mod packed_ints;
pub mod serializer;

pub use compression::CompressionStrategy;
pub use config::CodecConfig;
pub use container::{DirContainer, MemoryContainer, Region, RegionSource, StreamSink};
pub use encoding::LongEncoding;
pub use error::{Error, Result};
pub use floats::{CompressedFloats, CompressedFloatsSupplier, CompressedFloatsWriter};
pub use indexed::{BytesStrategy, GenericIndexed, GenericIndexedWriter, ObjectStrategy, Utf8Strategy};
pub use longs::{CompressedLongs, CompressedLongsSupplier, CompressedLongsWriter};
pub use metric::{
    ComplexMetricColumnSerializer, ComplexMetricSerde, FloatMetricColumnSerializer,
    LongMetricColumnSerializer, MetricColumnSerializer, MetricHolder, MetricType,
};
pub use order::ByteOrder;
pub use packed_ints::PackedInts;
pub use serializer::{
    write_column, ComplexColumnSerializer, FloatColumnSerializer, GenericColumnSerializer,
    LongColumnSerializer, PackedIntsColumnSerializer,
};
