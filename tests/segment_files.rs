use std::fs;

use column_codec::metric::metric_file_path;
use column_codec::{
    write_column, ByteOrder, CodecConfig, ComplexColumnSerializer, CompressedFloatsSupplier,
    CompressedLongsSupplier, CompressionStrategy, DirContainer, Error, FloatColumnSerializer,
    GenericColumnSerializer, GenericIndexed, LongColumnSerializer, LongEncoding,
    LongMetricColumnSerializer, MetricColumnSerializer, MetricHolder, MetricType, PackedInts,
    PackedIntsColumnSerializer, RegionSource, Utf8Strategy,
};
use tempfile::tempdir;

#[test]
fn columns_written_to_directory_read_back_through_mmap() {
    let dir = tempdir().expect("tempdir");
    let mut container = DirContainer::open(dir.path().join("segment")).expect("open container");

    let config = CodecConfig {
        byte_order: ByteOrder::BigEndian,
        compression: CompressionStrategy::Zstd,
        long_encoding: LongEncoding::Delta,
        block_bytes: 256,
        ..CodecConfig::default()
    };

    let mut longs = LongColumnSerializer::with_config("ts", config.clone());
    longs.open().expect("open longs");
    let timestamps: Vec<i64> = (0..1000).map(|i| 1_700_000_000_000 + i * 60_000).collect();
    for (i, &ts) in timestamps.iter().enumerate() {
        longs.serialize((i % 97 != 0).then_some(ts)).expect("serialize long");
    }
    let long_name = longs.name().to_string();
    let long_size = write_column(&mut longs, &mut container, &long_name).expect("write longs");
    assert_eq!(long_name, "ts.long_column");

    let mut floats = FloatColumnSerializer::with_config("price", config.clone());
    floats.open().expect("open floats");
    for i in 0..300 {
        floats.serialize(Some(i as f32 / 4.0)).expect("serialize float");
    }
    let float_name = floats.name().to_string();
    write_column(&mut floats, &mut container, &float_name).expect("write floats");

    let mut ids = PackedIntsColumnSerializer::new(70_000);
    ids.open().expect("open ids");
    for i in 0..500 {
        ids.serialize(Some(i * 131 % 70_001)).expect("serialize id");
    }
    write_column(&mut ids, &mut container, "dim.ids").expect("write ids");

    let mut labels = ComplexColumnSerializer::new("label", Utf8Strategy);
    labels.open().expect("open labels");
    labels.serialize(Some("eu-west".to_string())).expect("serialize label");
    labels.serialize(None).expect("serialize label");
    write_column(&mut labels, &mut container, "label.complex_column").expect("write labels");

    let path = container.stream_path(&long_name).expect("path");
    assert_eq!(fs::metadata(&path).expect("stat").len(), long_size);

    let mut region = container.map_region(&long_name).expect("map longs");
    let supplier = CompressedLongsSupplier::from_region(&mut region, ByteOrder::BigEndian).expect("read longs");
    assert_eq!(supplier.size_per(), 32);
    assert_eq!(supplier.encoding(), LongEncoding::Delta);
    let mut column = supplier.get();
    assert_eq!(column.get(0).expect("get"), 0);
    assert_eq!(column.get(1).expect("get"), timestamps[1]);
    assert_eq!(column.get(999).expect("get"), timestamps[999]);

    let mut region = container.map_region(&float_name).expect("map floats");
    let floats = CompressedFloatsSupplier::from_region(&mut region, ByteOrder::BigEndian).expect("read floats");
    assert_eq!(floats.get().get(299).expect("get"), 74.75);

    let mut region = container.map_region("dim.ids").expect("map ids");
    let ids = PackedInts::read_from(&mut region).expect("read ids");
    assert_eq!(ids.num_bytes(), 3);
    assert_eq!(ids.len(), 500);
    assert_eq!(ids.get(499).expect("get"), 499 * 131 % 70_001);

    let mut region = container.map_region("label.complex_column").expect("map labels");
    let labels = GenericIndexed::read_from(&mut region, Utf8Strategy).expect("read labels");
    assert_eq!(labels.get(0).expect("get"), Some("eu-west".to_string()));
    assert_eq!(labels.get(1).expect("get"), None);
}

#[test]
fn stored_column_can_be_copied_byte_for_byte() {
    let dir = tempdir().expect("tempdir");
    let mut container = DirContainer::open(dir.path()).expect("open container");

    let mut longs = LongColumnSerializer::create("count", CompressionStrategy::Lz4, LongEncoding::Table);
    longs.open().expect("open");
    for i in 0..20_000 {
        longs.serialize(Some(i % 5)).expect("serialize");
    }
    write_column(&mut longs, &mut container, "count.long_column").expect("write");

    let original = container.map_region("count.long_column").expect("map");
    let supplier =
        CompressedLongsSupplier::from_region(&mut original.clone(), ByteOrder::LittleEndian).expect("read");
    assert_eq!(supplier.serialized_size(), original.len() as u64);

    let mut copy = Vec::new();
    supplier.write_to(&mut copy).expect("rewrite");
    assert_eq!(&copy[..], &original[..]);
}

#[test]
fn metric_file_round_trip_in_segment_directory() {
    let dir = tempdir().expect("tempdir");
    let mut metric = LongMetricColumnSerializer::new(
        "bytes",
        dir.path(),
        CompressionStrategy::Lz4,
        LongEncoding::LEGACY,
    );
    metric.open().expect("open");
    for v in [10, 20, 30] {
        metric.serialize(Some(v)).expect("serialize");
    }
    let path = metric.close().expect("close");
    assert_eq!(path, metric_file_path(dir.path(), "bytes", ByteOrder::LittleEndian));

    let holder = MetricHolder::read_file(&path).expect("read holder");
    assert_eq!(holder.metric_type, MetricType::Long);
    let supplier = holder.long_column(ByteOrder::LittleEndian).expect("column");
    assert!(!supplier.has_encoding_id());
    assert_eq!(supplier.get().to_vec().expect("values"), vec![10, 20, 30]);

    assert!(matches!(metric.serialize(Some(1)), Err(Error::InvalidState(_))));
}

#[test]
fn stream_names_may_not_escape_the_directory() {
    let dir = tempdir().expect("tempdir");
    let container = DirContainer::open(dir.path()).expect("open container");
    assert!(matches!(container.stream_path("../x"), Err(Error::InvalidInput(_))));
    assert!(matches!(container.map_region("missing"), Err(Error::Io { .. })));
}
