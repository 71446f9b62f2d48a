//! Property tests for the column codecs.
//!
//! Arbitrary inputs must survive a write/read cycle for every combination of
//! byte order, compression and long encoding.

use column_codec::{
    ByteOrder, CompressedFloatsSupplier, CompressedFloatsWriter, CompressedLongsSupplier,
    CompressedLongsWriter, CompressionStrategy, LongEncoding, PackedInts, Region,
};
use proptest::prelude::*;

fn byte_order() -> impl Strategy<Value = ByteOrder> {
    prop_oneof![Just(ByteOrder::LittleEndian), Just(ByteOrder::BigEndian)]
}

fn compression() -> impl Strategy<Value = CompressionStrategy> {
    prop::sample::select(CompressionStrategy::ALL.to_vec())
}

fn encoding() -> impl Strategy<Value = LongEncoding> {
    prop::sample::select(LongEncoding::ALL.to_vec())
}

/// Long values shaped like real columns: timestamps, small counters, few
/// distinct ids, plus the extremes.
fn long_values() -> impl Strategy<Value = Vec<i64>> {
    prop_oneof![
        prop::collection::vec(any::<i64>(), 0..200),
        prop::collection::vec(0i64..1000, 0..500),
        prop::collection::vec(prop::sample::select(vec![-7i64, 0, 42, 1 << 40]), 0..300),
        prop::collection::vec(1i64..10_000, 0..400).prop_map(|deltas| {
            deltas
                .into_iter()
                .scan(1_600_000_000_000i64, |ts, d| {
                    *ts += d;
                    Some(*ts)
                })
                .collect()
        }),
        Just(vec![i64::MIN, i64::MAX, 0, -1, i64::MAX]),
    ]
}

fn size_per() -> impl Strategy<Value = u32> {
    (0u32..8).prop_map(|shift| 1 << shift)
}

mod packed_ints {
    use super::*;

    proptest! {
        #[test]
        fn values_survive_round_trip(values in prop::collection::vec(0i32..=i32::MAX, 0..300)) {
            let packed = PackedInts::from_slice(&values).unwrap();
            let mut out = Vec::new();
            packed.write_to(&mut out).unwrap();
            prop_assert_eq!(out.len() as u64, packed.serialized_size());

            let mut region = Region::from_vec(out);
            let read = PackedInts::read_from(&mut region).unwrap();
            prop_assert!(region.is_empty());
            prop_assert_eq!(read.iter().collect::<Vec<_>>(), values);
            prop_assert_eq!(&read, &packed);
        }

        #[test]
        fn width_follows_declared_max(
            max in 0i32..=i32::MAX,
            fill in prop::collection::vec(any::<u32>(), 1..50),
        ) {
            let values: Vec<i32> = fill.iter().map(|v| (*v as i64 % (max as i64 + 1)) as i32).collect();
            let packed = PackedInts::from_slice_with_max(&values, max).unwrap();
            let expected = match max {
                m if m <= 0xFF => 1,
                m if m <= 0xFFFF => 2,
                m if m <= 0xFF_FFFF => 3,
                _ => 4,
            };
            prop_assert_eq!(packed.num_bytes(), expected);
            prop_assert_eq!(packed.bytes_no_padding().len(), values.len() * expected as usize);
            for (i, v) in values.iter().enumerate() {
                prop_assert_eq!(packed.get(i).unwrap(), *v);
            }
        }

        #[test]
        fn garbage_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
            let mut region = Region::from_vec(bytes);
            if let Ok(packed) = PackedInts::read_from(&mut region) {
                for i in 0..packed.len() {
                    let _ = packed.get(i);
                }
            }
        }
    }
}

mod longs {
    use super::*;

    proptest! {
        #[test]
        fn values_survive_round_trip(
            values in long_values(),
            order in byte_order(),
            compression in compression(),
            encoding in encoding(),
            size_per in size_per(),
        ) {
            let mut writer =
                CompressedLongsWriter::open_with_size_per("fuzz", order, compression, encoding, size_per)
                    .unwrap();
            for &v in &values {
                writer.add(v).unwrap();
            }
            let size = writer.serialized_size().unwrap();
            let mut out = Vec::new();
            writer.write_to(&mut out).unwrap();
            prop_assert_eq!(out.len() as u64, size);

            let mut region = Region::from_vec(out);
            let supplier = CompressedLongsSupplier::from_region(&mut region, order).unwrap();
            prop_assert!(region.is_empty());
            prop_assert_eq!(supplier.compression(), compression);
            prop_assert_eq!(supplier.encoding(), encoding);
            prop_assert_eq!(supplier.has_encoding_id(), encoding != LongEncoding::LEGACY);
            prop_assert_eq!(supplier.get().to_vec().unwrap(), values);
        }

        #[test]
        fn random_access_matches_sequential(
            values in prop::collection::vec(any::<i64>(), 1..200),
            picks in prop::collection::vec(any::<prop::sample::Index>(), 1..40),
            encoding in encoding(),
        ) {
            let mut writer = CompressedLongsWriter::open_with_size_per(
                "random",
                ByteOrder::LittleEndian,
                CompressionStrategy::Lz4,
                encoding,
                16,
            )
            .unwrap();
            for &v in &values {
                writer.add(v).unwrap();
            }
            let mut out = Vec::new();
            writer.write_to(&mut out).unwrap();

            let supplier =
                CompressedLongsSupplier::from_region(&mut Region::from_vec(out), ByteOrder::LittleEndian)
                    .unwrap();
            let mut column = supplier.get();
            for pick in picks {
                let i = pick.index(values.len());
                prop_assert_eq!(column.get(i).unwrap(), values[i]);
            }
        }
    }
}

mod floats {
    use super::*;

    proptest! {
        #[test]
        fn values_survive_round_trip(
            values in prop::collection::vec(-1e9f32..1e9, 0..300),
            order in byte_order(),
            compression in compression(),
            size_per in size_per(),
        ) {
            let mut writer =
                CompressedFloatsWriter::open_with_size_per("fuzz", order, compression, size_per).unwrap();
            for &v in &values {
                writer.add(v).unwrap();
            }
            let mut out = Vec::new();
            writer.write_to(&mut out).unwrap();

            let supplier = CompressedFloatsSupplier::from_region(&mut Region::from_vec(out), order).unwrap();
            prop_assert_eq!(supplier.len(), values.len());
            prop_assert_eq!(supplier.get().to_vec().unwrap(), values);
        }
    }
}
