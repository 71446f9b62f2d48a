use criterion::{black_box, BatchSize, BenchmarkId, Criterion};
use criterion::{criterion_group, criterion_main};

use column_codec::{
    ByteOrder, CompressedLongsSupplier, CompressedLongsWriter, CompressionStrategy, LongEncoding, Region,
};

const VALUES_PER_ITER: i64 = 100_000;

fn timestamps() -> Vec<i64> {
    (0..VALUES_PER_ITER)
        .map(|i| 1_700_000_000_000 + i * 1_000 + (i * 7919) % 13)
        .collect()
}

fn encode(values: &[i64], compression: CompressionStrategy, encoding: LongEncoding) -> Vec<u8> {
    let mut writer = CompressedLongsWriter::open("bench", ByteOrder::LittleEndian, compression, encoding);
    for &v in values {
        writer.add(v).expect("add");
    }
    let mut out = Vec::new();
    writer.write_to(&mut out).expect("write");
    out
}

fn bench_write(c: &mut Criterion) {
    let values = timestamps();
    let mut group = c.benchmark_group("long_column_write");
    for compression in CompressionStrategy::ALL {
        for encoding in LongEncoding::ALL {
            let id = BenchmarkId::new(compression.name(), encoding.name());
            group.bench_with_input(id, &values, |b, values| {
                b.iter(|| black_box(encode(values, compression, encoding)));
            });
        }
    }
    group.finish();
}

fn bench_scan(c: &mut Criterion) {
    let values = timestamps();
    let mut group = c.benchmark_group("long_column_scan");
    for compression in CompressionStrategy::ALL {
        for encoding in LongEncoding::ALL {
            let bytes = encode(&values, compression, encoding);
            let id = BenchmarkId::new(compression.name(), encoding.name());
            group.bench_with_input(id, &bytes, |b, bytes| {
                b.iter_batched(
                    || Region::from_vec(bytes.clone()),
                    |mut region| {
                        let supplier = CompressedLongsSupplier::from_region(&mut region, ByteOrder::LittleEndian)
                            .expect("read");
                        black_box(supplier.get().to_vec().expect("scan"))
                    },
                    BatchSize::LargeInput,
                );
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_write, bench_scan);
criterion_main!(benches);
