use bacnet_rs::encoding::{decode_tag, encode_context_unsigned, encode_unsigned};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn encode_benchmark(c: &mut Criterion) {
    c.bench_function("encode_unsigned", |b| {
        b.iter(|| {
            let mut buffer = Vec::with_capacity(8);
            encode_unsigned(&mut buffer, black_box(0x12345)).unwrap();
            buffer
        })
    });

    c.bench_function("encode_context_unsigned", |b| {
        b.iter(|| {
            let mut buffer = Vec::with_capacity(8);
            encode_context_unsigned(&mut buffer, 1, black_box(0x3FFFFF)).unwrap();
            buffer
        })
    });
}

fn decode_benchmark(c: &mut Criterion) {
    let mut tagged = Vec::new();
    encode_unsigned(&mut tagged, 0x12345).unwrap();

    c.bench_function("decode_tag", |b| {
        b.iter(|| decode_tag(black_box(&tagged)).unwrap())
    });
}

criterion_group!(benches, encode_benchmark, decode_benchmark);
criterion_main!(benches);
