//! Benchmarks for emulation prevention
//!
//! Tests performance of removing and re-inserting escape bytes, and of the
//! PPS rewrite that runs once per stitched GOP.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use panotile_bitstream::synth::PpsBuilder;
use panotile_bitstream::{
    insert_escapes_and_marker, remove_escapes, validate_escapes, BitArray, ParameterSet,
    NAL_HEADER_SIZE,
};

/// Payload with a start-code emulation every `period` bytes.
fn escaped_payload(len: usize, period: usize) -> Vec<u8> {
    let mut raw = vec![0x40, 0x01];
    for i in 0..len {
        raw.push(if i % period < 2 { 0x00 } else { (i % 251) as u8 | 0x10 });
    }
    let bits = BitArray::from_bytes(&raw);
    let (framed, _) = insert_escapes_and_marker(&bits, NAL_HEADER_SIZE, bits.byte_len(), false);
    framed[4..].to_vec()
}

fn bench_remove_escapes(c: &mut Criterion) {
    let mut group = c.benchmark_group("remove_escapes");
    for &(len, period) in &[(1_024usize, 64usize), (64 * 1024, 64), (64 * 1024, 8)] {
        let payload = escaped_payload(len, period);
        group.throughput(Throughput::Bytes(payload.len() as u64));
        group.bench_with_input(
            BenchmarkId::new(format!("every_{period}"), len),
            &payload,
            |b, payload| b.iter(|| remove_escapes(black_box(payload), NAL_HEADER_SIZE, payload.len())),
        );
    }
    group.finish();
}

fn bench_insert_escapes(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_escapes");
    for &len in &[1_024usize, 64 * 1024] {
        let payload = escaped_payload(len, 16);
        let bits = remove_escapes(&payload, NAL_HEADER_SIZE, payload.len());
        group.throughput(Throughput::Bytes(bits.byte_len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &bits, |b, bits| {
            b.iter(|| insert_escapes_and_marker(black_box(bits), NAL_HEADER_SIZE, bits.byte_len(), false))
        });
    }
    group.finish();
}

fn bench_validate_escapes(c: &mut Criterion) {
    let payload = escaped_payload(64 * 1024, 16);
    c.bench_function("validate_escapes_64k", |b| {
        b.iter(|| validate_escapes(black_box(&payload)))
    });
}

fn bench_pps_rewrite(c: &mut Criterion) {
    let nal = PpsBuilder::new(0).tiles(6, 6).build();
    c.bench_function("pps_set_tile_dimensions", |b| {
        b.iter(|| {
            let mut pps = ParameterSet::parse(black_box(&nal)).ok()?;
            pps.set_tile_dimensions(2, 3, false).ok()?;
            Some(pps.bytes().len())
        })
    });
}

criterion_group!(
    benches,
    bench_remove_escapes,
    bench_insert_escapes,
    bench_validate_escapes,
    bench_pps_rewrite,
);
criterion_main!(benches);
