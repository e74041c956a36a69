use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use intervox::audio::encode::{decode_chunk, encode_frame, f32_to_i16};
use std::hint::black_box;

/// Synthetic frame resembling speech: a few mixed sine components.
fn synth_frame(samples: usize) -> Vec<i16> {
    (0..samples)
        .map(|i| {
            let t = i as f32 / 16_000.0;
            let v = 0.4 * (2.0 * std::f32::consts::PI * 220.0 * t).sin()
                + 0.2 * (2.0 * std::f32::consts::PI * 880.0 * t).sin();
            f32_to_i16(v)
        })
        .collect()
}

fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("audio_codec");

    // Frame sizes from one hardware callback up to the wire frame.
    for &size in &[512usize, 1024, 4096] {
        let frame = synth_frame(size);
        group.bench_with_input(
            BenchmarkId::new("encode_frame", size),
            &frame,
            |b, frame| b.iter(|| encode_frame(black_box(frame))),
        );

        let encoded = encode_frame(&frame);
        group.bench_with_input(
            BenchmarkId::new("decode_chunk", size),
            &encoded.data,
            |b, data| b.iter(|| decode_chunk(black_box(data)).unwrap()),
        );
    }

    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
