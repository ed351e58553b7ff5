use criterion::{Criterion, black_box, criterion_group, criterion_main};
use groundlink_core::encoder::{batch_write, mac_frame};
use groundlink_core::presets::setup_memory_plan;
use groundlink_core::DeviceAddress;

// Deterministic pseudo-random image to upload
fn image(n: usize, seed: u32) -> Vec<u8> {
    let mut state = seed.max(1);
    (0..n)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state & 0xFF) as u8
        })
        .collect()
}

fn bench_batching(c: &mut Criterion) {
    let data = image(4096, 7);
    c.bench_function("batch_write_4k_relay", |b| {
        b.iter(|| batch_write(black_box(&data), 128, "IMG", black_box(30)))
    });
    c.bench_function("batch_write_4k_push", |b| {
        b.iter(|| batch_write(black_box(&data), 128, "IMG", black_box(102)))
    });
    c.bench_function("setup_memory_plan_relay", |b| {
        b.iter(|| setup_memory_plan(black_box(30)))
    });

    let dev = DeviceAddress::parse("E6BD0B26").unwrap_or_else(|e| panic!("{e}"));
    let cmds = batch_write(&data[..64], 0, "F", 30).unwrap_or_default();
    c.bench_function("mac_frame", |b| {
        b.iter(|| {
            for (i, cmd) in cmds.iter().enumerate() {
                let _ = black_box(mac_frame(&cmd.payload, &dev, i as u16, 15));
            }
        })
    });
}

criterion_group!(benches, bench_batching);
criterion_main!(benches);
