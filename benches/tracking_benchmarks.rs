//! Benchmarks for the tracking cycle and frame delivery

#[path = "../tests/test_helpers.rs"]
mod test_helpers;

use camera_pipeline::geometry::{BoundingBox, ImageSize};
use camera_pipeline::mailbox::mailbox;
use camera_pipeline::tracking::TrackManager;
use camera_pipeline::utils::map_to_frame;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::Rng;
use std::sync::Arc;
use test_helpers::{frame, FakeVision};

fn random_boxes(count: usize) -> Vec<BoundingBox> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            BoundingBox::new(
                rng.gen_range(-50..640),
                rng.gen_range(-50..480),
                rng.gen_range(10..120),
                rng.gen_range(10..120),
            )
        })
        .collect()
}

fn benchmark_geometry(c: &mut Criterion) {
    let mut group = c.benchmark_group("geometry");
    let boxes = random_boxes(64);
    let frame_size = ImageSize::new(640, 480);

    group.bench_function("pairwise_intersects_64", |b| {
        b.iter(|| {
            let mut hits = 0;
            for (i, a) in boxes.iter().enumerate() {
                for other in &boxes[i + 1..] {
                    if a.intersects(other) {
                        hits += 1;
                    }
                }
            }
            black_box(hits)
        });
    });

    group.bench_function("clip_64", |b| {
        b.iter(|| {
            for bbox in &boxes {
                black_box(bbox.clip_to(black_box(frame_size)));
            }
        });
    });

    group.bench_function("map_to_frame_64", |b| {
        b.iter(|| {
            let mut scaled = boxes.clone();
            map_to_frame(&mut scaled, black_box(0.5), frame_size).unwrap();
            black_box(scaled)
        });
    });

    group.finish();
}

fn benchmark_track_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("track_cycle");

    for count in [1, 8, 32] {
        let vision = Arc::new(FakeVision::new());
        vision.set_detections(random_boxes(count));
        vision.set_motion(1, 0);
        let mut manager = TrackManager::new(Arc::clone(&vision), 1.0).unwrap();
        let frame = frame(0);

        group.bench_with_input(BenchmarkId::new("update", count), &count, |b, _| {
            b.iter(|| black_box(manager.update(black_box(&frame)).unwrap()));
        });
    }

    let vision = Arc::new(FakeVision::new());
    vision.set_detections(random_boxes(8));
    let mut manager = TrackManager::new(vision, 0.5).unwrap();
    let frame = frame(0);
    group.bench_function("update_half_scale", |b| {
        b.iter(|| black_box(manager.update(black_box(&frame)).unwrap()));
    });

    group.finish();
}

fn benchmark_mailbox(c: &mut Criterion) {
    let mut group = c.benchmark_group("mailbox");

    group.bench_function("post_overwrite", |b| {
        let (tx, _rx) = mailbox::<Arc<u64>>();
        let value = Arc::new(7_u64);
        b.iter(|| black_box(tx.post(Arc::clone(&value))));
    });

    group.bench_function("post_take", |b| {
        let (tx, rx) = mailbox::<u64>();
        b.iter(|| {
            tx.post(black_box(1));
            black_box(rx.try_take().unwrap())
        });
    });

    group.finish();
}

criterion_group!(benches, benchmark_geometry, benchmark_track_cycle, benchmark_mailbox);
criterion_main!(benches);
