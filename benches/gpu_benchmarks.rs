// benches/gpu_benchmarks.rs — CPU vs GPU tile benchmarks.
//
//   cargo bench --bench gpu_benchmarks
//
// CRITERION + GPU CAVEATS
// ────────────────────────
// Each process_tile call is fully synchronous (upload, dispatch, poll,
// readback, poll), so wall time includes both transfers. That is the
// number that matters for a tiled raster run: nothing overlaps.
//
// The first iteration per operator compiles the pipeline; warm-up is set
// explicitly so it does not leak into the measurement.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Duration;

use georsgpu::{
    process_raster, BlockProcessor, Command, Operator, ProcessorConfig, Raster, TileRect,
};

fn make_dem(rows: usize, cols: usize) -> Raster {
    Raster::from_fn(rows, cols, |r, c| {
        let (y, x) = (r as f32, c as f32);
        800.0 + 0.4 * y + 0.2 * x + 25.0 * (x * 0.05).sin() * (y * 0.03).cos()
    })
}

// ============================================================
// Single tile: CPU vs GPU per operator
// ============================================================

fn bench_tile(c: &mut Criterion) {
    let dem = make_dem(1026, 1026);
    let input = dem.bounds();
    let output = TileRect::new(1, 1, 1024, 1024);

    let mut group = c.benchmark_group("tile_1024");
    group.warm_up_time(Duration::from_secs(2));
    group.throughput(Throughput::Elements(output.area() as u64));

    for op in [Operator::SlopeBurrough, Operator::Hillshade, Operator::PlanCurvature] {
        let cfg = ProcessorConfig::new(op, 1026, 1026).with_cell_size(30.0, 30.0);

        let mut cpu = BlockProcessor::cpu(&cfg).expect("cpu processor");
        cpu.input_mut()[..input.area()].copy_from_slice(dem.as_slice());
        group.bench_with_input(BenchmarkId::new("cpu", op), &op, |b, _| {
            b.iter(|| cpu.process_tile(&input, &output).expect("tile"))
        });

        let mut gpu = BlockProcessor::gpu(&cfg).expect("no GPU");
        gpu.input_mut()[..input.area()].copy_from_slice(dem.as_slice());
        group.bench_with_input(BenchmarkId::new("gpu", op), &op, |b, _| {
            b.iter(|| gpu.process_tile(&input, &output).expect("tile"))
        });
    }
    group.finish();
}

// ============================================================
// Whole raster: CPU vs GPU
// ============================================================

fn bench_raster(c: &mut Criterion) {
    let dem = make_dem(4096, 4096);
    let cfg = ProcessorConfig::new(Command::Slope, 1026, 1026);

    let mut group = c.benchmark_group("raster_4096");
    group.sample_size(10);
    group.warm_up_time(Duration::from_secs(2));
    group.throughput(Throughput::Elements((dem.rows() * dem.cols()) as u64));

    let mut cpu = BlockProcessor::cpu(&cfg).expect("cpu processor");
    group.bench_function("cpu_slope", |b| {
        b.iter(|| process_raster(&mut cpu, &dem).expect("raster"))
    });

    let mut gpu = BlockProcessor::gpu(&cfg).expect("no GPU");
    group.bench_function("gpu_slope", |b| {
        b.iter(|| process_raster(&mut gpu, &dem).expect("raster"))
    });
    group.finish();
}

criterion_group!(benches, bench_tile, bench_raster);
criterion_main!(benches);
