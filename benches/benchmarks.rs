// benches/benchmarks.rs -- CPU reference backend benchmarks.
//
//   cargo bench --bench benchmarks
//
// Per-operator single-tile throughput, plus whole-raster processing at a
// few tile sizes to show the cost of the halo and per-tile overhead.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use georsgpu::{process_raster, BlockProcessor, Command, Operator, ProcessorConfig, Raster, TileRect};

// ============================================================
// Helpers
// ============================================================

/// Synthetic DEM: tilted plane with ridges, values in metres.
fn make_dem(rows: usize, cols: usize) -> Raster {
    Raster::from_fn(rows, cols, |r, c| {
        let (y, x) = (r as f32, c as f32);
        800.0 + 0.4 * y + 0.2 * x + 25.0 * (x * 0.05).sin() * (y * 0.03).cos()
    })
}

// ============================================================
// Single tile, every operator
// ============================================================

fn bench_operators(c: &mut Criterion) {
    let dem = make_dem(514, 514);
    let input = dem.bounds();
    let output = TileRect::new(1, 1, 512, 512);

    let mut group = c.benchmark_group("cpu_tile_512");
    group.throughput(Throughput::Elements(output.area() as u64));
    for op in Operator::ALL {
        let cfg = ProcessorConfig::new(op, 514, 514).with_cell_size(30.0, 30.0);
        let mut bp = BlockProcessor::cpu(&cfg).expect("cpu processor");
        bp.input_mut()[..input.area()].copy_from_slice(dem.as_slice());
        group.bench_with_input(BenchmarkId::from_parameter(op), &op, |b, _| {
            b.iter(|| bp.process_tile(&input, &output).expect("tile"))
        });
    }
    group.finish();
}

// ============================================================
// Whole raster, varying tile size
// ============================================================

fn bench_raster(c: &mut Criterion) {
    let dem = make_dem(2048, 2048);

    let mut group = c.benchmark_group("cpu_raster_2048");
    group.sample_size(10);
    group.throughput(Throughput::Elements((dem.rows() * dem.cols()) as u64));
    for tile in [130usize, 258, 514, 1026] {
        let cfg = ProcessorConfig::new(Command::Slope, tile, tile);
        let mut bp = BlockProcessor::cpu(&cfg).expect("cpu processor");
        group.bench_with_input(BenchmarkId::new("slope", tile), &tile, |b, _| {
            b.iter(|| process_raster(&mut bp, &dem).expect("raster"))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_operators, bench_raster);
criterion_main!(benches);
