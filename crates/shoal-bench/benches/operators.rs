//! Criterion micro-benchmarks for grid operators and banded solves.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use shoal_bench::stress_profile;
use shoal_grid::{ops, Grid, Thomas, TridiagonalSolver};

fn stress_grid() -> Grid {
    stress_profile().validate().unwrap()
}

fn bump(grid: &Grid) -> Vec<f64> {
    grid.xs().iter().map(|x| (-0.5 * x * x).exp()).collect()
}

/// Benchmark: one Thomas solve of `I - dt nu L` on 1601 nodes.
fn bench_thomas_1601(c: &mut Criterion) {
    let grid = stress_grid();
    let system = ops::laplacian_bands(&grid, &vec![0.02; grid.nx()]).implicit_system(grid.dt());
    let rhs = bump(&grid);

    c.bench_function("thomas_1601", |b| {
        b.iter(|| {
            let x = Thomas.solve_tridiagonal(&system, &rhs).unwrap();
            black_box(&x);
        });
    });
}

/// Benchmark: assemble variable-coefficient Laplacian bands.
fn bench_laplacian_bands_1601(c: &mut Criterion) {
    let grid = stress_grid();
    let coeff: Vec<f64> = grid.xs().iter().map(|x| 0.02 + 0.01 * x.abs()).collect();

    c.bench_function("laplacian_bands_1601", |b| {
        b.iter(|| {
            let bands = ops::laplacian_bands(&grid, &coeff);
            black_box(&bands);
        });
    });
}

/// Benchmark: upwind divergence under a mean-reverting velocity.
fn bench_upwind_1601(c: &mut Criterion) {
    let grid = stress_grid();
    let m = bump(&grid);
    let v: Vec<f64> = grid.xs().iter().map(|x| -x).collect();

    c.bench_function("upwind_divergence_1601", |b| {
        b.iter(|| {
            let div = ops::upwind_divergence(&m, &v, grid.dx());
            black_box(&div);
        });
    });
}

/// Benchmark: central gradient with mirrored edges.
fn bench_gradient_1601(c: &mut Criterion) {
    let grid = stress_grid();
    let u: Vec<f64> = grid.xs().iter().map(|x| x * x).collect();

    c.bench_function("gradient_1601", |b| {
        b.iter(|| {
            let g = ops::gradient(&u, grid.dx(), grid.boundary());
            black_box(&g);
        });
    });
}

/// Benchmark: simplex projection of a slightly negative density.
fn bench_projection_1601(c: &mut Criterion) {
    let grid = stress_grid();
    let mut m = bump(&grid);
    m[0] = -1e-6;
    m[1600] = -1e-6;

    c.bench_function("project_to_simplex_1601", |b| {
        b.iter(|| {
            let p = ops::project_to_simplex(&m, grid.dx()).unwrap();
            black_box(&p);
        });
    });
}

criterion_group!(
    benches,
    bench_thomas_1601,
    bench_laplacian_bands_1601,
    bench_upwind_1601,
    bench_gradient_1601,
    bench_projection_1601
);
criterion_main!(benches);
