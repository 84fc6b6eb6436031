//! Baseline HFT inventory game.
//!
//! Solves the coupled system on `[-5, 5]` with 401 inventory nodes and
//! 200 time nodes, then prints the metrics record as JSON.
//!
//! ```text
//! RUST_LOG=shoal_solver=debug cargo run --example baseline
//! ```

use std::error::Error;

use shoal_grid::{BoundaryCondition, GridConfig};
use shoal_model::{InitialDensity, LqHft, Model};
use shoal_solver::{PicardConfig, PicardSolver, PricingConfig, SolverConfig};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = SolverConfig {
        grid: GridConfig {
            x_min: -5.0,
            x_max: 5.0,
            nx: 401,
            horizon: 1.0,
            nt: 200,
            boundary: BoundaryCondition::Neumann,
        },
        model: Model::from(LqHft {
            nu: 0.02,
            phi: 0.1,
            gamma_t: 2.0,
            eta0: 0.5,
            eta1: 0.8,
            alpha_cap: None,
        }),
        initial: InitialDensity {
            mean: 0.0,
            std: 1.0,
        },
        picard: PicardConfig {
            max_iter: 100,
            tol: 1e-6,
            mix: 0.2,
            ..PicardConfig::default()
        },
        pricing: PricingConfig {
            enabled: true,
            ..PricingConfig::default()
        },
        ..SolverConfig::default()
    };

    let model = config.model.name();
    let solver = PicardSolver::new(config, None)?;
    let solution = solver.run()?;

    println!("model: {model}");
    println!("status: {}", solution.status);
    for (key, value) in solution.metrics.scalar_summary() {
        println!("  {key:<22} {value:.6e}");
    }
    println!("{}", serde_json::to_string_pretty(&solution.metrics)?);
    Ok(())
}
