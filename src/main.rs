#[allow(non_snake_case)]
pub mod Cloud;
#[allow(non_snake_case)]
pub mod Examples;
#[allow(non_snake_case)]
pub mod Mesh;
#[allow(non_snake_case)]
pub mod Models;
#[allow(non_snake_case)]
pub mod Particles;
#[allow(non_snake_case)]
pub mod Statistics;

use Cloud::config::{BoundaryConfig, McSolution};
use Examples::cloud_examples::{cloud_examples, run_channel};
use log::{LevelFilter, error, info};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

/// usage: McPdf [solution.json] [n_steps]
pub fn main() {
    if let Err(e) = TermLogger::init(LevelFilter::Info, Config::default(), TerminalMode::Mixed, ColorChoice::Auto) {
        eprintln!("logger not initialised: {}", e);
    }
    let args: Vec<String> = std::env::args().collect();
    let n_steps: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(50);

    let result = match args.get(1) {
        Some(path) => match McSolution::from_file(path) {
            Ok(mut solution) => {
                if !solution.boundaries.contains_key("xmin") {
                    info!("no inlet given in {}, using a uniform inlet with zero scalars", path);
                    solution.boundaries.insert(
                        "xmin".to_string(),
                        BoundaryConfig::InletOutlet {
                            velocity: [1.0, 0.0, 0.0],
                            density: 1.0,
                            velocity_fluctuation: 0.0,
                            omega: 0.0,
                            scalars: Vec::new(),
                        },
                    );
                }
                run_channel(solution, n_steps).map(|_| ())
            }
            Err(e) => {
                error!("cannot read {}: {}", path, e);
                return;
            }
        },
        None => cloud_examples(1, n_steps),
    };
    if let Err(e) = result {
        error!("run failed: {}", e);
    }
}
