//! homesim entry point: CLI wiring and config-driven household construction.

use std::path::Path;
use std::process;

use homesim::cli::{CliOptions, parse_args};
use homesim::config::ScenarioConfig;
use homesim::household::build_household;
use homesim::io::export::{export_connections_json, export_results_csv};
use homesim::sim::engine::Simulator;

fn load_scenario(cli: &CliOptions) -> Result<ScenarioConfig, String> {
    let mut scenario = match (&cli.scenario, &cli.preset) {
        (Some(path), _) => ScenarioConfig::from_toml_file(path),
        (None, Some(name)) => ScenarioConfig::from_preset(name),
        (None, None) => Ok(ScenarioConfig::baseline()),
    }
    .map_err(|e| e.to_string())?;

    if let Some(seed) = cli.seed {
        scenario.simulation.seed = seed;
    }
    if let Some(n) = cli.max_iterations {
        scenario.solver.max_iterations = n;
    }
    if let Some(tol) = cli.tolerance {
        scenario.solver.tolerance = tol;
    }

    let errors = scenario.validate();
    if !errors.is_empty() {
        return Err(errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n"));
    }
    Ok(scenario)
}

fn run(cli: &CliOptions) -> Result<(), String> {
    let scenario = load_scenario(cli)?;
    let params = scenario.to_run_parameters().map_err(|e| e.to_string())?;
    let system = build_household(&scenario, &params).map_err(|e| e.to_string())?;

    if let Some(path) = &cli.connections_out {
        export_connections_json(system.connections(), path)
            .map_err(|e| format!("error: failed to write connections: {e}"))?;
        eprintln!("Connections written to {}", path.display());
    }

    let simulator =
        Simulator::new(params, system, scenario.solver_settings()).map_err(|e| e.to_string())?;
    let output = simulator.run().map_err(|e| e.to_string())?;

    println!("{}", output.diagnostics);

    if let Some(path) = &cli.results_out {
        write_results(&output, path)?;
    }
    Ok(())
}

fn write_results(output: &homesim::sim::engine::SimulationOutput, path: &Path) -> Result<(), String> {
    export_results_csv(&output.results, &output.parameters, path)
        .map_err(|e| format!("error: failed to write CSV: {e}"))?;
    eprintln!("Results written to {}", path.display());
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = match parse_args() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("error: {e}");
            homesim::cli::print_usage();
            process::exit(2);
        }
    };

    if let Err(e) = run(&cli) {
        eprintln!("{e}");
        process::exit(1);
    }
}
