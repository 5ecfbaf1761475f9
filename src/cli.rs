//! Command-line options of the `homesim` binary.

use std::env;
use std::path::PathBuf;

#[derive(Debug)]
pub struct CliOptions {
    pub scenario: Option<PathBuf>,
    pub preset: Option<String>,
    pub seed: Option<u64>,
    pub max_iterations: Option<usize>,
    pub tolerance: Option<f64>,
    pub results_out: Option<PathBuf>,
    pub connections_out: Option<PathBuf>,
}

pub fn parse_args() -> Result<CliOptions, String> {
    let args: Vec<String> = env::args().skip(1).collect();
    parse_args_from(args)
}

pub fn parse_args_from(args: Vec<String>) -> Result<CliOptions, String> {
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        std::process::exit(0);
    }
    parse_options(&args)
}

fn parse_options(args: &[String]) -> Result<CliOptions, String> {
    let mut i = 0usize;
    let mut scenario = None;
    let mut preset = None;
    let mut seed = None;
    let mut max_iterations = None;
    let mut tolerance = None;
    let mut results_out = None;
    let mut connections_out = None;

    while i < args.len() {
        let flag = args[i].as_str();
        i += 1;
        match flag {
            "--scenario" => {
                let path = args.next_or_err(i, "missing value for --scenario (expected a TOML file path)")?;
                if scenario.replace(PathBuf::from(path)).is_some() {
                    return Err("--scenario provided more than once".to_string());
                }
            }
            "--preset" => {
                let name = args.next_or_err(i, "missing value for --preset (expected a preset name)")?;
                if preset.replace(name.to_string()).is_some() {
                    return Err("--preset provided more than once".to_string());
                }
            }
            "--seed" => {
                let value = args.next_or_err(i, "missing value for --seed (expected a u64)")?;
                seed = Some(parse_value::<u64>(flag, value)?);
            }
            "--max-iterations" => {
                let value = args.next_or_err(i, "missing value for --max-iterations (expected a count)")?;
                max_iterations = Some(parse_value::<usize>(flag, value)?);
            }
            "--tolerance" => {
                let value = args.next_or_err(i, "missing value for --tolerance (expected a number)")?;
                tolerance = Some(parse_value::<f64>(flag, value)?);
            }
            "--results-out" => {
                let path = args.next_or_err(i, "missing value for --results-out (expected a file path)")?;
                if results_out.replace(PathBuf::from(path)).is_some() {
                    return Err("--results-out provided more than once".to_string());
                }
            }
            "--connections-out" => {
                let path =
                    args.next_or_err(i, "missing value for --connections-out (expected a file path)")?;
                if connections_out.replace(PathBuf::from(path)).is_some() {
                    return Err("--connections-out provided more than once".to_string());
                }
            }
            other => return Err(format!("unknown argument: {other}")),
        }
        i += 1;
    }

    if scenario.is_some() && preset.is_some() {
        return Err(
            "arguments `--scenario` and `--preset` are mutually exclusive; choose one source"
                .to_string(),
        );
    }

    if scenario.is_none() && preset.is_none() {
        preset = Some("baseline".to_string());
    }

    Ok(CliOptions {
        scenario,
        preset,
        seed,
        max_iterations,
        tolerance,
        results_out,
        connections_out,
    })
}

fn parse_value<T: std::str::FromStr>(flag: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("{flag} value \"{value}\" is not valid"))
}

trait SliceArgExt {
    fn next_or_err(&self, index: usize, err: &str) -> Result<&str, String>;
}

impl SliceArgExt for [String] {
    fn next_or_err(&self, index: usize, err: &str) -> Result<&str, String> {
        self.get(index)
            .map(String::as_str)
            .ok_or_else(|| err.to_string())
    }
}

pub fn print_usage() {
    eprintln!("homesim: household energy simulation");
    eprintln!();
    eprintln!("Usage: homesim [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --scenario <path>          Load scenario from TOML config file");
    eprintln!("  --preset <name>            Use a built-in preset (baseline, no_battery, fine_resolution)");
    eprintln!("  --seed <u64>               Override random seed");
    eprintln!("  --max-iterations <n>       Override normal passes per timestep");
    eprintln!("  --tolerance <x>            Override convergence tolerance");
    eprintln!("  --results-out <path>       Export committed values to CSV");
    eprintln!("  --connections-out <path>   Export resolved connections to JSON");
    eprintln!("  --help                     Show this help message");
    eprintln!();
    eprintln!("If no --scenario or --preset is given, the baseline preset is used.");
}
