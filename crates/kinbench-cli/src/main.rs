use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use kinbench_runner::{
    default_num_cores, discover_mechanisms, run_sweep, ProcessTools, SiteConf, SweepOptions,
    SweepSpace, SweepSummary, DEFAULT_REPEATS,
};

#[derive(Parser)]
#[command(name = "kinbench", version = "0.1.0", about = "Kinetics-solver benchmark sweeps")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full configuration sweep over every mechanism in the work dir.
    Sweep {
        /// Directory containing the code generator sources.
        home: PathBuf,
        /// Directory whose subdirectories hold the mechanisms to benchmark.
        work_dir: PathBuf,
        #[arg(long, default_value_t = DEFAULT_REPEATS)]
        repeats: usize,
        #[arg(long = "platform", default_values_t = [String::from("intel")])]
        platforms: Vec<String>,
        #[arg(long = "cores")]
        num_cores: Vec<u32>,
        #[arg(long)]
        json: bool,
    },
    /// List discovered mechanisms and the number of legal configurations.
    Describe {
        work_dir: PathBuf,
        #[arg(long = "platform", default_values_t = [String::from("intel")])]
        platforms: Vec<String>,
        #[arg(long = "cores")]
        num_cores: Vec<u32>,
        #[arg(long)]
        json: bool,
    },
    /// Validate a test-matrix specification against the embedded schema.
    ValidateMatrix {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Validate a platform-list specification against the embedded schema.
    ValidatePlatforms {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    let json_mode = command_json_mode(&cli.command);
    match run_command(cli.command) {
        Ok(Some(payload)) => {
            emit_json(&payload);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(err) => {
            if json_mode {
                emit_json(&json_error("command_failed", err.to_string()));
                std::process::exit(1);
            }
            Err(err)
        }
    }
}

fn run_command(command: Commands) -> Result<Option<Value>> {
    match command {
        Commands::Sweep {
            home,
            work_dir,
            repeats,
            platforms,
            num_cores,
            json,
        } => {
            let site = SiteConf::load(&work_dir)?;
            let tools = ProcessTools::new(site, home);
            let space = SweepSpace::opencl_default(platforms, cores_or_default(num_cores));
            let opts = SweepOptions {
                work_dir,
                repeats,
                space,
            };
            let summary = run_sweep(&tools, &opts)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "sweep",
                    "summary": summary,
                })));
            }
            print_summary(&summary);
        }
        Commands::Describe {
            work_dir,
            platforms,
            num_cores,
            json,
        } => {
            let mechanisms = discover_mechanisms(&work_dir)?;
            let space = SweepSpace::opencl_default(platforms, cores_or_default(num_cores));
            let configurations = space.configs().count();
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "describe",
                    "mechanisms": mechanisms
                        .iter()
                        .map(|m| json!({
                            "name": m.name,
                            "species": m.species_count,
                            "mech": m.mech_file.display().to_string(),
                        }))
                        .collect::<Vec<_>>(),
                    "configurations": configurations,
                })));
            }
            for m in &mechanisms {
                println!("mechanism: {} ({} species)", m.name, m.species_count);
            }
            println!("configurations: {}", configurations);
        }
        Commands::ValidateMatrix { file, json } => {
            kinbench_schemas::build_and_validate("test_matrix_schema.json", &file)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "validate-matrix",
                    "valid": true,
                    "file": file.display().to_string(),
                })));
            }
            println!("ok");
        }
        Commands::ValidatePlatforms { file, json } => {
            kinbench_schemas::build_and_validate("test_platform_schema.json", &file)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "validate-platforms",
                    "valid": true,
                    "file": file.display().to_string(),
                })));
            }
            println!("ok");
        }
    }
    Ok(None)
}

fn cores_or_default(num_cores: Vec<u32>) -> Vec<u32> {
    if num_cores.is_empty() {
        default_num_cores()
    } else {
        num_cores
    }
}

fn emit_json(value: &Value) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!(
            "{{\"ok\":false,\"error\":{{\"code\":\"serialization_error\",\"message\":\"failed to serialize JSON payload\"}}}}"
        ),
    }
}

fn json_error(code: &str, message: String) -> Value {
    json!({
        "ok": false,
        "error": {
            "code": code,
            "message": message,
        }
    })
}

fn command_json_mode(command: &Commands) -> bool {
    match command {
        Commands::Sweep { json, .. }
        | Commands::Describe { json, .. }
        | Commands::ValidateMatrix { json, .. }
        | Commands::ValidatePlatforms { json, .. } => *json,
    }
}

fn print_summary(summary: &SweepSummary) {
    println!("started_at: {}", summary.started_at);
    println!("finished_at: {}", summary.finished_at);
    println!("mechanisms: {}", summary.mechanisms);
    println!("configurations: {}", summary.configurations);
    println!("skipped: {}", summary.skipped);
    println!("generation_failures: {}", summary.generation_failures);
    println!("trials_run: {}", summary.trials_run);
}
