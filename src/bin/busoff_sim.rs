/// Bus-Off Attack Simulator CLI
///
/// Runs the multi-trial sweep over every configured bus speed, writes one
/// JSON Lines log per speed, then runs a single detailed trial and writes its
/// TEC timeline.
///
/// SECURITY RESEARCH ONLY: simulation of a known CAN denial-of-service attack.
use busoff_sim::jsonl::{
    RunManifest, SINGLE_RUN_LOG, SINGLE_RUN_STEPS_LOG, prepare_log_dir, sweep_log_name,
    write_jsonl,
};
use busoff_sim::{SweepConfig, run_single_detailed, run_speed_sweep};
use colored::*;
use std::path::PathBuf;
use std::process;
use std::time::Instant;

struct CliArgs {
    config_path: Option<PathBuf>,
    seed: Option<u64>,
    num_trials: Option<u32>,
    bus_speeds: Option<Vec<u32>>,
    single_speed: Option<u32>,
    log_dir: Option<PathBuf>,
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args: Vec<String> = std::env::args().collect();
    let cli = parse_args(&args);

    let mut config = match &cli.config_path {
        Some(path) => match SweepConfig::from_json_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{} {}: {}", "✗".red(), path.display(), e);
                process::exit(1);
            }
        },
        None => SweepConfig::default(),
    };
    apply_overrides(&mut config, &cli);

    if let Err(e) = config.validate() {
        eprintln!("{} {}", "✗".red(), e);
        process::exit(1);
    }

    print_banner(&config);
    let start = Instant::now();

    let log_dir = prepare_log_dir(&config.log_dir)?;
    let mut manifest = RunManifest::new(&config);

    println!(
        "{} Running {} trials at {} kbps...",
        "→".cyan(),
        config.num_trials,
        join_speeds(&config.bus_speeds_kbps)
    );
    let sweeps = match run_speed_sweep(&config).await {
        Ok(sweeps) => sweeps,
        Err(e) => {
            eprintln!("{} Sweep failed: {}", "✗".red(), e);
            process::exit(1);
        }
    };

    for sweep in &sweeps {
        let name = sweep_log_name(sweep.bus_speed_kbps);
        let path = log_dir.join(&name);
        let written = write_jsonl(&path, &sweep.results)?;
        println!(
            "\n{} Generated: {} ({} records)",
            "✓".green(),
            path.display().to_string().bright_white(),
            written
        );
        print!("{}", sweep.summary.generate_report());
        manifest.add_file(name);
    }

    println!(
        "\n{} Running single detailed trial at {} kbps...",
        "→".cyan(),
        config.single_run_speed_kbps
    );
    let detailed = match run_single_detailed(&config, cli.verbose) {
        Ok(detailed) => detailed,
        Err(e) => {
            eprintln!("{} Detailed trial failed: {}", "✗".red(), e);
            process::exit(1);
        }
    };

    let single_run_path = log_dir.join(SINGLE_RUN_LOG);
    write_jsonl(&single_run_path, &detailed.tec_timeline)?;
    manifest.add_file(SINGLE_RUN_LOG);
    write_jsonl(&log_dir.join(SINGLE_RUN_STEPS_LOG), &detailed.result.timeline)?;
    manifest.add_file(SINGLE_RUN_STEPS_LOG);

    println!(
        "{} Detailed trial complete: {} TEC events logged",
        "✓".green(),
        detailed.events.len()
    );
    println!(
        "  Outcome:           {}",
        detailed.result.outcome.to_string().bright_white()
    );
    println!(
        "  Bus-Off:           {}",
        if detailed.result.victim_bus_off {
            "Yes".red().bold()
        } else {
            "No".green().bold()
        }
    );
    if let Some(last) = detailed.tec_timeline.last() {
        println!("  Total attack time: {:.2} ms", last.time_ms);
    }

    let manifest_path = manifest.write(&log_dir)?;

    println!();
    println!("{}", "═══════════════════════════════════════".green());
    println!(
        "Simulation complete in {:.1}s",
        start.elapsed().as_secs_f64()
    );
    println!("Log files generated in: {}", log_dir.display());
    println!("Manifest: {}", manifest_path.display());
    println!("{}", "═══════════════════════════════════════".green());

    Ok(())
}

fn parse_args(args: &[String]) -> CliArgs {
    let mut cli = CliArgs {
        config_path: None,
        seed: None,
        num_trials: None,
        bus_speeds: None,
        single_speed: None,
        log_dir: None,
        verbose: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                cli.config_path = Some(PathBuf::from(value_of(args, i, "--config")));
                i += 2;
            }
            "--seed" | "-s" => {
                cli.seed = Some(parse_number(value_of(args, i, "--seed"), "--seed"));
                i += 2;
            }
            "--trials" | "-n" => {
                cli.num_trials = Some(parse_number(value_of(args, i, "--trials"), "--trials"));
                i += 2;
            }
            "--speeds" => {
                let speeds = value_of(args, i, "--speeds")
                    .split(',')
                    .map(|speed| parse_number(speed.trim(), "--speeds"))
                    .collect();
                cli.bus_speeds = Some(speeds);
                i += 2;
            }
            "--single-speed" => {
                cli.single_speed = Some(parse_number(
                    value_of(args, i, "--single-speed"),
                    "--single-speed",
                ));
                i += 2;
            }
            "--log-dir" | "-o" => {
                cli.log_dir = Some(PathBuf::from(value_of(args, i, "--log-dir")));
                i += 2;
            }
            "--verbose" | "-v" => {
                cli.verbose = true;
                i += 1;
            }
            "--help" | "-h" => {
                print_usage();
                process::exit(0);
            }
            other => {
                eprintln!("{} Unknown option: {}", "✗".red(), other);
                print_usage();
                process::exit(1);
            }
        }
    }
    cli
}

fn value_of<'a>(args: &'a [String], i: usize, flag: &str) -> &'a str {
    match args.get(i + 1) {
        Some(value) => value.as_str(),
        None => {
            eprintln!("{} Missing value for {}", "✗".red(), flag);
            process::exit(1);
        }
    }
}

fn parse_number<T: std::str::FromStr>(value: &str, flag: &str) -> T {
    match value.parse() {
        Ok(number) => number,
        Err(_) => {
            eprintln!("{} Invalid value for {}: {}", "✗".red(), flag, value);
            process::exit(1);
        }
    }
}

fn apply_overrides(config: &mut SweepConfig, cli: &CliArgs) {
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }
    if let Some(num_trials) = cli.num_trials {
        config.num_trials = num_trials;
    }
    if let Some(speeds) = &cli.bus_speeds {
        config.bus_speeds_kbps = speeds.clone();
    }
    if let Some(speed) = cli.single_speed {
        config.single_run_speed_kbps = speed;
    }
    if let Some(dir) = &cli.log_dir {
        config.log_dir = dir.clone();
    }
}

fn join_speeds(speeds: &[u32]) -> String {
    speeds
        .iter()
        .map(|speed| speed.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_banner(config: &SweepConfig) {
    println!();
    println!("{}", "═══════════════════════════════════════".red().bold());
    println!("{}", "     CAN Bus-Off Attack Simulation     ".red().bold());
    println!("{}", "═══════════════════════════════════════".red().bold());
    println!();
    println!("{}", "⚠️  Security research tool: simulation only".yellow());
    println!();
    println!("Random seed:     {}", config.seed.to_string().bright_white());
    println!(
        "Bus speeds:      {} kbps",
        join_speeds(&config.bus_speeds_kbps).bright_white()
    );
    println!(
        "Trials/speed:    {}",
        config.num_trials.to_string().bright_white()
    );
    println!(
        "Observation:     {} rounds, periodic every {}",
        config.trial.observation_rounds, config.trial.periodic_interval
    );
    println!("Log directory:   {}", config.log_dir.display());
    println!();
}

fn print_usage() {
    println!("{}", "Bus-Off Attack Simulator".bright_cyan().bold());
    println!();
    println!("Usage: busoff_sim [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -c, --config <FILE>       Load settings from a JSON file");
    println!("  -s, --seed <N>            Base random seed (default: 42)");
    println!("  -n, --trials <N>          Trials per bus speed (default: 1000)");
    println!("      --speeds <A,B,...>    Bus speeds in kbps (default: 1000,500,250)");
    println!("      --single-speed <N>    Speed of the detailed trial (default: 500)");
    println!("  -o, --log-dir <DIR>       Output directory (default: attack_logs)");
    println!("  -v, --verbose             Narrate the detailed trial");
    println!("  -h, --help                Show this help");
    println!();
    println!("Examples:");
    println!("  busoff_sim --trials 100 --speeds 500,250");
    println!("  busoff_sim --config sweep.json --log-dir out --verbose");
}
