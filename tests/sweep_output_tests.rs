/// Sweep and Log Output Tests
///
/// Parallel sweeps, the detailed single run and everything written to disk.

use busoff_sim::config::{ConfigError, SweepConfig, TrialConfig};
use busoff_sim::error_state::ErrorState;
use busoff_sim::jsonl::{read_jsonl, sweep_log_name, write_jsonl};
use busoff_sim::results::{PhaseLabel, TrialOutcome, TrialResult};
use busoff_sim::sweep::{SweepError, derive_seed, run_single_detailed, run_speed_sweep, run_trials};
use busoff_sim::timeline::TecTimelinePoint;
use std::collections::BTreeMap;
use tempfile::TempDir;

fn small_sweep(log_dir: &std::path::Path) -> SweepConfig {
    SweepConfig {
        seed: 7,
        bus_speeds_kbps: vec![1000, 500, 250],
        num_trials: 20,
        log_dir: log_dir.to_path_buf(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_parallel_sweep_is_deterministic() {
    let temp_dir = TempDir::new().unwrap();
    let config = small_sweep(temp_dir.path());

    let first = run_speed_sweep(&config).await.unwrap();
    let second = run_speed_sweep(&config).await.unwrap();
    assert_eq!(first, second);

    let speeds: Vec<u32> = first.iter().map(|s| s.bus_speed_kbps).collect();
    assert_eq!(speeds, vec![1000, 500, 250]);

    // Each speed matches a sequential run with its derived seed
    let sequential = run_trials(&config.trial, 500, 20, derive_seed(7, 500)).unwrap();
    assert_eq!(first[1].results, sequential);
    assert_eq!(first[1].summary.total_trials, 20);
}

#[tokio::test]
async fn test_sweep_rejects_invalid_config() {
    let config = SweepConfig {
        num_trials: 0,
        ..Default::default()
    };
    let err = run_speed_sweep(&config).await.unwrap_err();
    assert!(matches!(err, SweepError::Config(ConfigError::ZeroTrials)));
}

#[test]
fn test_sweep_log_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let results = run_trials(&TrialConfig::default(), 250, 10, 99).unwrap();

    let path = temp_dir.path().join(sweep_log_name(250));
    assert_eq!(write_jsonl(&path, &results).unwrap(), 10);
    assert!(path.ends_with("attack_250kbps.log"));

    let back: Vec<TrialResult> = read_jsonl(&path).unwrap();
    assert_eq!(back, results);

    let first_line = std::fs::read_to_string(&path).unwrap();
    let first: serde_json::Value =
        serde_json::from_str(first_line.lines().next().unwrap()).unwrap();
    assert_eq!(first["trial"], 1);
    assert_eq!(first["bus_speed_kbps"], 250);
    assert!(first.get("timeline").is_none());
}

#[test]
fn test_detailed_run_timeline() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = small_sweep(temp_dir.path());
    config.trial.failure_rates = BTreeMap::new();
    config.trial.default_failure_rate = 0.0;

    let detailed = run_single_detailed(&config, false).unwrap();
    assert_eq!(detailed.result.outcome, TrialOutcome::BusOff);
    assert!(!detailed.result.timeline.is_empty());

    let timeline = &detailed.tec_timeline;
    assert_eq!(timeline.len(), detailed.events.len() + 2);
    assert_eq!(timeline[0].phase, PhaseLabel::Analysis);
    assert_eq!(timeline[1].phase, PhaseLabel::Analysis);
    assert_eq!(timeline[2].phase, PhaseLabel::AttackPhase1);

    let last = timeline.last().unwrap();
    assert_eq!(last.victim_state, ErrorState::BusOff);
    assert_eq!(last.phase, PhaseLabel::AttackPhase2);
    assert!(timeline.windows(2).all(|w| w[0].time_ms <= w[1].time_ms));

    let path = temp_dir.path().join("single_run.log");
    write_jsonl(&path, timeline).unwrap();
    let back: Vec<TecTimelinePoint> = read_jsonl(&path).unwrap();
    assert_eq!(back.len(), timeline.len());
}

#[test]
fn test_config_file_loading() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("sweep.json");
    std::fs::write(
        &path,
        r#"{
            "seed": 1,
            "bus_speeds_kbps": [125, 250],
            "num_trials": 5,
            "trial": { "failure_rates": { "125": 0.5 }, "timing": { "jitter": 0.0 } }
        }"#,
    )
    .unwrap();

    let config = SweepConfig::from_json_file(&path).unwrap();
    assert_eq!(config.bus_speeds_kbps, vec![125, 250]);
    assert_eq!(config.trial.failure_rate(125), 0.5);
    assert_eq!(config.trial.failure_rate(250), 0.05);
    assert_eq!(config.trial.timing.jitter, 0.0);
    assert_eq!(config.trial.timing.bits_per_frame, 111);

    let missing = SweepConfig::from_json_file(&temp_dir.path().join("missing.json"));
    assert!(matches!(missing, Err(ConfigError::Io(_))));

    std::fs::write(&path, r#"{ "trial": { "timing": { "jitter": 1.5 } } }"#).unwrap();
    assert_eq!(
        SweepConfig::from_json_file(&path),
        Err(ConfigError::JitterOutOfRange(1.5))
    );
}
