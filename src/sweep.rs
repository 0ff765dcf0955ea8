/// Trial Sweeps
///
/// Repeats the attack over many trials per bus speed. Each speed owns a
/// generator seeded from the base seed, so speeds are independent of each
/// other and run in parallel on tokio's blocking pool without changing any
/// result.
use crate::attack_driver::{AttackDriver, run_trial};
use crate::config::{ConfigError, SweepConfig, TrialConfig};
use crate::error_state::TecEvent;
use crate::metrics::SweepSummary;
use crate::results::TrialResult;
use crate::timeline::{TecTimelinePoint, reconstruct_timeline};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fmt;
use tokio::sync::mpsc;

#[derive(Debug)]
pub enum SweepError {
    Config(ConfigError),
    /// A blocking trial task panicked or was cancelled
    Task(String),
}

impl fmt::Display for SweepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepError::Config(e) => write!(f, "Invalid configuration: {}", e),
            SweepError::Task(e) => write!(f, "Trial task failed: {}", e),
        }
    }
}

impl std::error::Error for SweepError {}

impl From<ConfigError> for SweepError {
    fn from(e: ConfigError) -> Self {
        SweepError::Config(e)
    }
}

/// Per-speed seed (SplitMix64 finalizer over seed and speed)
pub fn derive_seed(seed: u64, bus_speed_kbps: u32) -> u64 {
    let mut z = seed ^ (bus_speed_kbps as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Run `num_trials` trials sharing one generator; trials are numbered from 1
pub fn run_trials(
    config: &TrialConfig,
    bus_speed_kbps: u32,
    num_trials: u32,
    seed: u64,
) -> Result<Vec<TrialResult>, ConfigError> {
    config.validate()?;
    let mut rng = StdRng::seed_from_u64(seed);

    let mut results = Vec::with_capacity(num_trials as usize);
    for trial in 1..=num_trials {
        let mut result = run_trial(config, bus_speed_kbps, &mut rng)?;
        result.trial = Some(trial);
        results.push(result);
    }
    Ok(results)
}

/// All trials of one bus speed
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedSweep {
    pub bus_speed_kbps: u32,
    pub results: Vec<TrialResult>,
    pub summary: SweepSummary,
}

/// Run every configured speed on its own blocking task
///
/// Results come back in configured speed order.
pub async fn run_speed_sweep(config: &SweepConfig) -> Result<Vec<SpeedSweep>, SweepError> {
    config.validate()?;

    let mut handles = Vec::with_capacity(config.bus_speeds_kbps.len());
    for &bus_speed_kbps in &config.bus_speeds_kbps {
        let trial_config = config.trial.clone();
        let seed = derive_seed(config.seed, bus_speed_kbps);
        let num_trials = config.num_trials;

        let handle = tokio::task::spawn_blocking(move || {
            run_trials(&trial_config, bus_speed_kbps, num_trials, seed)
        });
        handles.push((bus_speed_kbps, handle));
    }

    let mut sweeps = Vec::with_capacity(handles.len());
    for (bus_speed_kbps, handle) in handles {
        let results = handle
            .await
            .map_err(|e| SweepError::Task(e.to_string()))??;
        sweeps.push(SpeedSweep {
            bus_speed_kbps,
            summary: SweepSummary::from_results(bus_speed_kbps, &results),
            results,
        });
    }
    Ok(sweeps)
}

/// One fully recorded trial
#[derive(Debug, Clone, PartialEq)]
pub struct DetailedRun {
    /// Includes the per-round timeline
    pub result: TrialResult,
    pub events: Vec<TecEvent>,
    pub tec_timeline: Vec<TecTimelinePoint>,
}

/// Single trial at the configured single-run speed, seeded with the base
/// seed, with every TEC change captured
pub fn run_single_detailed(config: &SweepConfig, verbose: bool) -> Result<DetailedRun, SweepError> {
    config.validate()?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let driver = AttackDriver::new(&config.trial, config.single_run_speed_kbps)?
        .with_event_sink(tx)
        .with_verbose(verbose)
        .collect_timeline(true);
    let timing = driver.timing().clone();

    let mut rng = StdRng::seed_from_u64(config.seed);
    let result = driver.run(&mut rng);

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    let tec_timeline = reconstruct_timeline(&events, config.trial.observation_rounds, &timing);

    Ok(DetailedRun {
        result,
        events,
        tec_timeline,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_seeds_differ_per_speed() {
        assert_eq!(derive_seed(42, 500), derive_seed(42, 500));
        assert_ne!(derive_seed(42, 500), derive_seed(42, 250));
        assert_ne!(derive_seed(42, 500), derive_seed(43, 500));
    }

    #[test]
    fn test_trials_are_numbered() {
        let results = run_trials(&TrialConfig::default(), 500, 3, 1).unwrap();
        let numbers: Vec<Option<u32>> = results.iter().map(|r| r.trial).collect();
        assert_eq!(numbers, vec![Some(1), Some(2), Some(3)]);
        assert!(results.iter().all(|r| r.timeline.is_empty()));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = TrialConfig {
            periodic_interval: 0,
            ..Default::default()
        };
        assert!(run_trials(&config, 500, 1, 1).is_err());
    }
}
