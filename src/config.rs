// Simulation Configuration
// Per-trial attack parameters and the multi-speed sweep settings wrapped around them.
// Defaults reproduce the reference setup; everything can be overridden from a JSON file.

use crate::timing::TimingProfile;
use crate::traffic::TrafficProfile;
use crate::types::MAX_STANDARD_ID;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Configuration errors
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    ZeroBusSpeed,
    IntervalTooShort(u64),
    ObservationTooShort(u64),
    ProbabilityOutOfRange { bus_speed_kbps: Option<u32>, value: f64 },
    JitterOutOfRange(f64),
    InvalidTiming(&'static str),
    InvalidTraffic(String),
    NoBusSpeeds,
    ZeroTrials,
    Io(String),
    Parse(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ConfigError::ZeroBusSpeed => write!(f, "Bus speed must be greater than 0 kbps"),
            ConfigError::IntervalTooShort(v) => {
                write!(f, "Periodic frame interval must be at least 2 rounds (got {})", v)
            }
            ConfigError::ObservationTooShort(v) => {
                write!(f, "Observation window must be at least 2 rounds (got {})", v)
            }
            ConfigError::ProbabilityOutOfRange {
                bus_speed_kbps: Some(speed),
                value,
            } => write!(f, "Failure rate {} for {} kbps is outside [0, 1]", value, speed),
            ConfigError::ProbabilityOutOfRange {
                bus_speed_kbps: None,
                value,
            } => write!(f, "Default failure rate {} is outside [0, 1]", value),
            ConfigError::JitterOutOfRange(v) => write!(f, "Jitter {} is outside [0, 1)", v),
            ConfigError::InvalidTiming(field) => write!(f, "Timing value '{}' must be positive", field),
            ConfigError::InvalidTraffic(reason) => write!(f, "Invalid traffic profile: {}", reason),
            ConfigError::NoBusSpeeds => write!(f, "At least one bus speed is required"),
            ConfigError::ZeroTrials => write!(f, "Number of trials must be greater than 0"),
            ConfigError::Io(e) => write!(f, "Failed to read configuration: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse configuration: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Parameters of a single attack trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrialConfig {
    /// Rounds of passive observation before pattern inference
    pub observation_rounds: u64,
    /// Rounds between two periodic frames
    pub periodic_interval: u64,
    /// Hard cap on the round index; exceeding it ends the trial as incomplete
    pub max_rounds: u64,
    /// Probability that the attacker misses its timing window, per bus speed
    pub failure_rates: BTreeMap<u32, f64>,
    /// Used for bus speeds missing from `failure_rates`
    pub default_failure_rate: f64,
    pub timing: TimingProfile,
    pub traffic: TrafficProfile,
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self {
            observation_rounds: 300,
            periodic_interval: 5,
            max_rounds: 10_000,
            failure_rates: BTreeMap::from([(250, 0.02), (500, 0.05), (1000, 0.08)]),
            default_failure_rate: 0.05,
            timing: TimingProfile::default(),
            traffic: TrafficProfile::default(),
        }
    }
}

impl TrialConfig {
    /// Timing-failure probability for a bus speed
    pub fn failure_rate(&self, bus_speed_kbps: u32) -> f64 {
        self.failure_rates
            .get(&bus_speed_kbps)
            .copied()
            .unwrap_or(self.default_failure_rate)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.periodic_interval < 2 {
            return Err(ConfigError::IntervalTooShort(self.periodic_interval));
        }
        if self.observation_rounds < 2 {
            return Err(ConfigError::ObservationTooShort(self.observation_rounds));
        }

        for (speed, rate) in &self.failure_rates {
            if *speed == 0 {
                return Err(ConfigError::ZeroBusSpeed);
            }
            if !(0.0..=1.0).contains(rate) {
                return Err(ConfigError::ProbabilityOutOfRange {
                    bus_speed_kbps: Some(*speed),
                    value: *rate,
                });
            }
        }
        if !(0.0..=1.0).contains(&self.default_failure_rate) {
            return Err(ConfigError::ProbabilityOutOfRange {
                bus_speed_kbps: None,
                value: self.default_failure_rate,
            });
        }

        let timing = &self.timing;
        if !(0.0..1.0).contains(&timing.jitter) {
            return Err(ConfigError::JitterOutOfRange(timing.jitter));
        }
        if !(timing.base_step_ms > 0.0) {
            return Err(ConfigError::InvalidTiming("base_step_ms"));
        }
        if timing.base_speed_kbps == 0 {
            return Err(ConfigError::InvalidTiming("base_speed_kbps"));
        }
        if timing.bits_per_frame == 0 {
            return Err(ConfigError::InvalidTiming("bits_per_frame"));
        }
        if !(timing.phase2_time_scale > 0.0) {
            return Err(ConfigError::InvalidTiming("phase2_time_scale"));
        }

        let traffic = &self.traffic;
        for (name, id) in [
            ("preceded_id", traffic.preceded_id),
            ("periodic_id", traffic.periodic_id),
            ("non_periodic_id_min", traffic.non_periodic_id_min),
            ("non_periodic_id_max", traffic.non_periodic_id_max),
        ] {
            if id > MAX_STANDARD_ID {
                return Err(ConfigError::InvalidTraffic(format!(
                    "{} 0x{:X} exceeds 0x7FF",
                    name, id
                )));
            }
        }
        if traffic.non_periodic_id_min > traffic.non_periodic_id_max {
            return Err(ConfigError::InvalidTraffic(
                "non-periodic id range is inverted".to_string(),
            ));
        }
        if traffic.preceded_id == traffic.periodic_id {
            return Err(ConfigError::InvalidTraffic(
                "preceded and periodic frames share an id".to_string(),
            ));
        }
        if traffic.preceded_data.len() > 8 || traffic.periodic_data.len() > 8 {
            return Err(ConfigError::InvalidTraffic(
                "payloads are limited to 8 bytes".to_string(),
            ));
        }
        // An empty periodic payload has DLC 0000 and never loses to the fabricated frame
        if traffic.periodic_data.is_empty() {
            return Err(ConfigError::InvalidTraffic(
                "periodic payload must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Multi-trial sweep over several bus speeds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Base seed; every bus speed derives its own generator from it
    pub seed: u64,
    pub bus_speeds_kbps: Vec<u32>,
    pub num_trials: u32,
    /// Speed of the detailed single run
    pub single_run_speed_kbps: u32,
    pub log_dir: PathBuf,
    pub trial: TrialConfig,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            bus_speeds_kbps: vec![1000, 500, 250],
            num_trials: 1000,
            single_run_speed_kbps: 500,
            log_dir: PathBuf::from("attack_logs"),
            trial: TrialConfig::default(),
        }
    }
}

impl SweepConfig {
    /// Load a (possibly partial) configuration from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: SweepConfig =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bus_speeds_kbps.is_empty() {
            return Err(ConfigError::NoBusSpeeds);
        }
        if self.bus_speeds_kbps.contains(&0) || self.single_run_speed_kbps == 0 {
            return Err(ConfigError::ZeroBusSpeed);
        }
        if self.num_trials == 0 {
            return Err(ConfigError::ZeroTrials);
        }
        self.trial.validate()
    }
}
