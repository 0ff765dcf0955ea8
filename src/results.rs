/// Trial Result Records
///
/// Serializable outcome of one attack trial, plus the optional per-round
/// timeline. Field names are the ones written to the JSON Lines logs.
use crate::error_state::ErrorState;
use crate::pattern::Pattern;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a trial ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialOutcome {
    /// Victim forced into Bus-Off
    BusOff,
    /// Observation produced no usable pattern
    NoPatternFound,
    /// Attacker missed its timing window
    TimingFailure,
    /// Round cap exceeded before Bus-Off
    Incomplete,
}

impl fmt::Display for TrialOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrialOutcome::BusOff => write!(f, "Bus-Off"),
            TrialOutcome::NoPatternFound => write!(f, "No Pattern Found"),
            TrialOutcome::TimingFailure => write!(f, "Timing Failure"),
            TrialOutcome::Incomplete => write!(f, "Incomplete"),
        }
    }
}

/// Phase label attached to timeline points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseLabel {
    Analysis,
    Attack,
    AttackPhase1,
    AttackPhase2,
}

/// Bus and node state after one round of a trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub step_index: u64,
    pub time_ms: f64,
    pub bus_speed_kbps: u32,
    pub phase: PhaseLabel,
    pub victim_tec: u32,
    pub attacker_tec: u32,
    pub victim_state: ErrorState,
    pub attacker_state: ErrorState,
    pub note: String,
}

/// Result of one Bus-Off attack trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub bus_speed_kbps: u32,
    pub step_ms: f64,
    pub time_to_error_passive_ms: Option<f64>,
    pub time_to_bus_off_ms: Option<f64>,
    /// Attack rounds until the victim turned Error-Passive
    pub steps_to_error_passive: Option<u64>,
    /// Attack rounds until the victim went Bus-Off
    pub steps_to_bus_off: Option<u64>,
    pub victim_final_tec: u32,
    pub attacker_final_tec: u32,
    pub victim_final_state: ErrorState,
    pub attacker_final_state: ErrorState,
    pub victim_bus_off: bool,
    pub outcome: TrialOutcome,
    pub pattern: Option<Pattern>,
    /// 1-based trial number within a sweep
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trial: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub timeline: Vec<TimelineEvent>,
}

impl TrialResult {
    pub fn is_success(&self) -> bool {
        self.outcome == TrialOutcome::BusOff
    }
}
