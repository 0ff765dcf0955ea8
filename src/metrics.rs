/// Sweep Statistics and Reporting
///
/// Descriptive statistics over the trials of one bus speed.
use crate::results::{TrialOutcome, TrialResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepSummary {
    pub bus_speed_kbps: u32,
    pub total_trials: usize,
    pub bus_off_count: usize,
    /// Fraction of trials ending in Bus-Off
    pub bus_off_rate: f64,
    pub no_pattern_count: usize,
    pub timing_failure_count: usize,
    pub incomplete_count: usize,

    pub mean_time_to_bus_off_ms: Option<f64>,
    pub median_time_to_bus_off_ms: Option<f64>,
    pub min_time_to_bus_off_ms: Option<f64>,
    pub max_time_to_bus_off_ms: Option<f64>,
    pub mean_time_to_error_passive_ms: Option<f64>,
    pub mean_steps_to_bus_off: Option<f64>,
}

impl SweepSummary {
    pub fn from_results(bus_speed_kbps: u32, results: &[TrialResult]) -> Self {
        if results.is_empty() {
            return Self {
                bus_speed_kbps,
                ..Default::default()
            };
        }

        let count = |outcome: TrialOutcome| results.iter().filter(|r| r.outcome == outcome).count();
        let bus_off_count = results.iter().filter(|r| r.victim_bus_off).count();

        let mut bus_off_times: Vec<f64> =
            results.iter().filter_map(|r| r.time_to_bus_off_ms).collect();
        bus_off_times.sort_by(f64::total_cmp);
        let error_passive_times: Vec<f64> = results
            .iter()
            .filter_map(|r| r.time_to_error_passive_ms)
            .collect();
        let bus_off_steps: Vec<f64> = results
            .iter()
            .filter_map(|r| r.steps_to_bus_off)
            .map(|steps| steps as f64)
            .collect();

        Self {
            bus_speed_kbps,
            total_trials: results.len(),
            bus_off_count,
            bus_off_rate: bus_off_count as f64 / results.len() as f64,
            no_pattern_count: count(TrialOutcome::NoPatternFound),
            timing_failure_count: count(TrialOutcome::TimingFailure),
            incomplete_count: count(TrialOutcome::Incomplete),
            mean_time_to_bus_off_ms: mean(&bus_off_times),
            median_time_to_bus_off_ms: median(&bus_off_times),
            min_time_to_bus_off_ms: bus_off_times.first().copied(),
            max_time_to_bus_off_ms: bus_off_times.last().copied(),
            mean_time_to_error_passive_ms: mean(&error_passive_times),
            mean_steps_to_bus_off: mean(&bus_off_steps),
        }
    }

    /// Generate a text report
    pub fn generate_report(&self) -> String {
        let mut report = String::new();

        report.push_str(&format!("\n  Summary for {} kbps:\n", self.bus_speed_kbps));
        report.push_str(&format!(
            "    Bus-Off success: {}/{} ({:.1}%)\n",
            self.bus_off_count,
            self.total_trials,
            self.bus_off_rate * 100.0
        ));
        report.push_str(&format!(
            "    Failures: {} no pattern, {} timing, {} incomplete\n",
            self.no_pattern_count, self.timing_failure_count, self.incomplete_count
        ));

        if let (Some(mean), Some(median), Some(min), Some(max)) = (
            self.mean_time_to_bus_off_ms,
            self.median_time_to_bus_off_ms,
            self.min_time_to_bus_off_ms,
            self.max_time_to_bus_off_ms,
        ) {
            report.push_str(&format!(
                "    Time to Bus-Off: mean={:.2}ms, median={:.2}ms, min={:.2}ms, max={:.2}ms\n",
                mean, median, min, max
            ));
        }
        if let Some(mean) = self.mean_time_to_error_passive_ms {
            report.push_str(&format!("    Time to Error-Passive: mean={:.2}ms\n", mean));
        }
        if let Some(steps) = self.mean_steps_to_bus_off {
            report.push_str(&format!("    Rounds to Bus-Off: mean={:.1}\n", steps));
        }

        report
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// `values` must be sorted
fn median(values: &[f64]) -> Option<f64> {
    let len = values.len();
    match len {
        0 => None,
        _ if len % 2 == 1 => Some(values[len / 2]),
        _ => Some((values[len / 2 - 1] + values[len / 2]) / 2.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_state::ErrorState;

    fn create_test_result(outcome: TrialOutcome, time_to_bus_off_ms: Option<f64>) -> TrialResult {
        let bus_off = outcome == TrialOutcome::BusOff;
        TrialResult {
            bus_speed_kbps: 500,
            step_ms: 0.222,
            time_to_error_passive_ms: bus_off.then_some(8.0),
            time_to_bus_off_ms,
            steps_to_error_passive: bus_off.then_some(16),
            steps_to_bus_off: bus_off.then_some(176),
            victim_final_tec: if bus_off { 256 } else { 0 },
            attacker_final_tec: if bus_off { 72 } else { 0 },
            victim_final_state: if bus_off {
                ErrorState::BusOff
            } else {
                ErrorState::ErrorActive
            },
            attacker_final_state: ErrorState::ErrorActive,
            victim_bus_off: bus_off,
            outcome,
            pattern: None,
            trial: None,
            timeline: Vec::new(),
        }
    }

    #[test]
    fn test_empty_results() {
        let summary = SweepSummary::from_results(250, &[]);
        assert_eq!(summary.bus_speed_kbps, 250);
        assert_eq!(summary.total_trials, 0);
        assert!(summary.mean_time_to_bus_off_ms.is_none());
    }

    #[test]
    fn test_summary_statistics() {
        let results = vec![
            create_test_result(TrialOutcome::BusOff, Some(90.0)),
            create_test_result(TrialOutcome::BusOff, Some(80.0)),
            create_test_result(TrialOutcome::BusOff, Some(85.0)),
            create_test_result(TrialOutcome::BusOff, Some(100.0)),
            create_test_result(TrialOutcome::TimingFailure, None),
        ];
        let summary = SweepSummary::from_results(500, &results);

        assert_eq!(summary.total_trials, 5);
        assert_eq!(summary.bus_off_count, 4);
        assert!((summary.bus_off_rate - 0.8).abs() < 1e-9);
        assert_eq!(summary.timing_failure_count, 1);
        assert_eq!(summary.no_pattern_count, 0);
        assert_eq!(summary.mean_time_to_bus_off_ms, Some(88.75));
        assert_eq!(summary.median_time_to_bus_off_ms, Some(87.5));
        assert_eq!(summary.min_time_to_bus_off_ms, Some(80.0));
        assert_eq!(summary.max_time_to_bus_off_ms, Some(100.0));
        assert_eq!(summary.mean_steps_to_bus_off, Some(176.0));

        let report = summary.generate_report();
        assert!(report.contains("Bus-Off success: 4/5 (80.0%)"));
        assert!(report.contains("median=87.50ms"));
    }
}
