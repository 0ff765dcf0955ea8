/// TEC Timeline Reconstruction
///
/// Turns the ordered TEC event stream of one trial into a plottable
/// timeline: two points bracketing the observation window, then one point
/// per counter change. Phase 2 points are stretched by the profile's
/// phase-2 time scale once the victim has left Error-Active.
use crate::attack_driver::VICTIM_NAME;
use crate::error_state::{ErrorState, TecEvent};
use crate::results::PhaseLabel;
use crate::timing::{BusTiming, round_ms};
use serde::{Deserialize, Serialize};

/// Both nodes' counters at one point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TecTimelinePoint {
    pub time_ms: f64,
    pub victim_tec: u32,
    pub attacker_tec: u32,
    pub victim_state: ErrorState,
    pub attacker_state: ErrorState,
    pub phase: PhaseLabel,
}

pub fn reconstruct_timeline(
    events: &[TecEvent],
    observation_rounds: u64,
    timing: &BusTiming,
) -> Vec<TecTimelinePoint> {
    let frame_time_ms = timing.frame_time_ms();
    let phase2_scale = timing.profile().phase2_time_scale;
    let analysis_end_ms = observation_rounds as f64 * frame_time_ms;

    let mut timeline = Vec::with_capacity(events.len() + 2);
    for time_ms in [0.0, analysis_end_ms] {
        timeline.push(TecTimelinePoint {
            time_ms: round_ms(time_ms),
            victim_tec: 0,
            attacker_tec: 0,
            victim_state: ErrorState::ErrorActive,
            attacker_state: ErrorState::ErrorActive,
            phase: PhaseLabel::Analysis,
        });
    }

    let (mut victim_tec, mut victim_state) = (0, ErrorState::ErrorActive);
    let (mut attacker_tec, mut attacker_state) = (0, ErrorState::ErrorActive);
    let mut current_time_ms = analysis_end_ms;
    let mut in_phase2 = false;

    for event in events {
        if event.ecu_name == VICTIM_NAME {
            victim_tec = event.tec;
            victim_state = event.state;
        } else {
            attacker_tec = event.tec;
            attacker_state = event.state;
        }

        // Sticky: a victim dipping back to Error-Active stays in phase 2
        let phase = if victim_state == ErrorState::ErrorActive {
            PhaseLabel::AttackPhase1
        } else {
            in_phase2 = true;
            PhaseLabel::AttackPhase2
        };

        current_time_ms += if in_phase2 {
            frame_time_ms * phase2_scale
        } else {
            frame_time_ms
        };

        timeline.push(TecTimelinePoint {
            time_ms: round_ms(current_time_ms),
            victim_tec,
            attacker_tec,
            victim_state,
            attacker_state,
            phase,
        });
    }

    timeline
}
