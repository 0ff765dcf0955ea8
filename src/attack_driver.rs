/// Bus-Off Attack Driver
///
/// Runs one complete trial on a fresh two-node bus: passive observation,
/// pattern inference, the timing-failure draw, rapid collisions until the
/// victim turns Error-Passive, then the sawtooth of uncontested rounds and
/// forced collisions until it goes Bus-Off or the round cap is exceeded.
///
/// The driver owns the bus and is consumed by `run`; all randomness comes
/// from the generator passed in, so a seed fully determines the result.
use crate::can_bus::{CanBus, EcuId, TecEventSink};
use crate::config::{ConfigError, TrialConfig};
use crate::ecu::Ecu;
use crate::error_state::{ERROR_PASSIVE_THRESHOLD, ErrorState, TRANSMIT_ERROR_PENALTY};
use crate::pattern::Pattern;
use crate::results::{PhaseLabel, TimelineEvent, TrialOutcome, TrialResult};
use crate::timing::{BusTiming, round_ms};
use crate::traffic::{TrafficGenerator, TrafficKind};
use crate::types::CanFrame;
use colored::*;
use rand::Rng;
use std::fmt;

/// Collisions charged for the Error-Passive time: enough to cross the
/// threshold plus the transition round
pub const ERROR_PASSIVE_COLLISIONS: u64 =
    ((ERROR_PASSIVE_THRESHOLD + 1) / TRANSMIT_ERROR_PENALTY) as u64 + 1;

pub const VICTIM_NAME: &str = "Victim";
pub const ATTACKER_NAME: &str = "Attacker";

/// Attack state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttackPhase {
    Observing,
    PatternFound,
    NoPattern,
    AttackFailed,
    /// Phase 1: back-to-back collisions
    RapidCollision,
    ErrorPassiveReached,
    /// Phase 2: uncontested rounds, then one collision
    SawtoothCollision,
    BusOffReached,
    Incomplete,
}

impl AttackPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AttackPhase::NoPattern
                | AttackPhase::AttackFailed
                | AttackPhase::BusOffReached
                | AttackPhase::Incomplete
        )
    }
}

impl fmt::Display for AttackPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttackPhase::Observing => write!(f, "Observing"),
            AttackPhase::PatternFound => write!(f, "Pattern Found"),
            AttackPhase::NoPattern => write!(f, "No Pattern"),
            AttackPhase::AttackFailed => write!(f, "Attack Failed"),
            AttackPhase::RapidCollision => write!(f, "Rapid Collision (Phase 1)"),
            AttackPhase::ErrorPassiveReached => write!(f, "Error-Passive Reached"),
            AttackPhase::SawtoothCollision => write!(f, "Sawtooth Collision (Phase 2)"),
            AttackPhase::BusOffReached => write!(f, "Bus-Off Reached"),
            AttackPhase::Incomplete => write!(f, "Incomplete"),
        }
    }
}

pub struct AttackDriver {
    config: TrialConfig,
    timing: BusTiming,
    bus: CanBus,
    victim: EcuId,
    attacker: EcuId,
    phase: AttackPhase,
    step_index: u64,
    current_time_ms: f64,
    attack_step_start: u64,
    timeline: Option<Vec<TimelineEvent>>,
    verbose: bool,
}

impl AttackDriver {
    pub fn new(config: &TrialConfig, bus_speed_kbps: u32) -> Result<Self, ConfigError> {
        if bus_speed_kbps == 0 {
            return Err(ConfigError::ZeroBusSpeed);
        }
        config.validate()?;

        let traffic = TrafficGenerator::new(&config.traffic)
            .map_err(|e| ConfigError::InvalidTraffic(e.to_string()))?;
        let mut bus = CanBus::new();
        let victim = bus.attach(Ecu::victim(VICTIM_NAME, traffic));
        let attacker = bus.attach(Ecu::attacker(ATTACKER_NAME));

        Ok(Self {
            config: config.clone(),
            timing: BusTiming::new(bus_speed_kbps, config.timing.clone()),
            bus,
            victim,
            attacker,
            phase: AttackPhase::Observing,
            step_index: 0,
            current_time_ms: 0.0,
            attack_step_start: 0,
            timeline: None,
            verbose: false,
        })
    }

    /// Forward every TEC change of both nodes to `sink`
    pub fn with_event_sink(mut self, sink: TecEventSink) -> Self {
        self.bus = std::mem::take(&mut self.bus).with_event_sink(sink);
        self
    }

    /// Narrate phases, collisions and state transitions on the console
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self.bus = std::mem::take(&mut self.bus).with_verbose(verbose);
        self
    }

    /// Record one `TimelineEvent` per round in the result
    pub fn collect_timeline(mut self, enabled: bool) -> Self {
        self.timeline = enabled.then(Vec::new);
        self
    }

    pub fn phase(&self) -> AttackPhase {
        self.phase
    }

    pub fn timing(&self) -> &BusTiming {
        &self.timing
    }

    pub fn run<R: Rng + ?Sized>(mut self, rng: &mut R) -> TrialResult {
        self.observe(rng);

        let pattern = self
            .bus
            .ecu_mut(self.attacker)
            .strategy_mut()
            .and_then(|strategy| strategy.analyze_captured());
        let fabricated = self
            .bus
            .ecu(self.attacker)
            .strategy()
            .and_then(|strategy| strategy.fabricate_frame());

        let (Some(pattern), Some(fabricated)) = (pattern, fabricated) else {
            self.enter(AttackPhase::NoPattern);
            self.log_step(PhaseLabel::Attack, "no_pattern_found");
            return self.finish(TrialOutcome::NoPatternFound, None, None, None, rng);
        };

        self.attack_step_start = self.step_index;

        let failure_rate = self.config.failure_rate(self.timing.bus_speed_kbps());
        if rng.gen_bool(failure_rate) {
            self.enter(AttackPhase::AttackFailed);
            self.log_step(PhaseLabel::Attack, "timing_failure");
            return self.finish(TrialOutcome::TimingFailure, Some(pattern), None, None, rng);
        }

        self.enter(AttackPhase::PatternFound);
        self.log_step(PhaseLabel::Attack, &format!("pattern_found:{}", pattern));

        if !self.rapid_collisions(&fabricated) {
            return self.finish(TrialOutcome::Incomplete, Some(pattern), None, None, rng);
        }

        let steps_to_error_passive = Some(self.step_index - self.attack_step_start);
        self.enter(AttackPhase::ErrorPassiveReached);
        self.log_step(PhaseLabel::Attack, "error_passive_transition");

        if !self.sawtooth_collisions(&fabricated, rng) {
            return self.finish(
                TrialOutcome::Incomplete,
                Some(pattern),
                steps_to_error_passive,
                None,
                rng,
            );
        }

        let steps_to_bus_off = Some(self.step_index - self.attack_step_start);
        self.enter(AttackPhase::BusOffReached);
        self.log_step(PhaseLabel::Attack, "bus_off_reached");

        self.finish(
            TrialOutcome::BusOff,
            Some(pattern),
            steps_to_error_passive,
            steps_to_bus_off,
            rng,
        )
    }

    fn observe<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let interval = self.config.periodic_interval;

        for _ in 0..self.config.observation_rounds {
            let kind = TrafficKind::for_round(self.step_index, interval);
            if let Some(frame) = self.victim_frame(kind, rng) {
                self.bus.send(self.victim, frame);
            }
            self.bus.listen(self.attacker);

            self.log_step(PhaseLabel::Analysis, kind.note());
            self.step_index += 1;
            self.current_time_ms += self.timing.step_ms();
        }
    }

    /// Phase 1; false when the round cap was hit first
    fn rapid_collisions(&mut self, fabricated: &CanFrame) -> bool {
        self.enter(AttackPhase::RapidCollision);

        while self.victim_state() == ErrorState::ErrorActive {
            self.advance();
            self.collide(fabricated);
            self.log_step(PhaseLabel::Attack, "collision");

            if self.victim_state() == ErrorState::ErrorActive
                && self.step_index > self.config.max_rounds
            {
                self.round_limit_reached();
                return false;
            }
        }
        true
    }

    /// Phase 2; false when the round cap was hit first
    fn sawtooth_collisions<R: Rng + ?Sized>(&mut self, fabricated: &CanFrame, rng: &mut R) -> bool {
        self.enter(AttackPhase::SawtoothCollision);

        loop {
            for _ in 1..self.config.periodic_interval {
                self.advance();
                if let Some(frame) = self.victim_frame(TrafficKind::NonPeriodic, rng) {
                    self.bus.send(self.victim, frame);
                }
                self.bus.resolve_round();
                self.log_step(PhaseLabel::Attack, TrafficKind::NonPeriodic.note());
            }

            self.advance();
            self.collide(fabricated);
            self.log_step(PhaseLabel::Attack, "collision");

            if self.victim_state() == ErrorState::BusOff {
                return true;
            }
            if self.step_index > self.config.max_rounds {
                self.round_limit_reached();
                return false;
            }
        }
    }

    /// Victim offers its periodic frame first, the attacker second
    fn collide(&mut self, fabricated: &CanFrame) {
        let periodic = self
            .bus
            .ecu(self.victim)
            .traffic()
            .map(|traffic| traffic.periodic_frame().clone());
        if let Some(frame) = periodic {
            self.bus.send(self.victim, frame);
        }
        self.bus.send(self.attacker, fabricated.clone());
        self.bus.resolve_round();
    }

    fn victim_frame<R: Rng + ?Sized>(&self, kind: TrafficKind, rng: &mut R) -> Option<CanFrame> {
        self.bus
            .ecu(self.victim)
            .traffic()
            .map(|traffic| traffic.frame(kind, rng))
    }

    fn victim_state(&self) -> ErrorState {
        self.bus.ecu(self.victim).error_state()
    }

    fn advance(&mut self) {
        self.step_index += 1;
        self.current_time_ms += self.timing.step_ms();
    }

    fn round_limit_reached(&mut self) {
        self.enter(AttackPhase::Incomplete);
        self.log_step(PhaseLabel::Attack, "round_limit_reached");
    }

    fn enter(&mut self, phase: AttackPhase) {
        self.phase = phase;
        if !self.verbose {
            return;
        }

        let label = format!("[{}]", phase);
        let label = if phase == AttackPhase::BusOffReached {
            label.red().bold()
        } else if phase.is_terminal() {
            label.yellow().bold()
        } else {
            label.cyan().bold()
        };
        println!(
            "{} round {} ({:.3} ms), victim TEC {}",
            label,
            self.step_index,
            self.current_time_ms,
            self.bus.ecu(self.victim).tec()
        );
    }

    fn log_step(&mut self, phase: PhaseLabel, note: &str) {
        let Some(timeline) = self.timeline.as_mut() else {
            return;
        };

        let victim = self.bus.ecu(self.victim);
        let attacker = self.bus.ecu(self.attacker);
        timeline.push(TimelineEvent {
            step_index: self.step_index,
            time_ms: round_ms(self.current_time_ms),
            bus_speed_kbps: self.timing.bus_speed_kbps(),
            phase,
            victim_tec: victim.tec(),
            attacker_tec: attacker.tec(),
            victim_state: victim.error_state(),
            attacker_state: attacker.error_state(),
            note: note.to_string(),
        });
    }

    /// Bus-Off jitter is drawn before the Error-Passive jitter
    fn finish<R: Rng + ?Sized>(
        self,
        outcome: TrialOutcome,
        pattern: Option<Pattern>,
        steps_to_error_passive: Option<u64>,
        steps_to_bus_off: Option<u64>,
        rng: &mut R,
    ) -> TrialResult {
        let time_to_bus_off_ms = steps_to_bus_off
            .filter(|steps| *steps > 0)
            .map(|steps| round_ms(self.timing.bus_time_ms(steps, rng)));
        let time_to_error_passive_ms = steps_to_error_passive
            .filter(|steps| *steps > 0)
            .map(|_| round_ms(self.timing.bus_time_ms(ERROR_PASSIVE_COLLISIONS, rng)));

        let victim = self.bus.ecu(self.victim);
        let attacker = self.bus.ecu(self.attacker);

        TrialResult {
            bus_speed_kbps: self.timing.bus_speed_kbps(),
            step_ms: round_ms(self.timing.step_ms()),
            time_to_error_passive_ms,
            time_to_bus_off_ms,
            steps_to_error_passive,
            steps_to_bus_off,
            victim_final_tec: victim.tec(),
            attacker_final_tec: attacker.tec(),
            victim_final_state: victim.error_state(),
            attacker_final_state: attacker.error_state(),
            victim_bus_off: victim.error_state() == ErrorState::BusOff,
            outcome,
            pattern,
            trial: None,
            timeline: self.timeline.unwrap_or_default(),
        }
    }
}

/// Run one trial with default driver options
pub fn run_trial<R: Rng + ?Sized>(
    config: &TrialConfig,
    bus_speed_kbps: u32,
    rng: &mut R,
) -> Result<TrialResult, ConfigError> {
    Ok(AttackDriver::new(config, bus_speed_kbps)?.run(rng))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::BTreeMap;

    fn reliable_config() -> TrialConfig {
        TrialConfig {
            failure_rates: BTreeMap::new(),
            default_failure_rate: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_error_passive_collision_count() {
        assert_eq!(ERROR_PASSIVE_COLLISIONS, 17);
    }

    #[test]
    fn test_new_driver_is_observing() {
        let driver = AttackDriver::new(&TrialConfig::default(), 250).unwrap();
        assert_eq!(driver.phase(), AttackPhase::Observing);
        assert!(!driver.phase().is_terminal());
        assert!((driver.timing().step_ms() - 0.444).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_zero_speed() {
        assert!(matches!(
            AttackDriver::new(&TrialConfig::default(), 0),
            Err(ConfigError::ZeroBusSpeed)
        ));
    }

    #[test]
    fn test_full_attack_reaches_bus_off() {
        let mut rng = StdRng::seed_from_u64(42);
        let result = run_trial(&reliable_config(), 500, &mut rng).unwrap();

        assert_eq!(result.outcome, TrialOutcome::BusOff);
        assert!(result.victim_bus_off);
        assert_eq!(result.steps_to_error_passive, Some(16));
        assert_eq!(result.steps_to_bus_off, Some(176));
        assert_eq!(result.victim_final_tec, 256);
        assert_eq!(result.victim_final_state, ErrorState::BusOff);
        assert_eq!(result.attacker_final_tec, 72);
        assert_eq!(result.attacker_final_state, ErrorState::ErrorActive);
        assert_eq!(result.step_ms, 0.222);

        let pattern = result.pattern.unwrap();
        assert_eq!(pattern.precedent_id.value(), 0x080);
        assert_eq!(pattern.periodic_id.value(), 0x100);

        // 176 collision cycles of 0.478 ms, +-10%
        let bus_off_ms = result.time_to_bus_off_ms.unwrap();
        assert!(bus_off_ms >= 176.0 * 0.478 * 0.9 - 0.001);
        assert!(bus_off_ms <= 176.0 * 0.478 * 1.1 + 0.001);
        let error_passive_ms = result.time_to_error_passive_ms.unwrap();
        assert!(error_passive_ms >= 17.0 * 0.478 * 0.9 - 0.001);
        assert!(error_passive_ms <= 17.0 * 0.478 * 1.1 + 0.001);
        assert!(result.timeline.is_empty());
    }

    #[test]
    fn test_timing_failure_leaves_nodes_untouched() {
        let config = TrialConfig {
            failure_rates: BTreeMap::new(),
            default_failure_rate: 1.0,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(7);
        let result = run_trial(&config, 250, &mut rng).unwrap();

        assert_eq!(result.outcome, TrialOutcome::TimingFailure);
        assert!(result.pattern.is_some());
        assert_eq!(result.victim_final_tec, 0);
        assert_eq!(result.attacker_final_tec, 0);
        assert_eq!(result.steps_to_error_passive, None);
        assert_eq!(result.time_to_bus_off_ms, None);
    }

    #[test]
    fn test_short_observation_finds_no_pattern() {
        let config = TrialConfig {
            observation_rounds: 3,
            ..reliable_config()
        };
        let mut rng = StdRng::seed_from_u64(1);
        let driver = AttackDriver::new(&config, 500).unwrap().collect_timeline(true);
        let result = driver.run(&mut rng);

        assert_eq!(result.outcome, TrialOutcome::NoPatternFound);
        assert!(result.pattern.is_none());
        assert!(!result.victim_bus_off);
        assert_eq!(result.timeline.len(), 4);
        assert_eq!(result.timeline[3].note, "no_pattern_found");
    }

    #[test]
    fn test_round_cap_makes_trial_incomplete() {
        let config = TrialConfig {
            max_rounds: 320,
            ..reliable_config()
        };
        let mut rng = StdRng::seed_from_u64(42);
        let result = run_trial(&config, 500, &mut rng).unwrap();

        // One sawtooth cycle: 128 - 4 + 8
        assert_eq!(result.outcome, TrialOutcome::Incomplete);
        assert_eq!(result.victim_final_tec, 132);
        assert_eq!(result.victim_final_state, ErrorState::ErrorPassive);
        assert_eq!(result.attacker_final_tec, 103);
        assert_eq!(result.steps_to_error_passive, Some(16));
        assert_eq!(result.steps_to_bus_off, None);
        assert!(result.time_to_error_passive_ms.is_some());
        assert!(result.time_to_bus_off_ms.is_none());
    }

    #[test]
    fn test_timeline_notes_and_phases() {
        let mut rng = StdRng::seed_from_u64(42);
        let driver = AttackDriver::new(&reliable_config(), 1000)
            .unwrap()
            .collect_timeline(true);
        let result = driver.run(&mut rng);
        let timeline = &result.timeline;

        let analysis = timeline
            .iter()
            .filter(|event| event.phase == PhaseLabel::Analysis)
            .count();
        assert_eq!(analysis, 300);
        assert_eq!(timeline[0].note, "periodic_frame");
        assert_eq!(timeline[4].note, "preceded_frame");
        assert_eq!(timeline[300].note, "pattern_found:0x080->0x100");
        assert_eq!(timeline[300].step_index, 300);

        let transition = timeline
            .iter()
            .find(|event| event.note == "error_passive_transition")
            .unwrap();
        assert_eq!(transition.step_index, 316);
        assert_eq!(transition.victim_tec, 128);

        let last = timeline.last().unwrap();
        assert_eq!(last.note, "bus_off_reached");
        assert_eq!(last.step_index, 476);
        assert_eq!(last.victim_state, ErrorState::BusOff);
        assert_eq!(last.bus_speed_kbps, 1000);
        assert!((last.time_ms - 476.0 * 0.111).abs() < 0.01);

        // Sawtooth: first uncontested rounds pull the victim back under the threshold
        let dip = timeline
            .iter()
            .filter(|event| event.note == "non_periodic" && event.phase == PhaseLabel::Attack)
            .map(|event| event.victim_tec)
            .min()
            .unwrap();
        assert_eq!(dip, 124);
    }

    #[test]
    fn test_same_seed_same_result() {
        let config = TrialConfig::default();
        let first = run_trial(&config, 1000, &mut StdRng::seed_from_u64(99)).unwrap();
        let second = run_trial(&config, 1000, &mut StdRng::seed_from_u64(99)).unwrap();
        assert_eq!(first, second);
    }
}
