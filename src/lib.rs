pub mod attack_driver;
pub mod attacker;
pub mod can_bus;
pub mod config;
pub mod ecu;
pub mod error_state;
pub mod jsonl;
pub mod metrics;
pub mod pattern;
pub mod results;
pub mod sweep;
pub mod timeline;
pub mod timing;
pub mod traffic;
pub mod types;

pub use attack_driver::{AttackDriver, AttackPhase, run_trial};
pub use attacker::AttackStrategy;
pub use can_bus::{CanBus, EcuId, TecEventSink};
pub use config::{ConfigError, SweepConfig, TrialConfig};
pub use ecu::{Ecu, EcuRole};
pub use error_state::{ErrorCounter, ErrorState, TecEvent};
pub use metrics::SweepSummary;
pub use pattern::{Pattern, PatternAnalyzer};
pub use results::{PhaseLabel, TimelineEvent, TrialOutcome, TrialResult};
pub use sweep::{SweepError, run_single_detailed, run_speed_sweep, run_trials};
pub use timing::{BusTiming, TimingProfile};
pub use traffic::{TrafficGenerator, TrafficProfile};
pub use types::{CanFrame, CanId, Dlc, FrameError};
