/// CAN Fault Confinement Module
///
/// Transmit error counter (TEC) bookkeeping for one controller and the
/// Error-Active / Error-Passive / Bus-Off classification derived from it.
/// Only transmit-side accounting is modelled: a transmit error costs 8,
/// a successful transmission earns 1 back.
use colored::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// TEC penalty for one transmit error
pub const TRANSMIT_ERROR_PENALTY: u32 = 8;
/// TEC credit for one successful transmission
pub const SUCCESS_CREDIT: u32 = 1;
/// Above this value an Error-Active node turns Error-Passive
pub const ERROR_PASSIVE_THRESHOLD: u32 = 127;
/// Above this value a node is Bus-Off
pub const BUS_OFF_THRESHOLD: u32 = 255;

/// Fault confinement state of a CAN controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorState {
    /// Normal participation, active error flags
    #[serde(rename = "EA")]
    ErrorActive,
    /// Passive error flags only
    #[serde(rename = "EP")]
    ErrorPassive,
    /// Disconnected from the bus for good
    #[serde(rename = "BO")]
    BusOff,
}

impl ErrorState {
    /// Short label used in result records
    pub fn label(&self) -> &'static str {
        match self {
            ErrorState::ErrorActive => "EA",
            ErrorState::ErrorPassive => "EP",
            ErrorState::BusOff => "BO",
        }
    }
}

impl fmt::Display for ErrorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorState::ErrorActive => write!(f, "{}", "ERROR-ACTIVE".green().bold()),
            ErrorState::ErrorPassive => write!(f, "{}", "ERROR-PASSIVE".yellow().bold()),
            ErrorState::BusOff => write!(f, "{}", "BUS-OFF".red().bold()),
        }
    }
}

/// One TEC change of one node, for timeline reconstruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TecEvent {
    pub ecu_name: String,
    pub tec: u32,
    pub state: ErrorState,
}

/// Outcome of a single counter update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TecChange {
    pub previous_tec: u32,
    pub tec: u32,
    pub previous_state: ErrorState,
    pub state: ErrorState,
}

impl TecChange {
    pub fn transitioned(&self) -> bool {
        self.previous_state != self.state
    }

    pub fn counter_moved(&self) -> bool {
        self.previous_tec != self.tec
    }
}

/// Transmit error counter with tri-state classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorCounter {
    tec: u32,
    state: ErrorState,
}

impl ErrorCounter {
    pub fn new() -> Self {
        Self {
            tec: 0,
            state: ErrorState::ErrorActive,
        }
    }

    pub fn tec(&self) -> u32 {
        self.tec
    }

    pub fn state(&self) -> ErrorState {
        self.state
    }

    pub fn is_bus_off(&self) -> bool {
        self.state == ErrorState::BusOff
    }

    /// Apply a transmit error (TEC += 8)
    ///
    /// Bus-Off is checked independently of the passive transition, so one
    /// increment that crosses both thresholds still ends in Bus-Off.
    pub fn increment_transmit_error(&mut self) -> TecChange {
        let previous_tec = self.tec;
        let previous_state = self.state;

        if self.state != ErrorState::BusOff {
            self.tec += TRANSMIT_ERROR_PENALTY;

            if self.state == ErrorState::ErrorActive && self.tec > ERROR_PASSIVE_THRESHOLD {
                self.state = ErrorState::ErrorPassive;
            }
            if self.tec > BUS_OFF_THRESHOLD {
                self.state = ErrorState::BusOff;
            }
        }

        TecChange {
            previous_tec,
            tec: self.tec,
            previous_state,
            state: self.state,
        }
    }

    /// Apply a successful transmission (TEC -= 1, floored at 0)
    pub fn decrement_on_success(&mut self) -> TecChange {
        let previous_tec = self.tec;
        let previous_state = self.state;

        if self.state != ErrorState::BusOff {
            self.tec = self.tec.saturating_sub(SUCCESS_CREDIT);

            if self.state == ErrorState::ErrorPassive && self.tec <= ERROR_PASSIVE_THRESHOLD {
                self.state = ErrorState::ErrorActive;
            }
        }

        TecChange {
            previous_tec,
            tec: self.tec,
            previous_state,
            state: self.state,
        }
    }
}

impl Default for ErrorCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let counter = ErrorCounter::new();
        assert_eq!(counter.tec(), 0);
        assert_eq!(counter.state(), ErrorState::ErrorActive);
    }

    #[test]
    fn test_error_passive_after_16_errors() {
        let mut counter = ErrorCounter::new();
        for _ in 0..15 {
            counter.increment_transmit_error();
        }
        assert_eq!(counter.tec(), 120);
        assert_eq!(counter.state(), ErrorState::ErrorActive);

        let change = counter.increment_transmit_error();
        assert_eq!(counter.tec(), 128);
        assert_eq!(counter.state(), ErrorState::ErrorPassive);
        assert!(change.transitioned());
    }

    #[test]
    fn test_bus_off_after_32_errors() {
        let mut counter = ErrorCounter::new();
        for _ in 0..31 {
            counter.increment_transmit_error();
        }
        assert_eq!(counter.state(), ErrorState::ErrorPassive);

        counter.increment_transmit_error();
        assert_eq!(counter.tec(), 256);
        assert_eq!(counter.state(), ErrorState::BusOff);
    }

    #[test]
    fn test_decrement_floors_at_zero() {
        let mut counter = ErrorCounter::new();
        let change = counter.decrement_on_success();
        assert_eq!(counter.tec(), 0);
        assert!(!change.counter_moved());
    }

    #[test]
    fn test_passive_recovers_to_active() {
        let mut counter = ErrorCounter::new();
        for _ in 0..16 {
            counter.increment_transmit_error();
        }
        assert_eq!(counter.state(), ErrorState::ErrorPassive);

        counter.decrement_on_success();
        assert_eq!(counter.tec(), 127);
        assert_eq!(counter.state(), ErrorState::ErrorActive);
    }

    #[test]
    fn test_bus_off_is_terminal() {
        let mut counter = ErrorCounter::new();
        for _ in 0..32 {
            counter.increment_transmit_error();
        }
        assert!(counter.is_bus_off());

        counter.decrement_on_success();
        counter.increment_transmit_error();
        assert_eq!(counter.tec(), 256);
        assert_eq!(counter.state(), ErrorState::BusOff);
    }

    #[test]
    fn test_bus_off_not_skipped_when_passive_skipped() {
        // Active with a counter already past the passive threshold
        let mut counter = ErrorCounter {
            tec: 250,
            state: ErrorState::ErrorActive,
        };
        counter.increment_transmit_error();
        assert_eq!(counter.tec(), 258);
        assert_eq!(counter.state(), ErrorState::BusOff);
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(ErrorState::ErrorActive.label(), "EA");
        assert_eq!(ErrorState::ErrorPassive.label(), "EP");
        assert_eq!(ErrorState::BusOff.label(), "BO");
        assert_eq!(
            serde_json::to_string(&ErrorState::BusOff).unwrap(),
            "\"BO\""
        );
    }
}
