use crate::attacker::AttackStrategy;
use crate::error_state::{ErrorCounter, ErrorState, TecChange, TecEvent};
use crate::traffic::TrafficGenerator;
use crate::types::CanFrame;

/// Behaviour an ECU brings to the bus
#[derive(Debug, Clone)]
pub enum EcuRole {
    /// Legitimate node with periodic and background traffic
    Victim(TrafficGenerator),
    /// Node running the Bus-Off attack
    Attacker(AttackStrategy),
}

/// Electronic Control Unit (ECU) - one CAN controller on the simulated bus
#[derive(Debug, Clone)]
pub struct Ecu {
    name: String,
    counter: ErrorCounter,
    role: EcuRole,
    frames_received: u64,
}

impl Ecu {
    pub fn new(name: impl Into<String>, role: EcuRole) -> Self {
        Self {
            name: name.into(),
            counter: ErrorCounter::new(),
            role,
            frames_received: 0,
        }
    }

    pub fn victim(name: impl Into<String>, traffic: TrafficGenerator) -> Self {
        Self::new(name, EcuRole::Victim(traffic))
    }

    pub fn attacker(name: impl Into<String>) -> Self {
        Self::new(name, EcuRole::Attacker(AttackStrategy::new()))
    }

    /// Get ECU name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tec(&self) -> u32 {
        self.counter.tec()
    }

    pub fn error_state(&self) -> ErrorState {
        self.counter.state()
    }

    /// Bus-Off controllers never transmit again
    pub fn can_transmit(&self) -> bool {
        !self.counter.is_bus_off()
    }

    pub fn role(&self) -> &EcuRole {
        &self.role
    }

    pub fn traffic(&self) -> Option<&TrafficGenerator> {
        match &self.role {
            EcuRole::Victim(traffic) => Some(traffic),
            EcuRole::Attacker(_) => None,
        }
    }

    pub fn strategy(&self) -> Option<&AttackStrategy> {
        match &self.role {
            EcuRole::Attacker(strategy) => Some(strategy),
            EcuRole::Victim(_) => None,
        }
    }

    pub fn strategy_mut(&mut self) -> Option<&mut AttackStrategy> {
        match &mut self.role {
            EcuRole::Attacker(strategy) => Some(strategy),
            EcuRole::Victim(_) => None,
        }
    }

    /// Hand a frame sent by another node to this ECU
    pub(crate) fn receive(&mut self, frame: CanFrame) {
        self.frames_received += 1;
        if let EcuRole::Attacker(strategy) = &mut self.role {
            strategy.observe(frame);
        }
    }

    /// Counter updates are only driven by bus arbitration
    pub(crate) fn increment_transmit_error(&mut self) -> (TecChange, TecEvent) {
        let change = self.counter.increment_transmit_error();
        (change, self.tec_event())
    }

    /// Returns the event only if the counter was above zero beforehand
    pub(crate) fn decrement_on_success(&mut self) -> (TecChange, Option<TecEvent>) {
        let change = self.counter.decrement_on_success();
        let event = (change.previous_tec > 0).then(|| self.tec_event());
        (change, event)
    }

    fn tec_event(&self) -> TecEvent {
        TecEvent {
            ecu_name: self.name.clone(),
            tec: self.counter.tec(),
            state: self.counter.state(),
        }
    }

    /// Get ECU statistics
    pub fn get_stats(&self) -> EcuStats {
        EcuStats {
            name: self.name.clone(),
            tec: self.counter.tec(),
            state: self.counter.state(),
            frames_received: self.frames_received,
        }
    }
}

/// ECU Statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcuStats {
    pub name: String,
    pub tec: u32,
    pub state: ErrorState,
    pub frames_received: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traffic::TrafficProfile;

    #[test]
    fn test_roles() {
        let traffic = TrafficGenerator::new(&TrafficProfile::default()).unwrap();
        let victim = Ecu::victim("Victim", traffic);
        let attacker = Ecu::attacker("Attacker");

        assert!(victim.traffic().is_some());
        assert!(victim.strategy().is_none());
        assert!(attacker.strategy().is_some());
        assert!(attacker.traffic().is_none());
        assert_eq!(victim.error_state(), ErrorState::ErrorActive);
    }

    #[test]
    fn test_decrement_event_only_when_counter_moves() {
        let mut ecu = Ecu::attacker("Attacker");
        let (_, event) = ecu.decrement_on_success();
        assert!(event.is_none());

        let (_, event) = ecu.increment_transmit_error();
        assert_eq!(event.tec, 8);
        let (_, event) = ecu.decrement_on_success();
        assert_eq!(event.map(|e| e.tec), Some(7));
    }

    #[test]
    fn test_attacker_captures_received_frames() {
        let mut ecu = Ecu::attacker("Attacker");
        let frame = CanFrame::new(crate::types::CanId::new(0x80).unwrap(), vec![1]).unwrap();
        ecu.receive(frame);

        assert_eq!(ecu.get_stats().frames_received, 1);
        assert_eq!(ecu.strategy().map(|s| s.captured_count()), Some(1));
    }
}
