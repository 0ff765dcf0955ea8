/// Virtual CAN Bus
///
/// Buffers the frames offered in one arbitration round, resolves collisions by
/// bit dominance and applies the fault-confinement side effects to the ECUs it
/// owns. One round is in flight at a time; it is cleared by every resolution.
use crate::ecu::Ecu;
use crate::error_state::{ErrorState, TecChange, TecEvent};
use crate::types::CanFrame;
use colored::*;
use tokio::sync::mpsc;

/// Sending half of the TEC event channel, for timeline reconstruction
pub type TecEventSink = mpsc::UnboundedSender<TecEvent>;

/// Handle of an ECU attached to a bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EcuId(usize);

/// A frame offered to the bus and the ECU that offered it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transmission {
    pub frame: CanFrame,
    pub sender: EcuId,
}

/// Outcome of bitwise arbitration over one round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arbitration {
    /// Index of the winning entry in the round
    pub winner: usize,
    /// Set when the DLC bits of two same-id frames disagreed
    pub arbitration_error: bool,
}

/// Compare same-identifier entries DLC bit by bit, MSB first
///
/// The first differing bit decides: the dominant `0` wins. Either way the
/// disagreement is an arbitration error for the round, so the result does
/// not depend on which frame was offered first. Entries with another
/// identifier are not compared and the current winner is kept.
pub fn arbitrate(round: &[Transmission]) -> Arbitration {
    let mut winner = 0;
    let mut arbitration_error = false;

    for (idx, candidate) in round.iter().enumerate().skip(1) {
        let current = &round[winner].frame;
        if candidate.frame.id() != current.id() {
            continue;
        }

        let candidate_bits = candidate.frame.dlc().bits();
        let current_bits = current.dlc().bits();
        if let Some((candidate_bit, _)) = candidate_bits.zip(current_bits).find(|(c, w)| c != w) {
            arbitration_error = true;
            if !candidate_bit {
                winner = idx;
            }
        }
    }

    Arbitration {
        winner,
        arbitration_error,
    }
}

pub struct CanBus {
    ecus: Vec<Ecu>,
    round: Vec<Transmission>,
    event_sink: Option<TecEventSink>,
    verbose: bool,
}

impl CanBus {
    pub fn new() -> Self {
        Self {
            ecus: Vec::new(),
            round: Vec::new(),
            event_sink: None,
            verbose: false,
        }
    }

    /// Print collisions and state transitions to the console
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Forward every TEC change to `sink`
    pub fn with_event_sink(mut self, sink: TecEventSink) -> Self {
        self.event_sink = Some(sink);
        self
    }

    /// Connect an ECU to the bus
    pub fn attach(&mut self, ecu: Ecu) -> EcuId {
        self.ecus.push(ecu);
        EcuId(self.ecus.len() - 1)
    }

    pub fn ecu(&self, id: EcuId) -> &Ecu {
        &self.ecus[id.0]
    }

    pub fn ecu_mut(&mut self, id: EcuId) -> &mut Ecu {
        &mut self.ecus[id.0]
    }

    pub fn ecus(&self) -> &[Ecu] {
        &self.ecus
    }

    /// Number of frames offered in the current round
    pub fn pending_count(&self) -> usize {
        self.round.len()
    }

    /// Transmit gate: frames from a Bus-Off ECU are dropped silently
    pub fn send(&mut self, sender: EcuId, frame: CanFrame) -> bool {
        let ecu = &self.ecus[sender.0];
        if !ecu.can_transmit() {
            if self.verbose {
                println!(
                    "{} [{}] Cannot send; ECU is Bus-Off",
                    "✗".red(),
                    ecu.name().bright_black()
                );
            }
            return false;
        }

        if self.verbose {
            println!("{} [{}] Sending {}", "→".cyan(), ecu.name(), frame);
        }
        self.offer(frame, sender);
        true
    }

    /// Add a frame to the current round without any other effect
    pub fn offer(&mut self, frame: CanFrame, sender: EcuId) {
        self.round.push(Transmission { frame, sender });
    }

    /// Settle the current round and return the frame that made it onto the wire
    ///
    /// On an arbitration error every loser takes a transmit error. The winner
    /// takes one too, but only while the loser is still Error-Active after
    /// its own penalty; an Error-Passive loser's passive flag does not hit
    /// the winner. The winner then gets its success credit.
    pub fn resolve_round(&mut self) -> Option<Transmission> {
        if self.round.is_empty() {
            return None;
        }
        let round = std::mem::take(&mut self.round);

        let Arbitration {
            winner,
            arbitration_error,
        } = if round.len() > 1 {
            if self.verbose {
                println!(
                    "{} {} among {} nodes",
                    "⚠".yellow(),
                    "Collision detected".yellow().bold(),
                    round.len()
                );
            }
            arbitrate(&round)
        } else {
            Arbitration {
                winner: 0,
                arbitration_error: false,
            }
        };

        let winner_id = round[winner].sender;

        if arbitration_error {
            let mut penalize_winner = false;
            for loser in round.iter().filter(|t| t.sender != winner_id) {
                if self.apply_transmit_error(loser.sender) == ErrorState::ErrorActive {
                    penalize_winner = true;
                }
            }
            if penalize_winner {
                self.apply_transmit_error(winner_id);
            }
        }

        self.apply_success(winner_id);

        let delivered = round.into_iter().nth(winner);
        if self.verbose
            && let Some(transmission) = &delivered
        {
            println!(
                "{} Frame transmitted: {} by {}",
                "✓".green(),
                transmission.frame.id(),
                self.ecus[winner_id.0].name()
            );
        }
        delivered
    }

    /// Pull side of the bus: resolve the round on behalf of `listener`
    ///
    /// Frames sent by other ECUs are handed to the listener; a Bus-Off
    /// listener is disconnected and resolves nothing.
    pub fn listen(&mut self, listener: EcuId) -> Option<CanFrame> {
        if !self.ecus[listener.0].can_transmit() {
            return None;
        }

        let transmission = self.resolve_round()?;
        if transmission.sender != listener {
            self.ecus[listener.0].receive(transmission.frame.clone());
        }
        Some(transmission.frame)
    }

    fn apply_transmit_error(&mut self, id: EcuId) -> ErrorState {
        let (change, event) = self.ecus[id.0].increment_transmit_error();
        if change.counter_moved() {
            self.emit(event);
        }
        self.narrate(id, &change);
        change.state
    }

    fn apply_success(&mut self, id: EcuId) {
        let (change, event) = self.ecus[id.0].decrement_on_success();
        if let Some(event) = event {
            self.emit(event);
        }
        self.narrate(id, &change);
    }

    fn emit(&self, event: TecEvent) {
        if let Some(sink) = &self.event_sink {
            // A dropped receiver only means nobody is reconstructing a timeline
            let _ = sink.send(event);
        }
    }

    fn narrate(&self, id: EcuId, change: &TecChange) {
        if !self.verbose || !change.counter_moved() {
            return;
        }

        let name = self.ecus[id.0].name();
        println!(
            "  [{}] TEC {} -> {}",
            name.bright_black(),
            change.previous_tec,
            change.tec
        );
        if change.transitioned() {
            println!("{} [{}] Entered {} state", "→".red(), name, change.state);
        }
    }
}

impl Default for CanBus {
    fn default() -> Self {
        Self::new()
    }
}
