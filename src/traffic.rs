/// Victim Traffic Generation
///
/// The victim ECU transmits a periodic frame that is always announced by the
/// same "preceded" frame, plus background traffic with random identifiers.
use crate::types::{CanFrame, CanId, FrameError};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Identifiers and payloads of the victim's traffic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficProfile {
    /// Frame that always comes right before the periodic one
    pub preceded_id: u16,
    pub preceded_data: Vec<u8>,
    /// Periodic frame targeted by the attack
    pub periodic_id: u16,
    pub periodic_data: Vec<u8>,
    /// Inclusive identifier range of background frames
    pub non_periodic_id_min: u16,
    pub non_periodic_id_max: u16,
}

impl Default for TrafficProfile {
    fn default() -> Self {
        Self {
            preceded_id: 0x080,
            preceded_data: vec![0x44],
            periodic_id: 0x100,
            periodic_data: vec![0x12],
            non_periodic_id_min: 0x300,
            non_periodic_id_max: 0x3FF,
        }
    }
}

/// What the victim puts on the bus in a given round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficKind {
    Preceded,
    Periodic,
    NonPeriodic,
}

impl TrafficKind {
    /// Schedule used while the attacker is observing: the preceded frame
    /// closes every interval, the periodic frame opens the next one.
    pub fn for_round(index: u64, interval: u64) -> Self {
        if (index + 1) % interval == 0 {
            TrafficKind::Preceded
        } else if index % interval == 0 {
            TrafficKind::Periodic
        } else {
            TrafficKind::NonPeriodic
        }
    }

    pub fn note(&self) -> &'static str {
        match self {
            TrafficKind::Preceded => "preceded_frame",
            TrafficKind::Periodic => "periodic_frame",
            TrafficKind::NonPeriodic => "non_periodic",
        }
    }
}

/// Traffic capability held by victim-role ECUs
#[derive(Debug, Clone)]
pub struct TrafficGenerator {
    preceded_frame: CanFrame,
    periodic_frame: CanFrame,
    non_periodic_min: u16,
    non_periodic_max: u16,
}

impl TrafficGenerator {
    pub fn new(profile: &TrafficProfile) -> Result<Self, FrameError> {
        let preceded_frame =
            CanFrame::new(CanId::new(profile.preceded_id)?, profile.preceded_data.clone())?;
        let periodic_frame =
            CanFrame::new(CanId::new(profile.periodic_id)?, profile.periodic_data.clone())?;
        let min = CanId::new(profile.non_periodic_id_min)?.value();
        let max = CanId::new(profile.non_periodic_id_max)?.value();

        Ok(Self {
            preceded_frame,
            periodic_frame,
            non_periodic_min: min.min(max),
            non_periodic_max: min.max(max),
        })
    }

    pub fn preceded_frame(&self) -> &CanFrame {
        &self.preceded_frame
    }

    pub fn periodic_frame(&self) -> &CanFrame {
        &self.periodic_frame
    }

    /// Background frame: random id in range, 1-8 random bytes, DLC = length
    pub fn non_periodic_frame<R: Rng + ?Sized>(&self, rng: &mut R) -> CanFrame {
        let id = CanId::from_bits_truncate(
            rng.gen_range(self.non_periodic_min..=self.non_periodic_max),
        );
        let len = rng.gen_range(1..=8usize);
        let data: Vec<u8> = (0..len).map(|_| rng.gen_range(0..=u8::MAX)).collect();
        CanFrame::from_short_payload(id, data)
    }

    pub fn frame<R: Rng + ?Sized>(&self, kind: TrafficKind, rng: &mut R) -> CanFrame {
        match kind {
            TrafficKind::Preceded => self.preceded_frame.clone(),
            TrafficKind::Periodic => self.periodic_frame.clone(),
            TrafficKind::NonPeriodic => self.non_periodic_frame(rng),
        }
    }
}
