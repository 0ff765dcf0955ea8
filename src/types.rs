use serde::{Deserialize, Serialize};
use std::fmt;

/// Width of a standard (11-bit) CAN identifier
pub const CAN_ID_BITS: u32 = 11;
/// Highest valid standard identifier
pub const MAX_STANDARD_ID: u16 = 0x7FF;
/// Width of the data-length code
pub const DLC_BITS: u32 = 4;
/// Classic CAN payload limit
pub const MAX_PAYLOAD_LEN: usize = 8;

/// Reasons a frame cannot be built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Identifier does not fit in 11 bits
    IdOutOfRange(u16),
    /// DLC does not fit in 4 bits
    DlcOutOfRange(u8),
    /// More than 8 payload bytes
    PayloadTooLong(usize),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::IdOutOfRange(id) => {
                write!(f, "CAN ID 0x{:X} exceeds the 11-bit range (max 0x7FF)", id)
            }
            FrameError::DlcOutOfRange(dlc) => write!(f, "DLC {} does not fit in 4 bits", dlc),
            FrameError::PayloadTooLong(len) => {
                write!(f, "Payload of {} bytes exceeds the 8-byte limit", len)
            }
        }
    }
}

impl std::error::Error for FrameError {}

/// Standard 11-bit CAN identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct CanId(u16);

impl CanId {
    pub fn new(raw: u16) -> Result<Self, FrameError> {
        if raw > MAX_STANDARD_ID {
            return Err(FrameError::IdOutOfRange(raw));
        }
        Ok(Self(raw))
    }

    /// Keep only the low 11 bits. Used for compile-time constants.
    pub const fn from_bits_truncate(raw: u16) -> Self {
        Self(raw & MAX_STANDARD_ID)
    }

    pub fn value(&self) -> u16 {
        self.0
    }

    /// Identifier bits, most-significant first (`true` = recessive 1)
    pub fn bits(self) -> impl Iterator<Item = bool> {
        let raw = self.0;
        (0..CAN_ID_BITS).rev().map(move |i| (raw >> i) & 1 == 1)
    }
}

impl TryFrom<u16> for CanId {
    type Error = FrameError;

    fn try_from(raw: u16) -> Result<Self, Self::Error> {
        CanId::new(raw)
    }
}

impl From<CanId> for u16 {
    fn from(id: CanId) -> u16 {
        id.0
    }
}

impl fmt::Display for CanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:03X}", self.0)
    }
}

/// 4-bit data-length code
///
/// The all-zero code is the most dominant value a sender can put on the wire,
/// which is what the fabricated attack frame relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Dlc(u8);

impl Dlc {
    pub const DOMINANT: Dlc = Dlc(0);

    pub fn new(raw: u8) -> Result<Self, FrameError> {
        if raw > 0x0F {
            return Err(FrameError::DlcOutOfRange(raw));
        }
        Ok(Self(raw))
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    /// DLC bits, most-significant first (`true` = recessive 1)
    pub fn bits(self) -> impl Iterator<Item = bool> {
        let raw = self.0;
        (0..DLC_BITS).rev().map(move |i| (raw >> i) & 1 == 1)
    }
}

impl TryFrom<u8> for Dlc {
    type Error = FrameError;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        Dlc::new(raw)
    }
}

impl From<Dlc> for u8 {
    fn from(dlc: Dlc) -> u8 {
        dlc.0
    }
}

impl fmt::Display for Dlc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04b}", self.0)
    }
}

/// CAN frame as seen by the arbitration logic - identifier, DLC and payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanFrame {
    id: CanId,
    dlc: Dlc,
    data: Vec<u8>, // 0-8 bytes
}

impl CanFrame {
    /// Build a frame whose DLC matches the payload length
    pub fn new(id: CanId, data: Vec<u8>) -> Result<Self, FrameError> {
        if data.len() > MAX_PAYLOAD_LEN {
            return Err(FrameError::PayloadTooLong(data.len()));
        }
        let dlc = Dlc(data.len() as u8);
        Ok(Self { id, dlc, data })
    }

    /// Build a frame with an explicit DLC, which may disagree with the payload length
    pub fn with_dlc(id: CanId, dlc: Dlc, data: Vec<u8>) -> Result<Self, FrameError> {
        if data.len() > MAX_PAYLOAD_LEN {
            return Err(FrameError::PayloadTooLong(data.len()));
        }
        Ok(Self { id, dlc, data })
    }

    /// Caller guarantees `data.len() <= 8`
    pub(crate) fn from_short_payload(id: CanId, data: Vec<u8>) -> Self {
        debug_assert!(data.len() <= MAX_PAYLOAD_LEN);
        let dlc = Dlc(data.len() as u8);
        Self { id, dlc, data }
    }

    pub fn id(&self) -> CanId {
        self.id
    }

    pub fn dlc(&self) -> Dlc {
        self.dlc
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Display for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "id={} dlc={} data=[", self.id, self.dlc)?;
        for (i, byte) in self.data.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{:02X}", byte)?;
        }
        write!(f, "]")
    }
}
