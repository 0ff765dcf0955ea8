/// Precedent Pattern Inference
///
/// First-order frequency analysis of captured traffic: for every identifier,
/// which identifier most often appears right before it. The best
/// (predecessor, successor) pair tells the attacker which frame announces the
/// periodic transmission it wants to collide with.
use crate::types::{CanFrame, CanId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A pair must be seen at least this many times to be trusted
pub const MIN_PATTERN_OCCURRENCES: u32 = 2;

/// Inferred "precedent announces periodic" relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pattern {
    pub precedent_id: CanId,
    pub periodic_id: CanId,
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.precedent_id, self.periodic_id)
    }
}

/// Predecessor counts for one successor identifier, in first-seen order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuccessorTally {
    pub successor: CanId,
    pub predecessors: Vec<(CanId, u32)>,
}

#[derive(Debug, Clone)]
pub struct PatternAnalyzer {
    min_occurrences: u32,
}

impl PatternAnalyzer {
    pub fn new() -> Self {
        Self {
            min_occurrences: MIN_PATTERN_OCCURRENCES,
        }
    }

    /// Count adjacent pairs, grouped by the successor identifier
    ///
    /// Groups and predecessors keep the order in which they were first seen.
    pub fn tally(traffic: &[CanFrame]) -> Vec<SuccessorTally> {
        let mut groups: Vec<SuccessorTally> = Vec::new();

        for pair in traffic.windows(2) {
            let predecessor = pair[0].id();
            let successor = pair[1].id();

            let group_idx = match groups.iter().position(|g| g.successor == successor) {
                Some(idx) => idx,
                None => {
                    groups.push(SuccessorTally {
                        successor,
                        predecessors: Vec::new(),
                    });
                    groups.len() - 1
                }
            };

            let predecessors = &mut groups[group_idx].predecessors;
            match predecessors.iter_mut().find(|(id, _)| *id == predecessor) {
                Some((_, count)) => *count += 1,
                None => predecessors.push((predecessor, 1)),
            }
        }

        groups
    }

    /// Pick the most frequent pair across all groups
    ///
    /// On equal counts the pair seen first wins (strict comparison while
    /// scanning in first-seen order). Returns `None` if the best count does
    /// not reach the minimum number of occurrences.
    pub fn analyze(&self, traffic: &[CanFrame]) -> Option<Pattern> {
        let mut best: Option<Pattern> = None;
        let mut max_count = 0u32;

        for group in Self::tally(traffic) {
            for (precedent_id, count) in group.predecessors {
                if count > max_count {
                    max_count = count;
                    best = Some(Pattern {
                        precedent_id,
                        periodic_id: group.successor,
                    });
                }
            }
        }

        best.filter(|_| max_count >= self.min_occurrences)
    }
}

impl Default for PatternAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}
