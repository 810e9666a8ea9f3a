//! Engagement scoring — configured per-event deltas, applied cumulatively.

use crate::config::ScoringDeltas;

/// A scoreable event in a lead's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreEvent {
    ResponseReceived,
    InterestDetected,
    NotInterestedDetected,
    FollowUpSent,
}

/// Pure transform `score' = score + delta(event)`. The delta table is
/// operator configuration supplied at construction.
#[derive(Debug, Clone, Copy)]
pub struct ScoringEngine {
    deltas: ScoringDeltas,
}

impl ScoringEngine {
    pub fn new(deltas: ScoringDeltas) -> Self {
        Self { deltas }
    }

    pub fn delta(&self, event: ScoreEvent) -> i64 {
        match event {
            ScoreEvent::ResponseReceived => self.deltas.response_received,
            ScoreEvent::InterestDetected => self.deltas.interest_detected,
            ScoreEvent::NotInterestedDetected => self.deltas.not_interested_detected,
            ScoreEvent::FollowUpSent => self.deltas.follow_up_sent,
        }
    }

    pub fn apply(&self, score: i64, event: ScoreEvent) -> i64 {
        score + self.delta(event)
    }
}
