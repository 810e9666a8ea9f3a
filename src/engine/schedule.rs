//! Time-based follow-up decisions.
//!
//! Offsets are whole days measured from the last outbound contact.
//! Follow-ups fire strictly in index order, at most one per lead per
//! cycle, so a late-running cycle that crossed several offsets sends one
//! message now and the next on the following cycle instead of bursting.

use chrono::{DateTime, Utc};

use crate::config::FollowUpSchedule;
use crate::store::LeadRecord;

/// What the scheduler wants done for one lead this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUpDecision {
    /// Nothing is due.
    Wait,
    /// Send follow-up `index` (0-based into the configured offsets).
    Send { index: u32 },
    /// Sequence exhausted with no response — mark not interested.
    Exhausted,
}

/// Pure decision function over (lead record, current time, schedule).
#[derive(Debug, Clone)]
pub struct FollowUpScheduler {
    schedule: FollowUpSchedule,
}

impl FollowUpScheduler {
    pub fn new(schedule: FollowUpSchedule) -> Self {
        Self { schedule }
    }

    /// Evaluate one lead. Terminal leads and leads never contacted are
    /// always `Wait`.
    pub fn evaluate(&self, lead: &LeadRecord, now: DateTime<Utc>) -> FollowUpDecision {
        if lead.is_terminal() {
            return FollowUpDecision::Wait;
        }
        let Some(last_contacted) = lead.last_contacted_at else {
            return FollowUpDecision::Wait;
        };

        let elapsed_days = now.signed_duration_since(last_contacted).num_days();

        if lead.follow_ups_sent >= self.schedule.max_follow_ups {
            if elapsed_days > i64::from(self.schedule.last_offset_days()) {
                return FollowUpDecision::Exhausted;
            }
            return FollowUpDecision::Wait;
        }

        // The next due offset is the one at index `follow_ups_sent` — never
        // skipped, never duplicated, even when the cycle runs late.
        let next = self.schedule.offsets_days[lead.follow_ups_sent as usize];
        if elapsed_days >= i64::from(next) {
            return FollowUpDecision::Send {
                index: lead.follow_ups_sent,
            };
        }
        FollowUpDecision::Wait
    }
}
