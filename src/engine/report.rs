//! Aggregate reporting over the persisted lead store.
//!
//! `NurtureReport` is the data behind the dashboard: counts by status,
//! response rates, score distribution, top leads and recent activity.
//! `Display` renders the human-readable version the control layer prints.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::store::{LeadRecord, LeadStatus};

const TOP_LEAD_COUNT: usize = 5;
const RECENT_ACTIVITY_COUNT: usize = 5;

/// Min/avg/max over all lead scores.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ScoreStats {
    pub min: i64,
    pub max: i64,
    pub avg: f64,
}

/// One row of the top-leads table.
#[derive(Debug, Clone, Serialize)]
pub struct TopLead {
    pub identity: String,
    pub score: i64,
    pub status: LeadStatus,
}

/// One row of the recent-activity table.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityLine {
    pub identity: String,
    pub status: LeadStatus,
    pub last_activity: DateTime<Utc>,
}

/// Aggregate snapshot of the nurturing funnel.
#[derive(Debug, Clone, Serialize)]
pub struct NurtureReport {
    pub total_leads: usize,
    pub status_counts: Vec<(LeadStatus, usize)>,
    pub responded: usize,
    pub response_rate: Option<f64>,
    pub interest_rate: Option<f64>,
    pub score: Option<ScoreStats>,
    pub top_leads: Vec<TopLead>,
    pub recent_activity: Vec<ActivityLine>,
    pub checkpoint: Option<DateTime<Utc>>,
}

impl NurtureReport {
    pub fn from_records(records: &[LeadRecord], checkpoint: Option<DateTime<Utc>>) -> Self {
        let statuses = [
            LeadStatus::New,
            LeadStatus::Contacted,
            LeadStatus::Responded,
            LeadStatus::Interested,
            LeadStatus::NotInterested,
        ];
        let status_counts: Vec<(LeadStatus, usize)> = statuses
            .iter()
            .map(|&s| (s, records.iter().filter(|l| l.status == s).count()))
            .collect();

        let contacted = records
            .iter()
            .filter(|l| l.status != LeadStatus::New)
            .count();
        let responded = records.iter().filter(|l| l.last_response_at.is_some()).count();
        let interested = records
            .iter()
            .filter(|l| l.status == LeadStatus::Interested)
            .count();

        let rate = |num: usize, den: usize| {
            (den > 0).then(|| num as f64 / den as f64 * 100.0)
        };

        let score = (!records.is_empty()).then(|| {
            let scores: Vec<i64> = records.iter().map(|l| l.score).collect();
            ScoreStats {
                min: *scores.iter().min().unwrap(),
                max: *scores.iter().max().unwrap(),
                avg: scores.iter().sum::<i64>() as f64 / scores.len() as f64,
            }
        });

        let mut by_score: Vec<&LeadRecord> = records.iter().collect();
        by_score.sort_by(|a, b| b.score.cmp(&a.score));
        let top_leads = by_score
            .iter()
            .take(TOP_LEAD_COUNT)
            .map(|l| TopLead {
                identity: l.identity.clone(),
                score: l.score,
                status: l.status,
            })
            .collect();

        let mut activity: Vec<ActivityLine> = records
            .iter()
            .filter_map(|l| {
                let last = match (l.last_contacted_at, l.last_response_at) {
                    (Some(c), Some(r)) => Some(c.max(r)),
                    (Some(c), None) => Some(c),
                    (None, Some(r)) => Some(r),
                    (None, None) => None,
                };
                last.map(|at| ActivityLine {
                    identity: l.identity.clone(),
                    status: l.status,
                    last_activity: at,
                })
            })
            .collect();
        activity.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        activity.truncate(RECENT_ACTIVITY_COUNT);

        Self {
            total_leads: records.len(),
            status_counts,
            responded,
            response_rate: rate(responded, contacted),
            interest_rate: rate(interested, responded),
            score,
            top_leads,
            recent_activity: activity,
            checkpoint,
        }
    }
}

impl std::fmt::Display for NurtureReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "LEAD NURTURING REPORT")?;
        writeln!(f, "{}", "=".repeat(50))?;
        writeln!(f, "Total leads: {}", self.total_leads)?;

        writeln!(f, "\nStatus breakdown:")?;
        for (status, count) in &self.status_counts {
            let pct = if self.total_leads > 0 {
                *count as f64 / self.total_leads as f64 * 100.0
            } else {
                0.0
            };
            writeln!(f, "  {:<15} {:>4} ({:.1}%)", status.label(), count, pct)?;
        }

        writeln!(f, "\nLeads who responded: {}", self.responded)?;
        match self.response_rate {
            Some(rate) => writeln!(f, "Response rate: {rate:.1}%")?,
            None => writeln!(f, "Response rate: n/a")?,
        }
        match self.interest_rate {
            Some(rate) => writeln!(f, "Interest rate: {rate:.1}%")?,
            None => writeln!(f, "Interest rate: n/a")?,
        }

        if let Some(score) = self.score {
            writeln!(
                f,
                "\nScores: min {} / avg {:.1} / max {}",
                score.min, score.avg, score.max
            )?;
        }

        if !self.top_leads.is_empty() {
            writeln!(f, "\nTop leads by score:")?;
            for (i, lead) in self.top_leads.iter().enumerate() {
                writeln!(
                    f,
                    "  {:>2}. {} — score {} ({})",
                    i + 1,
                    lead.identity,
                    lead.score,
                    lead.status.label()
                )?;
            }
        }

        if !self.recent_activity.is_empty() {
            writeln!(f, "\nRecent activity:")?;
            for line in &self.recent_activity {
                writeln!(
                    f,
                    "  {} — {} ({})",
                    line.last_activity.format("%Y-%m-%d %H:%M"),
                    line.identity,
                    line.status.label()
                )?;
            }
        }

        if let Some(checkpoint) = self.checkpoint {
            writeln!(f, "\nInbound checkpoint: {}", checkpoint.to_rfc3339())?;
        }
        Ok(())
    }
}
