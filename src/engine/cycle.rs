//! Nurturing cycle orchestrator.
//!
//! One cycle is one atomic logical pass: fetch inbound since the
//! checkpoint, classify, apply to the store, evaluate time-based
//! follow-ups, then commit store and checkpoint as one unit. A fetch
//! failure aborts before any mutation; a per-lead send failure is recorded
//! in the summary and leaves that lead due for retry.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::NurtureConfig;
use crate::engine::classify::{ReplySignal, ResponseClassifier};
use crate::engine::report::NurtureReport;
use crate::engine::schedule::{FollowUpDecision, FollowUpScheduler};
use crate::engine::scoring::{ScoreEvent, ScoringEngine};
use crate::error::{ConfigError, CycleError, Error};
use crate::mail::MailTransport;
use crate::store::{EventKind, LeadRecord, LeadStatus, LeadStore, normalize_identity};

/// A send that failed for one lead. Never fatal to the cycle.
#[derive(Debug, Clone, Serialize)]
pub struct SendFailure {
    pub identity: String,
    pub reason: String,
}

/// What one cycle did.
#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub started_at: DateTime<Utc>,
    pub replies_processed: usize,
    pub leads_advanced: usize,
    pub follow_ups_sent: usize,
    pub interest_replies_sent: usize,
    pub errors: Vec<SendFailure>,
}

impl CycleSummary {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            replies_processed: 0,
            leads_advanced: 0,
            follow_ups_sent: 0,
            interest_replies_sent: 0,
            errors: Vec::new(),
        }
    }
}

impl std::fmt::Display for CycleSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} replies processed, {} leads advanced, {} follow-ups sent, {} interest replies, {} errors",
            self.replies_processed,
            self.leads_advanced,
            self.follow_ups_sent,
            self.interest_replies_sent,
            self.errors.len()
        )?;
        for err in &self.errors {
            write!(f, "\n  {}: {}", err.identity, err.reason)?;
        }
        Ok(())
    }
}

/// The lead nurturing engine.
pub struct Nurturer {
    config: NurtureConfig,
    classifier: ResponseClassifier,
    scoring: ScoringEngine,
    scheduler: FollowUpScheduler,
    store: Arc<dyn LeadStore>,
    transport: Arc<dyn MailTransport>,
    /// Single-flight guard — overlapping cycle triggers are rejected.
    cycle_guard: Mutex<()>,
}

impl Nurturer {
    /// Build an engine from validated configuration. Invalid config fails
    /// here, before any cycle can run.
    pub fn new(
        config: NurtureConfig,
        store: Arc<dyn LeadStore>,
        transport: Arc<dyn MailTransport>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            classifier: ResponseClassifier::new(&config.response_keywords),
            scoring: ScoringEngine::new(config.lead_scoring),
            scheduler: FollowUpScheduler::new(config.follow_up_schedule.clone()),
            config,
            store,
            transport,
            cycle_guard: Mutex::new(()),
        })
    }

    /// Run one nurturing cycle now.
    pub async fn run_cycle(&self) -> Result<CycleSummary, Error> {
        self.run_cycle_at(Utc::now()).await
    }

    /// Run one nurturing cycle with an explicit clock (tests drive this).
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> Result<CycleSummary, Error> {
        let _guard = self
            .cycle_guard
            .try_lock()
            .map_err(|_| CycleError::CycleInProgress)?;

        let mut book = self.store.begin().await;
        let since = book.checkpoint;

        // Fetch failures abort the whole cycle before any mutation — better
        // to run again than to process a partial inbox view.
        let mut inbound = self.transport.fetch_new(since).await?;

        let mut summary = CycleSummary::new(now);

        // Stage 1: inbound replies, oldest first.
        inbound.sort_by_key(|m| m.received_at);
        for msg in inbound {
            if since.is_some_and(|cp| msg.received_at <= cp) {
                continue;
            }
            let identity = normalize_identity(&msg.from_identity);
            let signal = self.classifier.classify(&msg.body_text);
            info!(identity = %identity, signal = signal.label(), "Inbound reply");
            summary.replies_processed += 1;

            let detail = format!(
                "reply: {}",
                msg.subject.as_deref().unwrap_or("(no subject)")
            );

            let interest_reply = {
                let lead = book.get_or_create(&identity);
                lead.last_response_at = Some(msg.received_at);
                lead.record(EventKind::ResponseReceived, detail, msg.received_at);

                if lead.is_terminal() {
                    // Terminal leads keep their audit trail but see no
                    // further automated action.
                    None
                } else {
                    lead.score = self.scoring.apply(lead.score, ScoreEvent::ResponseReceived);
                    if lead.advance_to(LeadStatus::Responded, now, "reply received") {
                        summary.leads_advanced += 1;
                    }

                    match signal {
                        ReplySignal::NotInterested => {
                            lead.score = self
                                .scoring
                                .apply(lead.score, ScoreEvent::NotInterestedDetected);
                            if lead.advance_to(
                                LeadStatus::NotInterested,
                                now,
                                "opt-out phrase matched",
                            ) {
                                summary.leads_advanced += 1;
                            }
                            None
                        }
                        ReplySignal::Interested => {
                            lead.score =
                                self.scoring.apply(lead.score, ScoreEvent::InterestDetected);
                            if lead.advance_to(
                                LeadStatus::Interested,
                                now,
                                "interest phrase matched",
                            ) {
                                summary.leads_advanced += 1;
                            }
                            Some(lead.attributes.clone())
                        }
                        ReplySignal::Neutral => None,
                    }
                }
            };

            if let Some(attributes) = interest_reply {
                let (subject, body) = self.config.templates.interested.render(&attributes);
                match self.transport.send(&identity, &subject, &body).await {
                    Ok(()) => {
                        if let Some(lead) = book.get_mut(&identity) {
                            lead.record(
                                EventKind::InterestReplySent,
                                "interest response sent",
                                now,
                            );
                        }
                        summary.interest_replies_sent += 1;
                    }
                    Err(e) => {
                        warn!(identity = %identity, error = %e, "Interest reply failed");
                        summary.errors.push(SendFailure {
                            identity: identity.clone(),
                            reason: e.to_string(),
                        });
                    }
                }
            }

            if book.checkpoint.is_none_or(|cp| msg.received_at > cp) {
                book.checkpoint = Some(msg.received_at);
            }
        }

        // Stage 2: time-based follow-ups for every non-terminal lead.
        let decisions: Vec<(String, FollowUpDecision)> = book
            .iter()
            .map(|lead| (lead.identity.clone(), self.scheduler.evaluate(lead, now)))
            .filter(|(_, decision)| *decision != FollowUpDecision::Wait)
            .collect();

        for (identity, decision) in decisions {
            match decision {
                FollowUpDecision::Exhausted => {
                    let Some(lead) = book.get_mut(&identity) else {
                        continue;
                    };
                    if lead.advance_to(
                        LeadStatus::NotInterested,
                        now,
                        "follow-up sequence exhausted",
                    ) {
                        summary.leads_advanced += 1;
                    }
                }
                FollowUpDecision::Send { index } => {
                    let Some(attributes) = book.get(&identity).map(|l| l.attributes.clone())
                    else {
                        continue;
                    };
                    let template = &self.config.templates.follow_ups[index as usize];
                    let (subject, body) = template.render(&attributes);

                    match self.transport.send(&identity, &subject, &body).await {
                        Ok(()) => {
                            let Some(lead) = book.get_mut(&identity) else {
                                continue;
                            };
                            lead.follow_ups_sent += 1;
                            lead.last_contacted_at = Some(now);
                            lead.score =
                                self.scoring.apply(lead.score, ScoreEvent::FollowUpSent);
                            lead.record(
                                EventKind::FollowUpSent,
                                format!("follow-up {} sent", index + 1),
                                now,
                            );
                            summary.follow_ups_sent += 1;
                        }
                        Err(e) => {
                            // Lead state untouched — it stays due next cycle.
                            warn!(identity = %identity, error = %e, "Follow-up send failed");
                            summary.errors.push(SendFailure {
                                identity,
                                reason: e.to_string(),
                            });
                        }
                    }
                }
                FollowUpDecision::Wait => unreachable!("Wait decisions are filtered out"),
            }
        }

        // Stage 3: persist store and checkpoint as one unit.
        self.store.commit(book).await?;

        info!(%summary, "Cycle complete");
        Ok(summary)
    }

    /// Aggregate counts by status plus score distribution.
    pub async fn report(&self) -> NurtureReport {
        NurtureReport::from_records(
            &self.store.all_records().await,
            self.store.checkpoint().await,
        )
    }

    /// Committed record for one lead.
    pub async fn lead(&self, identity: &str) -> Option<LeadRecord> {
        self.store.get(identity).await
    }

    /// The configured trigger interval — consumed by the watch loop, not
    /// the engine.
    pub fn check_interval_hours(&self) -> u32 {
        self.config.automation.check_responses_interval_hours
    }
}
