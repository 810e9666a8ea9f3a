//! End-to-end nurturing cycle tests over a scripted transport.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use lead_nurture::config::{
    AutomationConfig, FollowUpSchedule, NurtureConfig, ResponseKeywords, ScoringDeltas,
};
use lead_nurture::engine::Nurturer;
use lead_nurture::error::{CycleError, Error, TransportError};
use lead_nurture::mail::{InboundEmail, MailTransport};
use lead_nurture::store::{JsonFileStore, LeadStatus, LeadStore};
use lead_nurture::templates::TemplateSet;

// ── Scripted transport ──────────────────────────────────────────────

/// One sent message: (to, subject, body).
type SentMail = (String, String, String);

/// In-memory transport the tests script. The inbox is returned on every
/// fetch — the engine's checkpoint is what must prevent re-processing.
#[derive(Default)]
struct ScriptedTransport {
    inbox: Mutex<Vec<InboundEmail>>,
    sent: Mutex<Vec<SentMail>>,
    fail_fetch: Mutex<bool>,
    fail_sends_to: Mutex<HashSet<String>>,
}

impl ScriptedTransport {
    fn deliver(&self, from: &str, body: &str, received_at: DateTime<Utc>) {
        self.inbox.lock().unwrap().push(InboundEmail {
            from_identity: from.to_string(),
            subject: Some("Re: Quick question".to_string()),
            body_text: body.to_string(),
            received_at,
        });
    }

    fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }

    fn set_fail_fetch(&self, fail: bool) {
        *self.fail_fetch.lock().unwrap() = fail;
    }

    fn fail_sends_to(&self, identity: &str) {
        self.fail_sends_to
            .lock()
            .unwrap()
            .insert(identity.to_string());
    }

    fn heal(&self, identity: &str) {
        self.fail_sends_to.lock().unwrap().remove(identity);
    }
}

#[async_trait]
impl MailTransport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch_new(
        &self,
        _since: Option<DateTime<Utc>>,
    ) -> Result<Vec<InboundEmail>, TransportError> {
        if *self.fail_fetch.lock().unwrap() {
            return Err(TransportError::Fetch("scripted fetch failure".into()));
        }
        Ok(self.inbox.lock().unwrap().clone())
    }

    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), TransportError> {
        if self.fail_sends_to.lock().unwrap().contains(to) {
            return Err(TransportError::Send {
                to: to.to_string(),
                reason: "scripted send failure".into(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string(), body.to_string()));
        Ok(())
    }
}

// ── Fixtures ────────────────────────────────────────────────────────

fn config() -> NurtureConfig {
    NurtureConfig {
        follow_up_schedule: FollowUpSchedule {
            offsets_days: vec![3, 7],
            max_follow_ups: 2,
        },
        response_keywords: ResponseKeywords {
            interested: vec!["demo".into()],
            not_interested: vec!["stop".into()],
        },
        lead_scoring: ScoringDeltas {
            response_received: 2,
            interest_detected: 10,
            not_interested_detected: -5,
            follow_up_sent: -1,
        },
        automation: AutomationConfig {
            check_responses_interval_hours: 4,
        },
        templates: TemplateSet::default(),
    }
}

fn day_zero() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap()
}

fn engine(
    store: &Arc<JsonFileStore>,
    transport: &Arc<ScriptedTransport>,
) -> Nurturer {
    let store_dyn: Arc<dyn LeadStore> = store.clone();
    let transport_dyn: Arc<dyn MailTransport> = transport.clone();
    Nurturer::new(config(), store_dyn, transport_dyn).unwrap()
}

/// Commit one contacted lead as the bulk seed would have left it.
async fn seed_contacted(store: &JsonFileStore, identity: &str, at: DateTime<Utc>) {
    let mut book = store.begin().await;
    let lead = book.get_or_create(identity);
    lead.first_contacted_at = Some(at);
    lead.last_contacted_at = Some(at);
    lead.advance_to(LeadStatus::Contacted, at, "initial outreach");
    store.commit(book).await.unwrap();
}

// ── Follow-up scheduling ────────────────────────────────────────────

#[tokio::test]
async fn due_follow_up_fires_exactly_once() {
    let store = Arc::new(JsonFileStore::in_memory());
    let transport = Arc::new(ScriptedTransport::default());
    let nurturer = engine(&store, &transport);

    let t0 = day_zero();
    seed_contacted(&store, "a@x.com", t0).await;

    let summary = nurturer.run_cycle_at(t0 + Duration::days(3)).await.unwrap();
    assert_eq!(summary.follow_ups_sent, 1);
    assert!(summary.errors.is_empty());

    let lead = store.get("a@x.com").await.unwrap();
    assert_eq!(lead.follow_ups_sent, 1);
    assert_eq!(lead.last_contacted_at, Some(t0 + Duration::days(3)));
    assert_eq!(transport.sent().len(), 1);
}

#[tokio::test]
async fn rerun_at_same_elapsed_time_is_idempotent() {
    let store = Arc::new(JsonFileStore::in_memory());
    let transport = Arc::new(ScriptedTransport::default());
    let nurturer = engine(&store, &transport);

    let t0 = day_zero();
    seed_contacted(&store, "a@x.com", t0).await;

    let at = t0 + Duration::days(3);
    nurturer.run_cycle_at(at).await.unwrap();
    let summary = nurturer.run_cycle_at(at).await.unwrap();

    assert_eq!(summary.follow_ups_sent, 0);
    assert_eq!(transport.sent().len(), 1);
    assert_eq!(store.get("a@x.com").await.unwrap().follow_ups_sent, 1);
}

#[tokio::test]
async fn long_gap_fires_only_the_next_offset() {
    let store = Arc::new(JsonFileStore::in_memory());
    let transport = Arc::new(ScriptedTransport::default());
    let nurturer = engine(&store, &transport);

    let t0 = day_zero();
    seed_contacted(&store, "a@x.com", t0).await;

    // Ten days with no intervening cycle: both offsets crossed, one send.
    let summary = nurturer
        .run_cycle_at(t0 + Duration::days(10))
        .await
        .unwrap();
    assert_eq!(summary.follow_ups_sent, 1);
    assert_eq!(store.get("a@x.com").await.unwrap().follow_ups_sent, 1);
}

#[tokio::test]
async fn exhausted_sequence_marks_not_interested_without_sending() {
    let store = Arc::new(JsonFileStore::in_memory());
    let transport = Arc::new(ScriptedTransport::default());
    let nurturer = engine(&store, &transport);

    let t0 = day_zero();
    {
        let mut book = store.begin().await;
        let lead = book.get_or_create("a@x.com");
        lead.first_contacted_at = Some(t0 - Duration::days(20));
        lead.last_contacted_at = Some(t0);
        lead.follow_ups_sent = 2;
        lead.advance_to(LeadStatus::Contacted, t0, "initial outreach");
        store.commit(book).await.unwrap();
    }

    let summary = nurturer.run_cycle_at(t0 + Duration::days(8)).await.unwrap();
    assert_eq!(summary.follow_ups_sent, 0);
    assert_eq!(summary.leads_advanced, 1);
    assert!(transport.sent().is_empty());

    let lead = store.get("a@x.com").await.unwrap();
    assert_eq!(lead.status, LeadStatus::NotInterested);
}

// ── Reply classification flows ──────────────────────────────────────

#[tokio::test]
async fn interested_reply_terminates_sequence_and_sends_response() {
    let store = Arc::new(JsonFileStore::in_memory());
    let transport = Arc::new(ScriptedTransport::default());
    let nurturer = engine(&store, &transport);

    let t0 = day_zero();
    seed_contacted(&store, "a@x.com", t0).await;
    transport.deliver("a@x.com", "Sure — can we do a demo?", t0 + Duration::days(1));

    let summary = nurturer.run_cycle_at(t0 + Duration::days(1)).await.unwrap();
    assert_eq!(summary.replies_processed, 1);
    assert_eq!(summary.interest_replies_sent, 1);

    let lead = store.get("a@x.com").await.unwrap();
    assert_eq!(lead.status, LeadStatus::Interested);
    // response_received (+2) then interest_detected (+10), in that order.
    assert_eq!(lead.score, 12);
    assert_eq!(store.checkpoint().await, Some(t0 + Duration::days(1)));

    // Terminal: no follow-up ever fires again.
    let later = nurturer.run_cycle_at(t0 + Duration::days(30)).await.unwrap();
    assert_eq!(later.follow_ups_sent, 0);
    assert_eq!(transport.sent().len(), 1);
}

#[tokio::test]
async fn opt_out_wins_over_interest_phrase() {
    let store = Arc::new(JsonFileStore::in_memory());
    let transport = Arc::new(ScriptedTransport::default());
    let nurturer = engine(&store, &transport);

    let t0 = day_zero();
    seed_contacted(&store, "a@x.com", t0).await;
    transport.deliver(
        "a@x.com",
        "A demo sounds nice but please stop emailing me",
        t0 + Duration::days(1),
    );

    let summary = nurturer.run_cycle_at(t0 + Duration::days(1)).await.unwrap();
    assert_eq!(summary.interest_replies_sent, 0);
    assert!(transport.sent().is_empty());

    let lead = store.get("a@x.com").await.unwrap();
    assert_eq!(lead.status, LeadStatus::NotInterested);
    assert_eq!(lead.score, -3); // +2 response, -5 opt-out
}

#[tokio::test]
async fn neutral_reply_keeps_lead_in_sequence() {
    let store = Arc::new(JsonFileStore::in_memory());
    let transport = Arc::new(ScriptedTransport::default());
    let nurturer = engine(&store, &transport);

    let t0 = day_zero();
    seed_contacted(&store, "a@x.com", t0).await;
    transport.deliver("a@x.com", "Let me think about it.", t0 + Duration::days(1));

    nurturer.run_cycle_at(t0 + Duration::days(1)).await.unwrap();
    let lead = store.get("a@x.com").await.unwrap();
    assert_eq!(lead.status, LeadStatus::Responded);
    assert_eq!(lead.score, 2);

    // Still nurtured: the day-3 offset fires on a later cycle.
    let summary = nurturer.run_cycle_at(t0 + Duration::days(3)).await.unwrap();
    assert_eq!(summary.follow_ups_sent, 1);
    assert_eq!(store.get("a@x.com").await.unwrap().follow_ups_sent, 1);
}

#[tokio::test]
async fn unknown_sender_is_never_dropped() {
    let store = Arc::new(JsonFileStore::in_memory());
    let transport = Arc::new(ScriptedTransport::default());
    let nurturer = engine(&store, &transport);

    let t0 = day_zero();
    transport.deliver("Stranger@Elsewhere.com", "Who is this?", t0);

    let summary = nurturer.run_cycle_at(t0).await.unwrap();
    assert_eq!(summary.replies_processed, 1);

    let lead = store.get("stranger@elsewhere.com").await.unwrap();
    assert_eq!(lead.status, LeadStatus::Responded);
    assert_eq!(lead.last_response_at, Some(t0));
}

#[tokio::test]
async fn checkpoint_prevents_reprocessing_redelivered_mail() {
    let store = Arc::new(JsonFileStore::in_memory());
    let transport = Arc::new(ScriptedTransport::default());
    let nurturer = engine(&store, &transport);

    let t0 = day_zero();
    seed_contacted(&store, "a@x.com", t0).await;
    transport.deliver("a@x.com", "Let me think about it.", t0 + Duration::hours(4));

    let first = nurturer.run_cycle_at(t0 + Duration::hours(5)).await.unwrap();
    assert_eq!(first.replies_processed, 1);

    // The scripted inbox re-delivers the same message every fetch.
    let second = nurturer.run_cycle_at(t0 + Duration::hours(6)).await.unwrap();
    assert_eq!(second.replies_processed, 0);
    assert_eq!(store.get("a@x.com").await.unwrap().score, 2);
}

// ── Failure handling ────────────────────────────────────────────────

#[tokio::test]
async fn fetch_failure_leaves_store_bytes_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("leads.json");
    let store = Arc::new(JsonFileStore::open(&path).await.unwrap());
    let transport = Arc::new(ScriptedTransport::default());
    let nurturer = engine(&store, &transport);

    let t0 = day_zero();
    seed_contacted(&store, "a@x.com", t0).await;
    let before = std::fs::read(&path).unwrap();

    transport.set_fail_fetch(true);
    let err = nurturer.run_cycle_at(t0 + Duration::days(3)).await;
    assert!(matches!(err, Err(Error::Transport(_))));

    let after = std::fs::read(&path).unwrap();
    assert_eq!(before, after);
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn send_failure_blocks_only_that_lead() {
    let store = Arc::new(JsonFileStore::in_memory());
    let transport = Arc::new(ScriptedTransport::default());
    let nurturer = engine(&store, &transport);

    let t0 = day_zero();
    seed_contacted(&store, "broken@x.com", t0).await;
    seed_contacted(&store, "fine@x.com", t0).await;
    transport.fail_sends_to("broken@x.com");

    let summary = nurturer.run_cycle_at(t0 + Duration::days(3)).await.unwrap();
    assert_eq!(summary.follow_ups_sent, 1);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].identity, "broken@x.com");

    // The failed lead's state did not advance — it stays due.
    assert_eq!(store.get("broken@x.com").await.unwrap().follow_ups_sent, 0);
    assert_eq!(store.get("fine@x.com").await.unwrap().follow_ups_sent, 1);

    // Next cycle retries and succeeds.
    transport.heal("broken@x.com");
    let retry = nurturer.run_cycle_at(t0 + Duration::days(3)).await.unwrap();
    assert_eq!(retry.follow_ups_sent, 1);
    assert_eq!(store.get("broken@x.com").await.unwrap().follow_ups_sent, 1);
}

/// Transport whose fetch blocks until released — for single-flight tests.
struct GatedTransport {
    entered: Mutex<Option<tokio::sync::oneshot::Sender<()>>>,
    gate: tokio::sync::Semaphore,
}

#[async_trait]
impl MailTransport for GatedTransport {
    fn name(&self) -> &str {
        "gated"
    }

    async fn fetch_new(
        &self,
        _since: Option<DateTime<Utc>>,
    ) -> Result<Vec<InboundEmail>, TransportError> {
        if let Some(tx) = self.entered.lock().unwrap().take() {
            let _ = tx.send(());
        }
        let _permit = self.gate.acquire().await.map_err(|e| {
            TransportError::Fetch(format!("gate closed: {e}"))
        })?;
        Ok(Vec::new())
    }

    async fn send(&self, _to: &str, _subject: &str, _body: &str) -> Result<(), TransportError> {
        Ok(())
    }
}

#[tokio::test]
async fn overlapping_cycles_are_rejected() {
    let (tx, rx) = tokio::sync::oneshot::channel();
    let transport = Arc::new(GatedTransport {
        entered: Mutex::new(Some(tx)),
        gate: tokio::sync::Semaphore::new(0),
    });

    let store: Arc<dyn LeadStore> = Arc::new(JsonFileStore::in_memory());
    let transport_dyn: Arc<dyn MailTransport> = transport.clone();
    let nurturer = Arc::new(Nurturer::new(config(), store, transport_dyn).unwrap());

    let t = day_zero();
    let running = nurturer.clone();
    let handle = tokio::spawn(async move { running.run_cycle_at(t).await });

    // Wait until the first cycle is inside its fetch, then trigger again.
    rx.await.unwrap();
    let second = nurturer.run_cycle_at(t).await;
    assert!(matches!(
        second,
        Err(Error::Cycle(CycleError::CycleInProgress))
    ));

    // Release the first cycle; it completes normally.
    transport.gate.add_permits(1);
    handle.await.unwrap().unwrap();
}

// ── The worked example from the requirements ────────────────────────

#[tokio::test]
async fn end_to_end_nurture_scenario() {
    let store = Arc::new(JsonFileStore::in_memory());
    let transport = Arc::new(ScriptedTransport::default());
    let nurturer = engine(&store, &transport);

    // Day 0: contacted, score 0.
    let t0 = day_zero();
    seed_contacted(&store, "a@x.com", t0).await;
    assert_eq!(store.get("a@x.com").await.unwrap().score, 0);

    // Day 4 cycle, no reply: follow-up 1 goes out.
    let day4 = nurturer.run_cycle_at(t0 + Duration::days(4)).await.unwrap();
    assert_eq!(day4.follow_ups_sent, 1);
    assert_eq!(store.get("a@x.com").await.unwrap().follow_ups_sent, 1);

    // Day 8 cycle, inbound "can we do a demo?": interested, reply sent.
    transport.deliver("a@x.com", "can we do a demo?", t0 + Duration::days(8));
    let day8 = nurturer.run_cycle_at(t0 + Duration::days(8)).await.unwrap();
    assert_eq!(day8.replies_processed, 1);
    assert_eq!(day8.interest_replies_sent, 1);
    assert_eq!(day8.follow_ups_sent, 0);

    let lead = store.get("a@x.com").await.unwrap();
    assert_eq!(lead.status, LeadStatus::Interested);

    // No further automated sends, ever.
    let sent_so_far = transport.sent().len();
    nurturer.run_cycle_at(t0 + Duration::days(60)).await.unwrap();
    assert_eq!(transport.sent().len(), sent_so_far);
}

// ── Status graph ────────────────────────────────────────────────────

#[tokio::test]
async fn status_never_moves_backwards() {
    let store = Arc::new(JsonFileStore::in_memory());
    let transport = Arc::new(ScriptedTransport::default());
    let nurturer = engine(&store, &transport);

    let t0 = day_zero();
    seed_contacted(&store, "a@x.com", t0).await;
    transport.deliver("a@x.com", "please stop", t0 + Duration::days(1));
    nurturer.run_cycle_at(t0 + Duration::days(1)).await.unwrap();
    assert_eq!(
        store.get("a@x.com").await.unwrap().status,
        LeadStatus::NotInterested
    );

    // A later enthusiastic reply cannot reopen a terminal record.
    transport.deliver("a@x.com", "actually, demo please!", t0 + Duration::days(2));
    nurturer.run_cycle_at(t0 + Duration::days(2)).await.unwrap();

    let lead = store.get("a@x.com").await.unwrap();
    assert_eq!(lead.status, LeadStatus::NotInterested);
    assert!(transport.sent().is_empty());
}
