//! The nurturing engine: classification, scoring, scheduling, and the
//! cycle orchestrator that composes them with the mail transport.

pub mod classify;
pub mod cycle;
pub mod report;
pub mod schedule;
pub mod scoring;

pub use classify::{ReplySignal, ResponseClassifier};
pub use cycle::{CycleSummary, Nurturer, SendFailure};
pub use report::NurtureReport;
pub use schedule::{FollowUpDecision, FollowUpScheduler};
pub use scoring::{ScoreEvent, ScoringEngine};
