//! Reply classification — configured phrase lists, checked in priority order.
//!
//! Pure and total: every input yields exactly one signal, never an error.
//! An explicit opt-out always wins over ambiguous enthusiasm ("yes, please
//! stop"), so the not-interested list is checked first.

use crate::config::ResponseKeywords;

/// Interest signal extracted from one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySignal {
    Interested,
    NotInterested,
    Neutral,
}

impl ReplySignal {
    /// Short label for logging.
    pub fn label(self) -> &'static str {
        match self {
            Self::Interested => "interested",
            Self::NotInterested => "not_interested",
            Self::Neutral => "neutral",
        }
    }
}

/// Keyword-driven reply classifier. Phrases are normalized once at
/// construction; matching is case-insensitive substring over normalized
/// text.
#[derive(Debug, Clone)]
pub struct ResponseClassifier {
    interested: Vec<String>,
    not_interested: Vec<String>,
}

impl ResponseClassifier {
    pub fn new(keywords: &ResponseKeywords) -> Self {
        let prepare = |phrases: &[String]| {
            phrases
                .iter()
                .map(|p| normalize(p))
                .filter(|p| !p.is_empty())
                .collect()
        };
        Self {
            interested: prepare(&keywords.interested),
            not_interested: prepare(&keywords.not_interested),
        }
    }

    /// Classify one message body.
    pub fn classify(&self, body: &str) -> ReplySignal {
        let text = normalize(body);
        if text.is_empty() {
            return ReplySignal::Neutral;
        }
        if self.not_interested.iter().any(|p| text.contains(p.as_str())) {
            return ReplySignal::NotInterested;
        }
        if self.interested.iter().any(|p| text.contains(p.as_str())) {
            return ReplySignal::Interested;
        }
        ReplySignal::Neutral
    }
}

/// Lower-case and collapse all whitespace runs to single spaces.
fn normalize(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
