//! Outbound message templates with `{{key}}` placeholder substitution.
//!
//! Placeholders are filled from a lead's attribute map (the columns of the
//! contact list). Unknown keys render as empty strings so a sparse contact
//! row never blocks a send.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A renderable outbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageTemplate {
    pub subject: String,
    pub body: String,
}

impl MessageTemplate {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// Render subject and body against a lead's attributes.
    pub fn render(&self, attributes: &BTreeMap<String, String>) -> (String, String) {
        (
            render_placeholders(&self.subject, attributes),
            render_placeholders(&self.body, attributes),
        )
    }
}

/// The full template set an engine needs: the initial outreach, one
/// follow-up per configured offset, and the reply sent on detected interest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateSet {
    pub initial: MessageTemplate,
    pub follow_ups: Vec<MessageTemplate>,
    pub interested: MessageTemplate,
}

impl Default for TemplateSet {
    fn default() -> Self {
        Self {
            initial: MessageTemplate::new(
                "Quick question for {{company}}",
                "Hi {{first_name}},\n\n\
                 Many teams like {{company}} lose inbound leads because follow-ups \
                 slip through the cracks. We built a system that follows up with \
                 every lead automatically.\n\n\
                 Do you have time for a 10-minute demo call this week?\n",
            ),
            follow_ups: vec![
                MessageTemplate::new(
                    "Following up — {{company}}",
                    "Hi {{first_name}},\n\n\
                     Following up on my earlier message. Quick question: what's your \
                     biggest challenge with lead follow-ups right now?\n",
                ),
                MessageTemplate::new(
                    "Last note from me",
                    "Hi {{first_name}},\n\n\
                     I understand the timing might not be right. If you'd like a \
                     quick 5-minute demo, just reply with \"demo\" and I'll send a \
                     calendar link.\n\n\
                     No pressure — I'll stop following up after this.\n",
                ),
            ],
            interested: MessageTemplate::new(
                "Re: Quick question for {{company}}",
                "Hi {{first_name}},\n\n\
                 Great to hear from you! Here's a calendar link to book a \
                 10-minute demo:\n\n\
                 [Calendar Link]\n\n\
                 Looking forward to it.\n",
            ),
        }
    }
}

/// Replace every `{{key}}` in `text` with the matching attribute value.
///
/// Keys are trimmed, so `{{ first_name }}` and `{{first_name}}` are
/// equivalent. Unclosed braces pass through verbatim.
pub fn render_placeholders(text: &str, attributes: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = after[..end].trim();
                if let Some(value) = attributes.get(key) {
                    out.push_str(value);
                }
                rest = &after[end + 2..];
            }
            None => {
                // Unclosed placeholder — emit as-is.
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
