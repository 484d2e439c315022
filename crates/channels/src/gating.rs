//! Inbound gating: decides whether a network message reaches a sender's
//! aggregator and under which sender id.

use {
    serde::{Deserialize, Serialize},
    switchboard_common::types::InboundMessage,
};

/// Suffix of one-to-one contact addresses.
const CONTACT_SUFFIX: &str = "@c.us";
/// Suffix of group chat addresses.
const GROUP_SUFFIX: &str = "@g.us";
/// Digits kept from a contact address (national number without prefixes).
const NATIONAL_DIGITS: usize = 10;

/// Message kinds that carry no user content and never start a turn.
pub const NOTIFICATION_KINDS: &[&str] = &[
    "e2e_notification",
    "notification_template",
    "gp2",
    "call_log",
    "protocol",
];

/// Contacts that are never answered by default.
pub fn default_ignored_contacts() -> Vec<String> {
    vec!["status@broadcast".into(), "0@c.us".into()]
}

/// Why a message was kept away from the aggregators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateRejection {
    OwnMessage,
    IgnoredContact,
    GroupChat,
    Notification,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Route to the aggregator for this normalized sender id.
    Accept(String),
    Reject(GateRejection),
}

/// Filter applied to every inbound message before aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InboundGate {
    /// Sender ids never answered. Matched case-insensitively against the
    /// normalized id; `*` matches any run of characters.
    pub ignored_contacts: Vec<String>,
    /// Drop messages posted in group chats.
    pub ignore_groups: bool,
}

impl Default for InboundGate {
    fn default() -> Self {
        Self {
            ignored_contacts: default_ignored_contacts(),
            ignore_groups: true,
        }
    }
}

impl InboundGate {
    pub fn check(&self, message: &InboundMessage) -> GateDecision {
        if message.from_me {
            return GateDecision::Reject(GateRejection::OwnMessage);
        }
        let sender_id = normalize_sender_id(&message.sender_id);
        if self.is_ignored(&sender_id) {
            return GateDecision::Reject(GateRejection::IgnoredContact);
        }
        if self.ignore_groups
            && (sender_id.contains(GROUP_SUFFIX) || message.chat_id.ends_with(GROUP_SUFFIX))
        {
            return GateDecision::Reject(GateRejection::GroupChat);
        }
        if NOTIFICATION_KINDS.contains(&message.kind.as_str()) {
            return GateDecision::Reject(GateRejection::Notification);
        }
        GateDecision::Accept(sender_id)
    }

    fn is_ignored(&self, sender_id: &str) -> bool {
        let sender = sender_id.to_lowercase();
        self.ignored_contacts.iter().any(|pattern| {
            let pat = pattern.to_lowercase();
            if pat.contains('*') {
                glob_match(&pat, &sender)
            } else {
                pat == sender
            }
        })
    }
}

/// Reduce a contact address to its national number.
///
/// `5219831844892@c.us` becomes `9831844892`. Anything that is not a contact
/// address ending in at least ten digits is returned unchanged.
pub fn normalize_sender_id(raw: &str) -> String {
    let Some(local) = raw.strip_suffix(CONTACT_SUFFIX) else {
        return raw.to_string();
    };
    if local.len() < NATIONAL_DIGITS {
        return raw.to_string();
    }
    let tail = &local.as_bytes()[local.len() - NATIONAL_DIGITS..];
    if tail.iter().all(u8::is_ascii_digit) {
        local[local.len() - NATIONAL_DIGITS..].to_string()
    } else {
        raw.to_string()
    }
}

/// Glob matching where `*` stands for any sequence of characters.
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let last = parts.len() - 1;
    let mut rest = text;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == last {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(idx) => rest = &rest[idx + part.len()..],
                None => return false,
            }
        }
    }
    true
}
