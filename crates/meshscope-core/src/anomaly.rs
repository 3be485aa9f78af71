//! Anomaly signals: stray peers, recent error bursts, and event counts.
//!
//! None of these are errors. A stray peer is a mesh member outside the
//! roster, which is a coarse network-health signal. Error counts are exposed
//! as numbers; deciding what counts as "too many" is the caller's business.

use std::collections::BTreeMap;

use regex::Regex;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::identity::IdentityBinding;
use crate::peer_id::{strip_ansi, PeerId};
use crate::roster::{NodeName, Roster};
use crate::visibility::VisibilitySet;

/// Characters of trailing log text inspected for recent errors.
pub const DEFAULT_RECENT_WINDOW: usize = 2000;

pub const DEFAULT_ERROR_PATTERN: &str = r"(?i)(Failed to negotiate|connection error|ERR)";
pub const DEFAULT_CONNECT_PATTERN: &str = r"(?i)(connected|PeerConnected|peer.*connect)";
pub const DEFAULT_SENT_PATTERN: &str = r"(?i)(send|sent|delivering|dispatch)";
pub const DEFAULT_RECEIVED_PATTERN: &str = r"(?i)(receiv|inbound|incoming|message received)";

/// Whole-log event tallies for one node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EventCounts {
    pub connects: usize,
    pub errors: usize,
    pub sent: usize,
    pub received: usize,
}

/// Compiled event patterns.
#[derive(Debug, Clone)]
pub struct EventPatterns {
    connect: Regex,
    error: Regex,
    sent: Regex,
    received: Regex,
}

impl Default for EventPatterns {
    fn default() -> Self {
        // Built-in patterns are constants; a failure here is a programming error.
        EventPatterns::builder()
            .build()
            .expect("built-in event patterns compile")
    }
}

impl EventPatterns {
    pub fn builder() -> EventPatternsBuilder {
        EventPatternsBuilder::default()
    }

    /// Tally events over all of `text`.
    pub fn count(&self, text: &str) -> EventCounts {
        let clean = strip_ansi(text);
        EventCounts {
            connects: self.connect.find_iter(&clean).count(),
            errors: self.error.find_iter(&clean).count(),
            sent: self.sent.find_iter(&clean).count(),
            received: self.received.find_iter(&clean).count(),
        }
    }

    /// Count error matches in the last `window` characters of `text`.
    pub fn recent_errors(&self, text: &str, window: usize) -> usize {
        let tail = strip_ansi(trailing_window(text, window));
        self.error.find_iter(&tail).count()
    }
}

/// Overrides for [`EventPatterns`]. `None` keeps the built-in pattern.
#[derive(Debug, Clone, Default)]
pub struct EventPatternsBuilder {
    connect: Option<String>,
    error: Option<String>,
    sent: Option<String>,
    received: Option<String>,
}

impl EventPatternsBuilder {
    pub fn connect(mut self, pattern: Option<&str>) -> Self {
        self.connect = pattern.map(str::to_string);
        self
    }

    pub fn error(mut self, pattern: Option<&str>) -> Self {
        self.error = pattern.map(str::to_string);
        self
    }

    pub fn sent(mut self, pattern: Option<&str>) -> Self {
        self.sent = pattern.map(str::to_string);
        self
    }

    pub fn received(mut self, pattern: Option<&str>) -> Self {
        self.received = pattern.map(str::to_string);
        self
    }

    pub fn build(self) -> Result<EventPatterns> {
        Ok(EventPatterns {
            connect: compile("connect", self.connect.as_deref().unwrap_or(DEFAULT_CONNECT_PATTERN))?,
            error: compile("error", self.error.as_deref().unwrap_or(DEFAULT_ERROR_PATTERN))?,
            sent: compile("sent", self.sent.as_deref().unwrap_or(DEFAULT_SENT_PATTERN))?,
            received: compile(
                "received",
                self.received.as_deref().unwrap_or(DEFAULT_RECEIVED_PATTERN),
            )?,
        })
    }
}

fn compile(name: &str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| Error::InvalidPattern {
        name: name.to_string(),
        source,
    })
}

/// The last `window` characters of `text` (all of it if shorter).
pub fn trailing_window(text: &str, window: usize) -> &str {
    if window == 0 {
        return "";
    }
    match text.char_indices().rev().nth(window - 1) {
        Some((start, _)) => &text[start..],
        None => text,
    }
}

/// Identifiers `node` has seen that belong to no known node.
///
/// Known means: hinted in the roster, or bound to any node (including `node`
/// itself). Strays never count as missing peers and never affect convergence.
pub fn stray_peers(
    node: &NodeName,
    seen: &VisibilitySet,
    binding: &IdentityBinding,
    roster: &Roster,
) -> Vec<PeerId> {
    let own = binding.id_of(node);
    seen.iter()
        .filter(|id| Some(*id) != own)
        .filter(|id| !roster.is_hinted(id) && !binding.is_bound(id))
        .cloned()
        .collect()
}

/// An identifier that more than one node resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindingConflict {
    pub id: PeerId,
    pub nodes: Vec<NodeName>,
}

/// Identifiers bound to two or more nodes, in identifier order.
pub fn conflicting_bindings(binding: &IdentityBinding) -> Vec<BindingConflict> {
    let mut by_id: BTreeMap<&PeerId, Vec<NodeName>> = BTreeMap::new();
    for (node, id) in binding.iter() {
        by_id.entry(id).or_default().push(node.clone());
    }

    by_id
        .into_iter()
        .filter(|(_, nodes)| nodes.len() > 1)
        .map(|(id, nodes)| BindingConflict {
            id: id.clone(),
            nodes,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{Evidence, ResolvedIdentity};
    use crate::peer_id::fixtures::*;

    fn hint_bound(id: PeerId) -> ResolvedIdentity {
        ResolvedIdentity {
            id,
            evidence: Evidence::Hint,
        }
    }

    #[test]
    fn trailing_window_counts_chars() {
        assert_eq!(trailing_window("abcdef", 3), "def");
        assert_eq!(trailing_window("abc", 10), "abc");
        assert_eq!(trailing_window("abc", 0), "");
        // Multibyte characters are never split.
        assert_eq!(trailing_window("héllo✓", 2), "o✓");
    }

    #[test]
    fn recent_errors_only_look_at_tail() {
        let patterns = EventPatterns::default();
        let old = "ERR old failure\n".repeat(10);
        let recent = "ok\nconnection error: reset\nFailed to negotiate protocol\n";
        let text = format!("{old}{}{recent}", "x".repeat(DEFAULT_RECENT_WINDOW));
        assert_eq!(patterns.recent_errors(&text, DEFAULT_RECENT_WINDOW), 2);
        assert_eq!(patterns.count(&text).errors, 12);
    }

    #[test]
    fn event_counts_use_default_patterns() {
        let text = "PeerConnected a\nsent message\nmessage received\nincoming stream\nERR boom\n";
        let counts = EventPatterns::default().count(text);
        assert_eq!(
            counts,
            EventCounts {
                connects: 1,
                errors: 1,
                sent: 1,
                received: 2,
            }
        );
    }

    #[test]
    fn custom_error_pattern() {
        let patterns = EventPatterns::builder().error(Some("panic")).build().unwrap();
        assert_eq!(patterns.recent_errors("ERR\npanic\npanic\n", 100), 2);
    }

    #[test]
    fn strays_exclude_known_and_own() {
        let roster = Roster::five_node();
        let gcp = NodeName::from("gcp");
        let mut binding = IdentityBinding::new();
        binding.bind(gcp.clone(), hint_bound(id(GCP)));

        let mut seen = VisibilitySet::default();
        seen.merge([id(GCP), id(OSX), id(STRANGER)]);

        assert_eq!(stray_peers(&gcp, &seen, &binding, &roster), vec![id(STRANGER)]);
    }

    #[test]
    fn bound_identifier_outside_hints_is_not_stray() {
        // A roster without hints: the only known ids are the bound ones.
        let roster = Roster::new(Roster::five_node().entries().to_vec(), BTreeMap::new()).unwrap();
        let mut binding = IdentityBinding::new();
        binding.bind("osx".into(), hint_bound(id(STRANGER)));

        let mut seen = VisibilitySet::default();
        seen.merge([id(STRANGER), id(ANDROID)]);

        let strays = stray_peers(&"gcp".into(), &seen, &binding, &roster);
        assert_eq!(strays, vec![id(ANDROID)]);
    }

    #[test]
    fn conflicts_are_reported() {
        let mut binding = IdentityBinding::new();
        binding.bind("gcp".into(), hint_bound(id(GCP)));
        binding.bind("osx".into(), hint_bound(id(GCP)));
        binding.bind("android".into(), hint_bound(id(ANDROID)));

        let conflicts = conflicting_bindings(&binding);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].id, id(GCP));
        assert_eq!(conflicts[0].nodes, vec![NodeName::from("gcp"), NodeName::from("osx")]);
    }
}
