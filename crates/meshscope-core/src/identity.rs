//! Self-identity resolution.
//!
//! A node's own identifier has to be inferred from its log. Nodes announce
//! themselves with a variety of phrasings and none of them is authoritative,
//! so resolution walks an ordered list of independent phrase matchers and the
//! first matcher that matches anywhere in the text wins. Explicit
//! announcements (`Peer ID: ...`) are ordered ahead of catch-alls
//! (`identity ... <id>`), which would otherwise pick up incidental lines.
//!
//! When no phrase matches, the roster's hint table is consulted: a hinted
//! identifier for this node that appears in the node's own log is accepted.
//!
//! # State machine
//!
//! ```text
//! Unresolved --(first successful resolution)--> Resolved (terminal)
//! ```
//!
//! A binding, once made, is never replaced. Later text matching a different
//! pattern cannot make a node's identity flap.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::pattern::{compile_all, PhraseMatcher};
use crate::peer_id::{mentions, strip_ansi, PeerId};
use crate::roster::{NodeName, Roster};

/// Built-in identity phrases, highest priority first.
///
/// Phrases use `[ \t]` rather than `\s` so a match never spans lines.
pub const DEFAULT_IDENTITY_PHRASES: &[(&str, &str)] = &[
    // Rust daemons
    ("local_peer_id", r"local_peer_id[ \t]*=[ \t]*"),
    ("local_peer_id_label", r"Local Peer ID:[ \t]*"),
    ("swarm_bridge", r"SwarmBridge with peer id:?[ \t]*"),
    ("swarm_initialized", r"(?i:swarm initialized with local peer id):?[ \t]*"),
    ("peer_id_label", r"Peer ID:[ \t]*"),
    // Mobile log tags
    ("swarm_bridge_field", r"(?i:swarmbridge[^\n]*peer[_ ]id)[=:][ \t]*"),
    ("local_peer_field", r"(?i:local[^\n]*peer[^\n]*id)[=:][ \t]*"),
    ("mesh_service_started", r"(?i:meshservice[^\n]*started)[^\n]*?"),
    ("our_peer_id", r"(?i:our peer id)[: \t]+"),
    // Catch-alls
    ("identity_keyword", r"(?i:identity)[^\n]*?"),
    ("relay_agent", r"relay/"),
];

static DEFAULT_MATCHERS: Lazy<Vec<PhraseMatcher>> = Lazy::new(|| {
    compile_all(DEFAULT_IDENTITY_PHRASES.iter().copied()).expect("built-in identity phrases compile")
});

/// How an identity was established.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Evidence {
    /// A self-announcement phrase matched.
    Phrase { matcher: String },
    /// A hinted identifier appeared in the node's own log.
    Hint,
}

/// A resolved identity and the evidence behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedIdentity {
    pub id: PeerId,
    pub evidence: Evidence,
}

/// Resolution state of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityState<'a> {
    /// Not known yet. Retried every cycle.
    Unresolved,
    /// Known for the rest of the run.
    Resolved(&'a ResolvedIdentity),
}

impl IdentityState<'_> {
    pub fn is_resolved(&self) -> bool {
        matches!(self, IdentityState::Resolved(_))
    }
}

/// Ordered phrase matchers plus the hint fallback.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    matchers: Vec<PhraseMatcher>,
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self {
            matchers: DEFAULT_MATCHERS.clone(),
        }
    }
}

impl IdentityResolver {
    /// Resolver over an explicit matcher list, highest priority first.
    pub fn new(matchers: Vec<PhraseMatcher>) -> Self {
        Self { matchers }
    }

    /// Resolver over `(name, phrase)` pairs, highest priority first.
    pub fn from_phrases<'a, I>(phrases: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        Ok(Self::new(compile_all(phrases)?))
    }

    /// Matcher names in priority order.
    pub fn matcher_names(&self) -> Vec<&str> {
        self.matchers.iter().map(PhraseMatcher::name).collect()
    }

    /// Try to resolve `node`'s own identifier from its accumulated `text`.
    ///
    /// `None` means "not yet known", which is an ordinary outcome.
    pub fn resolve(&self, node: &NodeName, text: &str, roster: &Roster) -> Option<ResolvedIdentity> {
        let clean = strip_ansi(text);

        for matcher in &self.matchers {
            if let Some(id) = matcher.first(&clean) {
                return Some(ResolvedIdentity {
                    id,
                    evidence: Evidence::Phrase {
                        matcher: matcher.name().to_string(),
                    },
                });
            }
        }

        roster
            .hinted_ids(node)
            .find(|id| mentions(&clean, id))
            .map(|id| ResolvedIdentity {
                id: id.clone(),
                evidence: Evidence::Hint,
            })
    }
}

/// Write-once mapping from node to its resolved identity.
#[derive(Debug, Clone, Default)]
pub struct IdentityBinding {
    bound: BTreeMap<NodeName, ResolvedIdentity>,
}

impl IdentityBinding {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `node` unless it is already bound. Returns whether the binding was made.
    pub fn bind(&mut self, node: NodeName, identity: ResolvedIdentity) -> bool {
        if self.bound.contains_key(&node) {
            return false;
        }
        self.bound.insert(node, identity);
        true
    }

    pub fn state(&self, node: &NodeName) -> IdentityState<'_> {
        match self.bound.get(node) {
            Some(identity) => IdentityState::Resolved(identity),
            None => IdentityState::Unresolved,
        }
    }

    /// The bound identifier of `node`, if resolved.
    pub fn id_of(&self, node: &NodeName) -> Option<&PeerId> {
        self.bound.get(node).map(|r| &r.id)
    }

    pub fn identity_of(&self, node: &NodeName) -> Option<&ResolvedIdentity> {
        self.bound.get(node)
    }

    pub fn is_resolved(&self, node: &NodeName) -> bool {
        self.bound.contains_key(node)
    }

    /// Number of resolved nodes.
    pub fn resolved_count(&self) -> usize {
        self.bound.len()
    }

    /// Whether `id` is bound to any node.
    pub fn is_bound(&self, id: &PeerId) -> bool {
        self.bound.values().any(|r| &r.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeName, &PeerId)> {
        self.bound.iter().map(|(n, r)| (n, &r.id))
    }
}
