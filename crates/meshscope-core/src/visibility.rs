//! Per-node peer visibility.
//!
//! A node "sees" a peer once the peer's identifier has appeared anywhere in
//! the node's log. Visibility only grows: a peer once seen stays seen for the
//! rest of the run.
//!
//! The tracker is fed the node's full accumulated text each cycle but only
//! scans what was appended since the previous cycle. The scan restarts at the
//! beginning of the last incomplete line, so an identifier (or an escape
//! sequence) that was half-written at the previous read is picked up whole.

use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;
use serde::Serialize;

use crate::pattern::{compile_all, PhraseMatcher};
use crate::peer_id::{extract_stripped, strip_ansi, PeerId};
use crate::roster::NodeName;

/// Phrases that report an established connection to a peer.
pub const CONNECTION_PHRASES: &[(&str, &str)] = &[
    ("established_connection", r"(?i:established connection to)[ \t]*"),
    ("connected_to_peer", r"(?i:connected to peer:)[ \t]*"),
    ("connection_established_event", r"ConnectionEstablished[^\n]*?(?i:peer_id=)"),
];

static CONNECTION_MATCHERS: Lazy<Vec<PhraseMatcher>> = Lazy::new(|| {
    compile_all(CONNECTION_PHRASES.iter().copied()).expect("built-in connection phrases compile")
});

/// Identifiers one node has mentioned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VisibilitySet {
    seen: BTreeSet<PeerId>,
    /// Subset of `seen` that appeared in explicit connection evidence.
    connected: BTreeSet<PeerId>,
}

impl VisibilitySet {
    pub fn contains(&self, id: &PeerId) -> bool {
        self.seen.contains(id)
    }

    /// Whether the node logged an established connection to `id`.
    pub fn is_connected(&self, id: &PeerId) -> bool {
        self.connected.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerId> {
        self.seen.iter()
    }

    pub fn connected(&self) -> impl Iterator<Item = &PeerId> {
        self.connected.iter()
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn connected_len(&self) -> usize {
        self.connected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Union `ids` into the set. Returns how many were new.
    pub fn merge<I>(&mut self, ids: I) -> usize
    where
        I: IntoIterator<Item = PeerId>,
    {
        let before = self.seen.len();
        self.seen.extend(ids);
        self.seen.len() - before
    }

    /// Record connection evidence. Connected peers are also seen.
    pub fn merge_connected<I>(&mut self, ids: I) -> usize
    where
        I: IntoIterator<Item = PeerId>,
    {
        let before = self.connected.len();
        for id in ids {
            self.seen.insert(id.clone());
            self.connected.insert(id);
        }
        self.connected.len() - before
    }
}

/// Result of feeding one node's text to the tracker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Identifiers seen for the first time.
    pub new_peers: usize,
    /// Identifiers with first-time connection evidence.
    pub new_connections: usize,
    /// Bytes of text scanned this time.
    pub scanned: usize,
    /// The text had shrunk below the saved offset, so it was scanned from the start.
    pub rescanned: bool,
}

/// Visibility sets for every node, plus scan offsets.
#[derive(Debug, Clone, Default)]
pub struct VisibilityTracker {
    sets: BTreeMap<NodeName, VisibilitySet>,
    offsets: BTreeMap<NodeName, usize>,
}

impl VisibilityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracker with an empty set for each of `nodes`.
    pub fn with_nodes<'a, I>(nodes: I) -> Self
    where
        I: IntoIterator<Item = &'a NodeName>,
    {
        let sets = nodes
            .into_iter()
            .map(|n| (n.clone(), VisibilitySet::default()))
            .collect();
        Self {
            sets,
            offsets: BTreeMap::new(),
        }
    }

    /// Fold `node`'s accumulated `text` into its visibility set.
    ///
    /// Only text past the saved offset is scanned. Text that shrank below
    /// the offset is scanned from the start; a caller whose buffer restarted
    /// without shrinking that far must call [`reset_offset`](Self::reset_offset) first.
    pub fn observe(&mut self, node: &NodeName, text: &str) -> ScanOutcome {
        let offset = self.offsets.get(node).copied().unwrap_or(0);
        let rescanned = offset > text.len() || !text.is_char_boundary(offset);
        let start = if rescanned {
            tracing::debug!(node = %node, offset, len = text.len(), "log shrank, rescanning from start");
            0
        } else {
            offset
        };

        let chunk = &text[start..];
        let outcome = self.merge_chunk(node, chunk);

        // Resume at the start of the last incomplete line.
        let next = match chunk.rfind('\n') {
            Some(i) => start + i + 1,
            None => start,
        };
        self.offsets.insert(node.clone(), next);

        ScanOutcome {
            scanned: chunk.len(),
            rescanned,
            ..outcome
        }
    }

    /// Scan `node`'s next text from the start. Its set is kept.
    pub fn reset_offset(&mut self, node: &NodeName) {
        self.offsets.remove(node);
    }

    /// Union already-extracted identifiers into `node`'s set.
    pub fn merge<I>(&mut self, node: &NodeName, ids: I) -> usize
    where
        I: IntoIterator<Item = PeerId>,
    {
        self.sets.entry(node.clone()).or_default().merge(ids)
    }

    fn merge_chunk(&mut self, node: &NodeName, chunk: &str) -> ScanOutcome {
        let clean = strip_ansi(chunk);
        let ids = extract_stripped(&clean);
        let connections: Vec<PeerId> = CONNECTION_MATCHERS
            .iter()
            .flat_map(|m| m.all(&clean))
            .collect();

        let set = self.sets.entry(node.clone()).or_default();
        let new_peers = set.merge(ids);
        let new_connections = set.merge_connected(connections);

        if new_peers > 0 {
            tracing::debug!(node = %node, new_peers, total = set.len(), "observed new peers");
        }

        ScanOutcome {
            new_peers,
            new_connections,
            ..ScanOutcome::default()
        }
    }

    /// Visibility set of `node`, if it has one.
    pub fn get(&self, node: &NodeName) -> Option<&VisibilitySet> {
        self.sets.get(node)
    }

    /// Whether `node` has seen `id`.
    pub fn sees(&self, node: &NodeName, id: &PeerId) -> bool {
        self.sets.get(node).is_some_and(|s| s.contains(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeName, &VisibilitySet)> {
        self.sets.iter()
    }
}
