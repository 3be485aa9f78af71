//! The monitor: all per-run state, owned by whoever drives the refresh loop.
//!
//! One cycle is: call [`MeshMonitor::observe`] once per node with that node's
//! accumulated log text, then call [`MeshMonitor::report`]. Observing a node
//! only touches that node's state, so the per-node calls may happen in any
//! order; the report reads everything and must come after them.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::anomaly::{
    conflicting_bindings, stray_peers, BindingConflict, EventCounts, EventPatterns,
    DEFAULT_RECENT_WINDOW,
};
use crate::error::{Error, Result};
use crate::identity::{IdentityBinding, IdentityResolver, IdentityState, ResolvedIdentity};
use crate::matrix::{MeshSnapshot, MeshStatus};
use crate::peer_id::PeerId;
use crate::roster::{NodeName, NodeRole, Roster};
use crate::visibility::{ScanOutcome, VisibilityTracker};

/// What one `observe` call changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeUpdate {
    /// Set when this call resolved the node's identity.
    pub resolved: Option<PeerId>,
    pub scan: ScanOutcome,
}

#[derive(Debug, Clone, Copy, Default)]
struct Activity {
    events: EventCounts,
    recent_errors: usize,
}

/// Everything known about one node, for the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeReport {
    pub node: NodeName,
    pub role: NodeRole,
    pub identity: Option<ResolvedIdentity>,
    /// Distinct identifiers mentioned.
    pub seen: usize,
    /// Distinct identifiers with connection evidence.
    pub connected: usize,
    pub strays: Vec<PeerId>,
    pub recent_errors: usize,
    pub events: EventCounts,
}

/// Output of one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MeshReport {
    pub nodes: Vec<NodeReport>,
    pub matrix: MeshSnapshot,
    pub status: MeshStatus,
    pub full_mesh: bool,
    pub conflicts: Vec<BindingConflict>,
}

impl MeshReport {
    pub fn node(&self, node: &NodeName) -> Option<&NodeReport> {
        self.nodes.iter().find(|n| &n.node == node)
    }

    /// Total stray identifiers across all nodes.
    pub fn stray_total(&self) -> usize {
        self.nodes.iter().map(|n| n.strays.len()).sum()
    }
}

/// Identity binding, visibility, and activity for a fixed roster.
#[derive(Debug, Clone)]
pub struct MeshMonitor {
    roster: Roster,
    resolver: IdentityResolver,
    patterns: EventPatterns,
    recent_window: usize,
    binding: IdentityBinding,
    visibility: VisibilityTracker,
    activity: BTreeMap<NodeName, Activity>,
}

impl MeshMonitor {
    /// Monitor with the built-in identity phrases and event patterns.
    pub fn new(roster: Roster) -> Self {
        let visibility = VisibilityTracker::with_nodes(roster.names());
        Self {
            roster,
            resolver: IdentityResolver::default(),
            patterns: EventPatterns::default(),
            recent_window: DEFAULT_RECENT_WINDOW,
            binding: IdentityBinding::new(),
            visibility,
            activity: BTreeMap::new(),
        }
    }

    pub fn with_resolver(mut self, resolver: IdentityResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_event_patterns(mut self, patterns: EventPatterns) -> Self {
        self.patterns = patterns;
        self
    }

    /// Characters of trailing text inspected for recent errors.
    pub fn with_recent_window(mut self, chars: usize) -> Self {
        self.recent_window = chars;
        self
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn binding(&self) -> &IdentityBinding {
        &self.binding
    }

    pub fn visibility(&self) -> &VisibilityTracker {
        &self.visibility
    }

    pub fn identity(&self, node: &NodeName) -> IdentityState<'_> {
        self.binding.state(node)
    }

    /// Feed `node`'s accumulated log text.
    ///
    /// The text must only grow between calls for the same node. When the
    /// caller's buffer starts over (the log was truncated or rotated), call
    /// [`rescan`](Self::rescan) before observing the new text.
    pub fn observe(&mut self, node: &NodeName, text: &str) -> Result<NodeUpdate> {
        if !self.roster.contains(node) {
            return Err(Error::UnknownNode(node.to_string()));
        }

        let scan = self.visibility.observe(node, text);

        let mut resolved = None;
        if !text.is_empty() && !self.binding.is_resolved(node) {
            if let Some(identity) = self.resolver.resolve(node, text, &self.roster) {
                tracing::info!(node = %node, id = %identity.id, evidence = ?identity.evidence, "identity resolved");
                resolved = Some(identity.id.clone());
                self.binding.bind(node.clone(), identity);
            }
        }

        self.activity.insert(
            node.clone(),
            Activity {
                events: self.patterns.count(text),
                recent_errors: self.patterns.recent_errors(text, self.recent_window),
            },
        );

        Ok(NodeUpdate { resolved, scan })
    }

    /// Forget how far `node`'s text was scanned. The next `observe` reads
    /// the whole text; peers already seen stay seen.
    pub fn rescan(&mut self, node: &NodeName) -> Result<()> {
        if !self.roster.contains(node) {
            return Err(Error::UnknownNode(node.to_string()));
        }
        tracing::debug!(node = %node, "scan offset reset");
        self.visibility.reset_offset(node);
        Ok(())
    }

    /// Compute the matrix and anomaly signals from the current state.
    pub fn report(&self) -> MeshReport {
        let matrix = MeshSnapshot::compute(&self.roster, &self.binding, &self.visibility);

        let nodes = self
            .roster
            .entries()
            .iter()
            .map(|entry| {
                let activity = self.activity.get(&entry.name).copied().unwrap_or_default();
                let (seen, connected, strays) = match self.visibility.get(&entry.name) {
                    Some(set) => (
                        set.len(),
                        set.connected_len(),
                        stray_peers(&entry.name, set, &self.binding, &self.roster),
                    ),
                    None => (0, 0, Vec::new()),
                };

                NodeReport {
                    node: entry.name.clone(),
                    role: entry.role,
                    identity: self.binding.identity_of(&entry.name).cloned(),
                    seen,
                    connected,
                    strays,
                    recent_errors: activity.recent_errors,
                    events: activity.events,
                }
            })
            .collect();

        MeshReport {
            nodes,
            status: matrix.status(),
            full_mesh: matrix.is_full_mesh(),
            matrix,
            conflicts: conflicting_bindings(&self.binding),
        }
    }
}
