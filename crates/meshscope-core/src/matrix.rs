//! The visibility matrix.
//!
//! Recomputed from scratch every cycle from the identity binding and the
//! visibility sets. For each node it lists the other nodes it can see, split
//! by role, and the ones it cannot, tagged with why:
//!
//! - `Unresolved`: the other node's identifier is not known yet, so there is
//!   nothing to look for.
//! - `NotObserved`: the identifier is known but this node never mentioned it.
//!   This is a real visibility gap.
//!
//! The mesh is converged (a full mesh) iff every node is resolved and every
//! node sees every other node's identifier.

use serde::Serialize;

use crate::identity::IdentityBinding;
use crate::peer_id::PeerId;
use crate::roster::{NodeName, NodeRole, Roster};
use crate::visibility::VisibilityTracker;

/// Rows with at most this many missing peers are graded `Degraded` rather than `Isolated`.
pub const DEGRADED_MAX_MISSING: usize = 2;

/// Why a peer is missing from a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingReason {
    /// The peer's own identity has not been resolved.
    Unresolved,
    /// The peer is resolved but this node never mentioned its identifier.
    NotObserved,
}

/// A peer this node can see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VisiblePeer {
    pub node: NodeName,
    /// The node also logged an established connection to it.
    pub connected: bool,
}

/// A peer this node cannot see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingPeer {
    pub node: NodeName,
    pub role: NodeRole,
    pub reason: MissingReason,
}

/// Coarse grade of one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowHealth {
    /// Sees everyone.
    Complete,
    /// Missing a few peers.
    Degraded,
    /// Missing most peers.
    Isolated,
}

/// One node's row of the matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeRow {
    pub node: NodeName,
    pub role: NodeRole,
    pub identity: Option<PeerId>,
    pub visible_full: Vec<VisiblePeer>,
    pub visible_headless: Vec<VisiblePeer>,
    /// Other full nodes in the roster.
    pub expected_full: usize,
    /// Other headless nodes in the roster.
    pub expected_headless: usize,
    pub missing: Vec<MissingPeer>,
}

impl NodeRow {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    pub fn health(&self) -> RowHealth {
        match self.missing.len() {
            0 => RowHealth::Complete,
            n if n <= DEGRADED_MAX_MISSING => RowHealth::Degraded,
            _ => RowHealth::Isolated,
        }
    }

    /// Visible peers of `role`.
    pub fn visible(&self, role: NodeRole) -> &[VisiblePeer] {
        match role {
            NodeRole::Full => &self.visible_full,
            NodeRole::Headless => &self.visible_headless,
        }
    }
}

/// Mesh-wide status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MeshStatus {
    /// Every node resolved and visible to every other node.
    FullMesh,
    /// Some nodes have not identified themselves yet.
    AwaitingIdentities { unresolved: usize },
    /// Everyone is resolved, but some pairs cannot see each other.
    Partial { gaps: usize },
}

/// The matrix for one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MeshSnapshot {
    pub rows: Vec<NodeRow>,
    pub resolved: usize,
    pub total: usize,
}

impl MeshSnapshot {
    /// Compute the matrix. Rows follow roster order.
    pub fn compute(roster: &Roster, binding: &IdentityBinding, visibility: &VisibilityTracker) -> Self {
        let rows = roster
            .entries()
            .iter()
            .map(|entry| {
                let mut row = NodeRow {
                    node: entry.name.clone(),
                    role: entry.role,
                    identity: binding.id_of(&entry.name).cloned(),
                    visible_full: Vec::new(),
                    visible_headless: Vec::new(),
                    expected_full: roster.expected_peers(&entry.name, NodeRole::Full),
                    expected_headless: roster.expected_peers(&entry.name, NodeRole::Headless),
                    missing: Vec::new(),
                };
                let seen = visibility.get(&entry.name);

                for other in roster.entries().iter().filter(|o| o.name != entry.name) {
                    let reason = match binding.id_of(&other.name) {
                        None => Some(MissingReason::Unresolved),
                        Some(id) => match seen {
                            Some(set) if set.contains(id) => {
                                let peer = VisiblePeer {
                                    node: other.name.clone(),
                                    connected: set.is_connected(id),
                                };
                                match other.role {
                                    NodeRole::Full => row.visible_full.push(peer),
                                    NodeRole::Headless => row.visible_headless.push(peer),
                                }
                                None
                            }
                            _ => Some(MissingReason::NotObserved),
                        },
                    };

                    if let Some(reason) = reason {
                        row.missing.push(MissingPeer {
                            node: other.name.clone(),
                            role: other.role,
                            reason,
                        });
                    }
                }

                row
            })
            .collect();

        Self {
            rows,
            resolved: roster.names().filter(|n| binding.is_resolved(n)).count(),
            total: roster.len(),
        }
    }

    /// Whether the mesh has converged.
    pub fn is_full_mesh(&self) -> bool {
        self.resolved == self.total && self.rows.iter().all(NodeRow::is_complete)
    }

    /// Ordered pairs (A, B) where A cannot see B, for any reason.
    pub fn gap_count(&self) -> usize {
        self.rows.iter().map(|r| r.missing.len()).sum()
    }

    pub fn unresolved(&self) -> usize {
        self.total - self.resolved
    }

    pub fn status(&self) -> MeshStatus {
        if self.is_full_mesh() {
            MeshStatus::FullMesh
        } else if self.unresolved() > 0 {
            MeshStatus::AwaitingIdentities {
                unresolved: self.unresolved(),
            }
        } else {
            MeshStatus::Partial {
                gaps: self.gap_count(),
            }
        }
    }

    pub fn row(&self, node: &NodeName) -> Option<&NodeRow> {
        self.rows.iter().find(|r| &r.node == node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{Evidence, ResolvedIdentity};
    use crate::peer_id::fixtures::*;

    const NAMES: [(&str, &str); 5] = [
        ("gcp", GCP),
        ("osx", OSX),
        ("android", ANDROID),
        ("ios_dev", IOS_DEV),
        ("ios_sim", IOS_SIM),
    ];

    fn bind_all(binding: &mut IdentityBinding) {
        for (name, pid) in NAMES {
            binding.bind(
                name.into(),
                ResolvedIdentity {
                    id: id(pid),
                    evidence: Evidence::Hint,
                },
            );
        }
    }

    fn full_visibility(roster: &Roster) -> VisibilityTracker {
        let mut tracker = VisibilityTracker::with_nodes(roster.names());
        for (name, _) in NAMES {
            tracker.merge(&name.into(), NAMES.iter().map(|(_, p)| id(p)));
        }
        tracker
    }

    #[test]
    fn empty_state_lists_everyone_as_unresolved() {
        let roster = Roster::five_node();
        let snapshot = MeshSnapshot::compute(&roster, &IdentityBinding::new(), &VisibilityTracker::new());

        assert!(!snapshot.is_full_mesh());
        assert_eq!(snapshot.status(), MeshStatus::AwaitingIdentities { unresolved: 5 });
        for row in &snapshot.rows {
            assert_eq!(row.missing.len(), 4);
            assert!(row.missing.iter().all(|m| m.reason == MissingReason::Unresolved));
            assert!(row.missing.iter().all(|m| m.node != row.node));
            assert_eq!(row.health(), RowHealth::Isolated);
        }
        assert_eq!(snapshot.gap_count(), 20);
    }

    #[test]
    fn full_mesh_when_everyone_sees_everyone() {
        let roster = Roster::five_node();
        let mut binding = IdentityBinding::new();
        bind_all(&mut binding);
        let snapshot = MeshSnapshot::compute(&roster, &binding, &full_visibility(&roster));

        assert!(snapshot.is_full_mesh());
        assert_eq!(snapshot.status(), MeshStatus::FullMesh);
        assert_eq!(snapshot.gap_count(), 0);

        let gcp = snapshot.row(&"gcp".into()).unwrap();
        assert_eq!(gcp.visible_headless.len(), 1);
        assert_eq!(gcp.visible_full.len(), 3);
        assert_eq!((gcp.expected_full, gcp.expected_headless), (3, 1));
        assert_eq!(gcp.health(), RowHealth::Complete);
    }

    #[test]
    fn resolved_but_unseen_is_a_gap() {
        let roster = Roster::five_node();
        let mut binding = IdentityBinding::new();
        bind_all(&mut binding);
        // android has seen nothing but itself
        let mut tracker = VisibilityTracker::with_nodes(roster.names());
        for (name, _) in NAMES.iter().filter(|(n, _)| *n != "android") {
            tracker.merge(&(*name).into(), NAMES.iter().map(|(_, p)| id(p)));
        }
        tracker.merge(&"android".into(), [id(ANDROID)]);

        let snapshot = MeshSnapshot::compute(&roster, &binding, &tracker);
        let android = snapshot.row(&"android".into()).unwrap();
        assert_eq!(android.missing.len(), 4);
        assert!(android.missing.iter().all(|m| m.reason == MissingReason::NotObserved));
        assert_eq!(snapshot.status(), MeshStatus::Partial { gaps: 4 });
    }

    #[test]
    fn health_grades() {
        let roster = Roster::five_node();
        let mut binding = IdentityBinding::new();
        bind_all(&mut binding);
        let mut tracker = VisibilityTracker::with_nodes(roster.names());
        tracker.merge(&"gcp".into(), [id(OSX), id(ANDROID)]);

        let snapshot = MeshSnapshot::compute(&roster, &binding, &tracker);
        let gcp = snapshot.row(&"gcp".into()).unwrap();
        assert_eq!(gcp.missing.len(), 2);
        assert_eq!(gcp.health(), RowHealth::Degraded);
    }

    #[test]
    fn connection_flag_follows_evidence() {
        let roster = Roster::five_node();
        let mut binding = IdentityBinding::new();
        bind_all(&mut binding);
        let mut tracker = VisibilityTracker::with_nodes(roster.names());
        tracker.observe(&"gcp".into(), &format!("Connected to peer: {OSX}\nsaw {ANDROID}\n"));

        let snapshot = MeshSnapshot::compute(&roster, &binding, &tracker);
        let gcp = snapshot.row(&"gcp".into()).unwrap();
        assert_eq!(
            gcp.visible(NodeRole::Headless),
            &[VisiblePeer {
                node: "osx".into(),
                connected: true
            }]
        );
        assert_eq!(
            gcp.visible(NodeRole::Full),
            &[VisiblePeer {
                node: "android".into(),
                connected: false
            }]
        );
    }
}
