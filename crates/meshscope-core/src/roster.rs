//! The fixed set of mesh nodes being watched.
//!
//! A roster names every node, gives each a role, and optionally carries hints:
//! identifiers already known to belong to a node. Hints are only a fallback
//! for identity resolution; they never override what a node announces itself.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::peer_id::PeerId;

/// Stable label of a logical mesh participant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeName(String);

impl NodeName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Pad like a str so table columns line up.
        f.pad(&self.0)
    }
}

impl From<&str> for NodeName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Role of a node in the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Full client (phone, simulator)
    Full,
    /// Headless relay/daemon
    Headless,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            NodeRole::Full => "Full",
            NodeRole::Headless => "Headless",
        })
    }
}

/// One roster slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub name: NodeName,
    pub role: NodeRole,
}

/// The fixed node table plus the identifier hint table.
#[derive(Debug, Clone)]
pub struct Roster {
    entries: Vec<RosterEntry>,
    hints: BTreeMap<PeerId, NodeName>,
}

impl Roster {
    /// Build a roster, checking that names are unique and hints point at real nodes.
    pub fn new(entries: Vec<RosterEntry>, hints: BTreeMap<PeerId, NodeName>) -> Result<Self> {
        if entries.is_empty() {
            return Err(Error::EmptyRoster);
        }

        let mut names = BTreeSet::new();
        for entry in &entries {
            if !names.insert(&entry.name) {
                return Err(Error::DuplicateNode(entry.name.to_string()));
            }
        }

        for (id, node) in &hints {
            if !names.contains(node) {
                return Err(Error::UnknownHintTarget {
                    id: id.to_string(),
                    node: node.to_string(),
                });
            }
        }

        Ok(Self { entries, hints })
    }

    /// The five-node bring-up mesh: two headless daemons and three phones.
    pub fn five_node() -> Self {
        let entries = [
            ("gcp", NodeRole::Headless),
            ("osx", NodeRole::Headless),
            ("android", NodeRole::Full),
            ("ios_dev", NodeRole::Full),
            ("ios_sim", NodeRole::Full),
        ]
        .into_iter()
        .map(|(name, role)| RosterEntry { name: name.into(), role })
        .collect();

        let hints = FIVE_NODE_HINTS
            .iter()
            .map(|(id, name)| (PeerId::from_match(id), NodeName::from(*name)))
            .collect();

        Self { entries, hints }
    }

    /// Nodes in roster order.
    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    /// Node names in roster order.
    pub fn names(&self) -> impl Iterator<Item = &NodeName> {
        self.entries.iter().map(|e| &e.name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &NodeName) -> bool {
        self.role_of(name).is_some()
    }

    pub fn role_of(&self, name: &NodeName) -> Option<NodeRole> {
        self.entries.iter().find(|e| &e.name == name).map(|e| e.role)
    }

    /// Number of nodes other than `name` that hold `role`.
    pub fn expected_peers(&self, name: &NodeName, role: NodeRole) -> usize {
        self.entries
            .iter()
            .filter(|e| &e.name != name && e.role == role)
            .count()
    }

    /// The identifier hint table.
    pub fn hints(&self) -> &BTreeMap<PeerId, NodeName> {
        &self.hints
    }

    /// Hinted identifiers for `name`, in identifier order.
    pub fn hinted_ids<'a>(&'a self, name: &'a NodeName) -> impl Iterator<Item = &'a PeerId> + 'a {
        self.hints
            .iter()
            .filter(move |(_, node)| *node == name)
            .map(|(id, _)| id)
    }

    /// Whether `id` appears in the hint table.
    pub fn is_hinted(&self, id: &PeerId) -> bool {
        self.hints.contains_key(id)
    }
}

impl Default for Roster {
    fn default() -> Self {
        Self::five_node()
    }
}

// Identities observed on the bring-up devices; update if they rotate.
const FIVE_NODE_HINTS: &[(&str, &str)] = &[
    ("12D3KooWMyngfNZajWRNRPdtc32uxn1sBYZE126NDD4b547BAMLj", "gcp"),
    ("12D3KooWHpmuhytgzLcM4nj1hZvN5b4crB1wka3LCNfKRCd7yHj9", "osx"),
    ("12D3KooWK8tm9qspf8FZ4sr2VHR48azhYuxCsiu7Ee5yQVoChamU", "android"),
    ("12D3KooWHqa2jd8Ec3bbXR24Fn8Lc2rPQQwjeEiY2zUyXXMCez27", "ios_sim"),
    ("12D3KooWAqrZFh84t7WbgkTcxUGesHxLUH1gTY4szfe4aEXXqvvg", "ios_dev"),
];
