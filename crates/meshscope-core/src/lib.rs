//! Mesh Visibility Engine
//!
//! Watches a small peer-to-peer test mesh through its nodes' logs and
//! answers one question: has the mesh converged to full connectivity?
//!
//! # Pipeline
//!
//! 1. **Extract**: pull peer identifiers out of raw log text
//! 2. **Resolve**: work out which identifier each node holds itself
//! 3. **Track**: grow each node's set of peers it has mentioned
//! 4. **Compute**: build the visibility matrix and convergence verdict
//! 5. **Flag**: stray peers, recent error bursts, conflicting identities
//!
//! Steps 1–3 are per node and touch only that node's state. Step 4 reads
//! everything and runs after all nodes of a cycle have been observed.
//!
//! # Monotonic State
//!
//! Identity bindings are write-once and visibility sets only grow, so a
//! refresh loop can be interrupted between cycles at any point and
//! re-running a cycle on the same text changes nothing.
//!
//! ```
//! use meshscope_core::{MeshMonitor, NodeName, Roster};
//!
//! let mut monitor = MeshMonitor::new(Roster::five_node());
//! let gcp = NodeName::from("gcp");
//! monitor
//!     .observe(&gcp, "Peer ID: 12D3KooWMyngfNZajWRNRPdtc32uxn1sBYZE126NDD4b547BAMLj\n")
//!     .unwrap();
//!
//! let report = monitor.report();
//! assert!(report.matrix.row(&gcp).unwrap().identity.is_some());
//! assert!(!report.full_mesh);
//! ```

mod error;
mod pattern;
mod peer_id;
mod roster;
mod identity;
mod visibility;
mod matrix;
mod anomaly;
mod config;
mod monitor;

pub use error::{Error, Result};
pub use pattern::PhraseMatcher;
pub use peer_id::{
    extract_peer_ids, is_base58, strip_ansi, PeerId, MIN_BODY_LEN, MIN_PEER_ID_LEN,
    PEER_ID_PREFIX,
};
pub use roster::{NodeName, NodeRole, Roster, RosterEntry};
pub use identity::{
    Evidence, IdentityBinding, IdentityResolver, IdentityState, ResolvedIdentity,
    DEFAULT_IDENTITY_PHRASES,
};
pub use visibility::{ScanOutcome, VisibilitySet, VisibilityTracker, CONNECTION_PHRASES};
pub use matrix::{
    MeshSnapshot, MeshStatus, MissingPeer, MissingReason, NodeRow, RowHealth, VisiblePeer,
    DEGRADED_MAX_MISSING,
};
pub use anomaly::{
    conflicting_bindings, stray_peers, trailing_window, BindingConflict, EventCounts,
    EventPatterns, EventPatternsBuilder, DEFAULT_ERROR_PATTERN, DEFAULT_RECENT_WINDOW,
};
pub use config::{NamedPhrase, PatternConfig, RosterConfig};
pub use monitor::{MeshMonitor, MeshReport, NodeReport, NodeUpdate};
