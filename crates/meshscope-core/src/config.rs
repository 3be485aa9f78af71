//! JSON roster configuration.
//!
//! ```json
//! {
//!   "nodes": [
//!     { "name": "gcp", "role": "headless" },
//!     { "name": "android", "role": "full" }
//!   ],
//!   "hints": { "12D3KooW...": "gcp" },
//!   "patterns": { "error": "(?i)panic|ERR" }
//! }
//! ```
//!
//! Everything except `nodes` is optional; omitted pattern tables fall back to
//! the built-in ones.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::anomaly::EventPatterns;
use crate::error::Result;
use crate::identity::IdentityResolver;
use crate::peer_id::PeerId;
use crate::roster::{NodeName, Roster, RosterEntry};

/// A named identity phrase, in priority order within its list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedPhrase {
    pub name: String,
    pub phrase: String,
}

/// Pattern overrides. Each field replaces the corresponding built-in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Self-identity phrases, highest priority first.
    pub identity: Option<Vec<NamedPhrase>>,
    /// Error-indicating pattern (full regex).
    pub error: Option<String>,
    /// Connection event pattern.
    pub connect: Option<String>,
    /// Outbound message pattern.
    pub sent: Option<String>,
    /// Inbound message pattern.
    pub received: Option<String>,
}

/// Roster file contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterConfig {
    pub nodes: Vec<RosterEntry>,
    #[serde(default)]
    pub hints: BTreeMap<PeerId, NodeName>,
    #[serde(default)]
    pub patterns: PatternConfig,
}

impl RosterConfig {
    /// Parse from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Validate into a roster.
    pub fn roster(&self) -> Result<Roster> {
        Roster::new(self.nodes.clone(), self.hints.clone())
    }

    /// Identity resolver honoring any phrase override.
    pub fn resolver(&self) -> Result<IdentityResolver> {
        match &self.patterns.identity {
            Some(phrases) => IdentityResolver::from_phrases(
                phrases.iter().map(|p| (p.name.as_str(), p.phrase.as_str())),
            ),
            None => Ok(IdentityResolver::default()),
        }
    }

    /// Event patterns honoring any overrides.
    pub fn event_patterns(&self) -> Result<EventPatterns> {
        let p = &self.patterns;
        EventPatterns::builder()
            .connect(p.connect.as_deref())
            .error(p.error.as_deref())
            .sent(p.sent.as_deref())
            .received(p.received.as_deref())
            .build()
    }
}

impl From<&Roster> for RosterConfig {
    fn from(roster: &Roster) -> Self {
        Self {
            nodes: roster.entries().to_vec(),
            hints: roster.hints().clone(),
            patterns: PatternConfig::default(),
        }
    }
}
