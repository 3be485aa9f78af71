//! Peer identifiers and the extractor that pulls them out of log text.
//!
//! A peer identifier is the literal prefix `12D3KooW` followed by a run of
//! base-58 characters, at least 44 of them. Nothing else about its structure
//! is assumed: two identifiers are the same iff their strings are equal.
//!
//! # Extraction
//!
//! Log lines are often decorated with terminal escape sequences, which can sit
//! directly against an identifier. They are stripped before matching. Matching
//! is greedy: a long run is one identifier, never two shorter ones.

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Literal prefix every peer identifier starts with.
pub const PEER_ID_PREFIX: &str = "12D3KooW";

/// Minimum number of base-58 characters after the prefix.
pub const MIN_BODY_LEN: usize = 44;

/// Minimum total length of a peer identifier.
pub const MIN_PEER_ID_LEN: usize = PEER_ID_PREFIX.len() + MIN_BODY_LEN;

/// Regex source for the identifier shape, shared with the phrase matchers.
pub(crate) const PEER_ID_PATTERN: &str = r"12D3KooW[1-9A-HJ-NP-Za-km-z]{44,}";

static PEER_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(PEER_ID_PATTERN).expect("peer id pattern compiles"));

// CSI sequences: ESC [ params intermediates final
static ANSI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").expect("escape pattern compiles"));

/// An opaque peer identifier as it appears in log text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeerId(String);

impl PeerId {
    /// Parse a complete identifier. The whole string must have the shape.
    pub fn parse(s: &str) -> Result<Self> {
        let body = s
            .strip_prefix(PEER_ID_PREFIX)
            .ok_or_else(|| Error::InvalidPeerId(s.to_string()))?;

        if body.len() < MIN_BODY_LEN || !body.chars().all(is_base58) {
            return Err(Error::InvalidPeerId(s.to_string()));
        }

        Ok(Self(s.to_string()))
    }

    /// Wrap a string the identifier regex already matched.
    pub(crate) fn from_match(s: &str) -> Self {
        debug_assert!(Self::parse(s).is_ok());
        Self(s.to_string())
    }

    /// The identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for narrow table columns: the first 20 characters and an ellipsis.
    pub fn short(&self) -> String {
        let head: String = self.0.chars().take(20).collect();
        format!("{}…", head)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PeerId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PeerId {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<PeerId> for String {
    fn from(id: PeerId) -> Self {
        id.0
    }
}

/// Base-58 alphabet: ASCII alphanumerics without `0`, `O`, `I` and `l`.
pub const fn is_base58(c: char) -> bool {
    c.is_ascii_alphanumeric() && !matches!(c, '0' | 'O' | 'I' | 'l')
}

/// Remove terminal escape sequences from `text`.
///
/// Borrows when there is nothing to strip.
pub fn strip_ansi(text: &str) -> Cow<'_, str> {
    ANSI_RE.replace_all(text, "")
}

/// Return the distinct peer identifiers mentioned in `text`.
///
/// Escape sequences are stripped first. The result is ordered so that two
/// runs over the same text compare equal.
pub fn extract_peer_ids(text: &str) -> BTreeSet<PeerId> {
    extract_stripped(&strip_ansi(text))
}

/// Extraction over text that has already had escape sequences removed.
pub(crate) fn extract_stripped(clean: &str) -> BTreeSet<PeerId> {
    PEER_ID_RE
        .find_iter(clean)
        .map(|m| PeerId::from_match(m.as_str()))
        .collect()
}

/// Whether `id` occurs in `clean` as a complete identifier rather than as the
/// head of a longer run.
pub(crate) fn mentions(clean: &str, id: &PeerId) -> bool {
    PEER_ID_RE.find_iter(clean).any(|m| m.as_str() == id.as_str())
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn fixtures_have_the_shape() {
        for s in [GCP, OSX, ANDROID, IOS_SIM, IOS_DEV, STRANGER] {
            assert!(PeerId::parse(s).is_ok(), "{} should parse", s);
            assert_eq!(s.len(), MIN_PEER_ID_LEN);
        }
    }

    #[test]
    fn parse_rejects_bad_shapes() {
        assert!(PeerId::parse("").is_err());
        assert!(PeerId::parse("12D3KooW").is_err());
        // One character short
        assert!(PeerId::parse(&GCP[..GCP.len() - 1]).is_err());
        // Wrong prefix
        assert!(PeerId::parse(&GCP.replace("12D3KooW", "12D3KooX")).is_err());
        // Zero is not base-58
        assert!(PeerId::parse(&format!("{}0", GCP)).is_err());
    }

    #[test]
    fn extracts_distinct_ids() {
        let text = format!("dial {GCP}\nconnected {OSX}\nagain {GCP}\n");
        let ids = extract_peer_ids(&text);
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&id(GCP)));
        assert!(ids.contains(&id(OSX)));
    }

    #[test]
    fn strips_escape_sequences() {
        let text = format!("\x1b[32mINFO\x1b[0m peer=\x1b[1m{GCP}\x1b[0m");
        assert_eq!(strip_ansi(&text), format!("INFO peer={GCP}"));
        assert_eq!(extract_peer_ids(&text), [id(GCP)].into_iter().collect());
    }

    #[test]
    fn escape_between_halves_is_joined() {
        let (head, tail) = GCP.split_at(20);
        let text = format!("{head}\x1b[0m{tail}");
        assert!(extract_peer_ids(&text).contains(&id(GCP)));
    }

    #[test]
    fn too_short_runs_are_ignored() {
        let text = format!("truncated {}", &OSX[..MIN_PEER_ID_LEN - 1]);
        assert!(extract_peer_ids(&text).is_empty());
    }

    #[test]
    fn longest_run_wins() {
        // A run long enough to be split into two valid identifiers is still one.
        let long = format!("{}{}", GCP, &OSX[PEER_ID_PREFIX.len()..]);
        let ids = extract_peer_ids(&long);
        assert_eq!(ids.len(), 1);
        assert_eq!(ids.iter().next().unwrap().as_str(), long);
    }

    #[test]
    fn adjacent_ids_split_on_non_alphabet() {
        let text = format!("{GCP},{OSX}/{ANDROID}");
        assert_eq!(extract_peer_ids(&text).len(), 3);
    }

    #[test]
    fn mentions_requires_complete_token() {
        let longer = format!("{}abc", GCP);
        assert!(!mentions(&longer, &id(GCP)));
        assert!(mentions(&format!("x {GCP} y"), &id(GCP)));
    }

    #[test]
    fn short_form() {
        assert_eq!(id(GCP).short(), "12D3KooWMyngfNZajWRN…");
    }

    #[test]
    fn serde_validates() {
        let json = serde_json::to_string(&id(OSX)).unwrap();
        assert_eq!(json, format!("\"{OSX}\""));
        assert!(serde_json::from_str::<PeerId>("\"not-a-peer\"").is_err());
    }

    proptest! {
        #[test]
        fn extraction_yields_well_formed_set(text in "[ -~\n]{0,200}", body in "[1-9A-HJ-NP-Za-km-z]{44,60}") {
            let input = format!("{text} {PEER_ID_PREFIX}{body} {text}");
            let ids = extract_peer_ids(&input);
            prop_assert!(!ids.is_empty());
            for pid in &ids {
                prop_assert!(PeerId::parse(pid.as_str()).is_ok());
                prop_assert!(pid.as_str().len() >= MIN_PEER_ID_LEN);
            }
        }

        #[test]
        fn extraction_is_deterministic(text in "\\PC{0,300}") {
            prop_assert_eq!(extract_peer_ids(&text), extract_peer_ids(&text));
        }
    }
}
