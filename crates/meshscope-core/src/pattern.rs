//! Phrase matchers: an anchoring phrase followed by a captured peer identifier.
//!
//! Each matcher is independent and carries a name, so an ordered list of
//! them can be evaluated one at a time and a match can be traced back to
//! the phrasing that produced it.

use regex::Regex;

use crate::error::{Error, Result};
use crate::peer_id::{PeerId, PEER_ID_PATTERN};

/// A named phrase followed by a peer identifier.
#[derive(Debug, Clone)]
pub struct PhraseMatcher {
    name: String,
    regex: Regex,
}

impl PhraseMatcher {
    /// Build a matcher from a phrase regex. The identifier capture is appended.
    ///
    /// The phrase is ordinary regex syntax; wrap parts in `(?i:...)` for
    /// case-insensitive matching. The identifier itself is always matched
    /// case-sensitively.
    pub fn new(name: impl Into<String>, phrase: &str) -> Result<Self> {
        let name = name.into();
        let source = format!("{}(?P<id>{})", phrase, PEER_ID_PATTERN);
        let regex = Regex::new(&source).map_err(|source| Error::InvalidPattern {
            name: name.clone(),
            source,
        })?;
        Ok(Self { name, regex })
    }

    /// Name of this matcher.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The leftmost identifier this phrase introduces, if any.
    pub fn first(&self, text: &str) -> Option<PeerId> {
        self.regex
            .captures(text)
            .and_then(|caps| caps.name("id"))
            .map(|m| PeerId::from_match(m.as_str()))
    }

    /// Every identifier this phrase introduces, in text order.
    pub fn all<'t>(&'t self, text: &'t str) -> impl Iterator<Item = PeerId> + 't {
        self.regex
            .captures_iter(text)
            .filter_map(|caps| caps.name("id"))
            .map(|m| PeerId::from_match(m.as_str()))
    }
}

/// Build matchers from `(name, phrase)` pairs, keeping their order.
pub fn compile_all<'a, I>(specs: I) -> Result<Vec<PhraseMatcher>>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    specs
        .into_iter()
        .map(|(name, phrase)| PhraseMatcher::new(name, phrase))
        .collect()
}
