//! Command line and roster-file configuration for the monitor.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use meshscope_core::{
    EventPatterns, IdentityResolver, NodeName, Roster, RosterConfig, DEFAULT_RECENT_WINDOW,
};
use serde::{Deserialize, Serialize};

use crate::render::RenderOptions;

/// Log files of the built-in five-node roster, relative to `--log-dir`.
const DEFAULT_LOG_FILES: &[(&str, &str)] = &[
    ("gcp", "gcp.log"),
    ("osx", "osx.log"),
    ("android", "android.log"),
    ("ios_dev", "ios-device.log"),
    ("ios_sim", "ios-sim.log"),
];

#[derive(Parser, Debug, Clone)]
#[command(
    name = "meshscope",
    about = "Live visibility matrix for a small peer-to-peer test mesh, built from node logs"
)]
pub struct Cli {
    /// Directory that relative log paths are resolved against.
    #[arg(long, env = "MESHSCOPE_LOG_DIR", default_value = "logs/5mesh")]
    pub log_dir: PathBuf,

    /// Roster file (JSON). Without one, the built-in five-node roster is used.
    #[arg(long, env = "MESHSCOPE_ROSTER")]
    pub roster: Option<PathBuf>,

    /// Seconds between refreshes.
    #[arg(long, env = "MESHSCOPE_INTERVAL_SECS", default_value_t = 3)]
    pub interval_secs: u64,

    /// Trailing characters of each log inspected for recent errors.
    #[arg(long, env = "MESHSCOPE_RECENT_WINDOW", default_value_t = DEFAULT_RECENT_WINDOW)]
    pub recent_window: usize,

    /// Flag a node when its recent error count exceeds this.
    #[arg(long, env = "MESHSCOPE_ERROR_THRESHOLD", default_value_t = 5)]
    pub error_threshold: usize,

    /// Run a single cycle and exit.
    #[arg(long)]
    pub once: bool,

    /// Print each report as a JSON line instead of the table.
    #[arg(long)]
    pub json: bool,

    /// Do not clear the screen between refreshes.
    #[arg(long)]
    pub no_clear: bool,
}

impl Cli {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            error_threshold: self.error_threshold,
            clear_screen: !self.no_clear && !self.json,
            json: self.json,
        }
    }

    /// Read the roster file (if any) and resolve every node's log path.
    pub fn load(&self) -> anyhow::Result<WatchSetup> {
        let file = match &self.roster {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading roster file {}", path.display()))?;
                WatchFile::from_json(&text)
                    .with_context(|| format!("parsing roster file {}", path.display()))?
            }
            None => WatchFile::five_node(),
        };

        WatchSetup::from_file(file, &self.log_dir, self.recent_window)
    }
}

/// Roster file: the core roster plus where each node's log lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchFile {
    #[serde(flatten)]
    pub roster: RosterConfig,
    /// Log path per node. Nodes without an entry read `<name>.log`.
    #[serde(default)]
    pub logs: BTreeMap<NodeName, PathBuf>,
}

impl WatchFile {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn five_node() -> Self {
        Self {
            roster: RosterConfig::from(&Roster::five_node()),
            logs: DEFAULT_LOG_FILES
                .iter()
                .map(|(name, file)| (NodeName::from(*name), PathBuf::from(file)))
                .collect(),
        }
    }
}

/// Everything the refresh loop needs.
#[derive(Debug, Clone)]
pub struct WatchSetup {
    pub roster: Roster,
    pub resolver: IdentityResolver,
    pub patterns: EventPatterns,
    pub recent_window: usize,
    /// Log path per node, in roster order.
    pub logs: Vec<(NodeName, PathBuf)>,
}

impl WatchSetup {
    pub fn from_file(file: WatchFile, log_dir: &Path, recent_window: usize) -> anyhow::Result<Self> {
        let roster = file.roster.roster().context("invalid roster")?;
        let resolver = file.roster.resolver().context("invalid identity pattern")?;
        let patterns = file.roster.event_patterns().context("invalid event pattern")?;

        if let Some(stray) = file.logs.keys().find(|name| !roster.contains(name)) {
            anyhow::bail!("log path given for unknown node {}", stray);
        }

        let logs = roster
            .names()
            .map(|name| {
                let path = file
                    .logs
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| PathBuf::from(format!("{}.log", name.as_str())));
                (name.clone(), log_dir.join(path))
            })
            .collect();

        Ok(Self {
            roster,
            resolver,
            patterns,
            recent_window,
            logs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_five_node_layout() {
        let cli = Cli::parse_from(["meshscope"]);
        assert_eq!(cli.interval(), Duration::from_secs(3));
        assert_eq!(cli.recent_window, DEFAULT_RECENT_WINDOW);
        assert_eq!(cli.error_threshold, 5);

        let setup = cli.load().unwrap();
        assert_eq!(setup.roster.len(), 5);
        let (name, path) = &setup.logs[3];
        assert_eq!(name, &NodeName::from("ios_dev"));
        assert_eq!(path, &PathBuf::from("logs/5mesh/ios-device.log"));
    }

    #[test]
    fn json_mode_never_clears() {
        let cli = Cli::parse_from(["meshscope", "--json"]);
        let opts = cli.render_options();
        assert!(opts.json);
        assert!(!opts.clear_screen);
    }

    #[test]
    fn roster_file_with_log_overrides() {
        let json = r#"{
            "nodes": [
                { "name": "relay", "role": "headless" },
                { "name": "phone", "role": "full" }
            ],
            "logs": { "relay": "/var/log/relay.log" }
        }"#;
        let file = WatchFile::from_json(json).unwrap();
        let setup = WatchSetup::from_file(file, Path::new("logs"), 500).unwrap();

        assert_eq!(
            setup.logs,
            vec![
                (NodeName::from("relay"), PathBuf::from("/var/log/relay.log")),
                (NodeName::from("phone"), PathBuf::from("logs/phone.log")),
            ]
        );
        assert_eq!(setup.recent_window, 500);
    }

    #[test]
    fn log_for_unknown_node_is_rejected() {
        let json = r#"{
            "nodes": [ { "name": "relay", "role": "headless" } ],
            "logs": { "ghost": "ghost.log" }
        }"#;
        let file = WatchFile::from_json(json).unwrap();
        assert!(WatchSetup::from_file(file, Path::new("."), 10).is_err());
    }

    #[test]
    fn roster_file_is_read_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.json");
        let file = WatchFile::five_node();
        std::fs::write(&path, serde_json::to_string(&file).unwrap()).unwrap();

        let cli = Cli::parse_from([
            std::ffi::OsStr::new("meshscope"),
            std::ffi::OsStr::new("--roster"),
            path.as_os_str(),
        ]);
        let setup = cli.load().unwrap();
        assert_eq!(setup.roster.hints().len(), 5);
    }

    #[test]
    fn missing_roster_file_has_context() {
        let cli = Cli::parse_from(["meshscope", "--roster", "/nonexistent/roster.json"]);
        let err = cli.load().unwrap_err();
        assert!(format!("{:#}", err).contains("reading roster file"));
    }
}
