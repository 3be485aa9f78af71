//! Plain-text rendering of a mesh report.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::time::Duration;

use meshscope_core::{
    MeshReport, MeshStatus, MissingReason, NodeName, NodeRole, NodeRow, RowHealth, VisiblePeer,
};
use serde::Serialize;

/// Clears the terminal and homes the cursor.
pub const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

const RULE_WIDTH: usize = 75;

/// How reports are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    /// Recent-error count above which a node is flagged.
    pub error_threshold: usize,
    pub clear_screen: bool,
    pub json: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            error_threshold: 5,
            clear_screen: true,
            json: false,
        }
    }
}

/// Facts about a node's log file, gathered by the driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LogStats {
    pub present: bool,
    pub lines: usize,
    #[serde(with = "secs")]
    pub age: Option<Duration>,
}

mod secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(age: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match age {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }
}

/// "42s", "3m07s" or "2h05m".
pub fn format_age(age: Duration) -> String {
    let secs = age.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60)
    }
}

/// "01:02:03" for time since the monitor started.
fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

fn names(peers: &[VisiblePeer]) -> String {
    if peers.is_empty() {
        return "-".to_string();
    }
    peers
        .iter()
        .map(|p| {
            if p.connected {
                format!("{}*", p.node)
            } else {
                p.node.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn seen_column(row: &NodeRow, role: NodeRole) -> String {
    let expected = match role {
        NodeRole::Full => row.expected_full,
        NodeRole::Headless => row.expected_headless,
    };
    let peers = row.visible(role);
    format!("{}/{} ({})", peers.len(), expected, names(peers))
}

fn missing_column(row: &NodeRow) -> String {
    if row.missing.is_empty() {
        return "none".to_string();
    }
    row.missing
        .iter()
        .map(|m| match m.reason {
            MissingReason::Unresolved => format!("{}?", m.node),
            MissingReason::NotObserved => m.node.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn health_marker(health: RowHealth) -> &'static str {
    match health {
        RowHealth::Complete => "ok",
        RowHealth::Degraded => "!!",
        RowHealth::Isolated => "XX",
    }
}

/// Render the full status screen.
pub fn render_table(
    report: &MeshReport,
    logs: &BTreeMap<NodeName, LogStats>,
    uptime: Duration,
    options: &RenderOptions,
) -> String {
    let mut out = String::new();
    write_table(&mut out, report, logs, uptime, options).expect("formatting into a String");
    out
}

fn write_table(
    out: &mut String,
    report: &MeshReport,
    logs: &BTreeMap<NodeName, LogStats>,
    uptime: Duration,
    options: &RenderOptions,
) -> std::fmt::Result {
    let total = report.matrix.total;
    writeln!(out, "Mesh Status ({} nodes){:>width$}", total, format_uptime(uptime), width = 40)?;
    writeln!(out, "{}", "=".repeat(RULE_WIDTH))?;

    // Identities
    writeln!(out)?;
    writeln!(out, "   {:<10} {:<9} {:<24} {:<8} Log Lines", "Node", "Type", "Own Peer ID", "Log Age")?;
    writeln!(out, "{}", "-".repeat(RULE_WIDTH))?;
    for node in &report.nodes {
        let stats = logs.get(&node.node).copied().unwrap_or_default();
        let id = node
            .identity
            .as_ref()
            .map(|r| r.id.short())
            .unwrap_or_else(|| "not detected".to_string());
        let age = match (stats.present, stats.age) {
            (false, _) => "no log".to_string(),
            (true, Some(age)) => format_age(age),
            (true, None) => "?".to_string(),
        };
        let marker = if node.identity.is_some() { "ok" } else { ".." };
        writeln!(
            out,
            "{} {:<10} {:<9} {:<24} {:<8} {}",
            marker, node.node, node.role, id, age, stats.lines
        )?;
    }

    // Visibility matrix
    writeln!(out)?;
    writeln!(out, "  Visibility Matrix (target: {} peers each, * = connected, ? = unresolved):", total.saturating_sub(1))?;
    writeln!(out, "   {:<10} {:<24} {:<22} Missing", "Node", "Sees Full", "Sees Headless")?;
    writeln!(out, "{}", "-".repeat(RULE_WIDTH))?;
    for row in &report.matrix.rows {
        writeln!(
            out,
            "{} {:<10} {:<24} {:<22} {}",
            health_marker(row.health()),
            row.node,
            seen_column(row, NodeRole::Full),
            seen_column(row, NodeRole::Headless),
            missing_column(row)
        )?;
    }

    // Event counts
    writeln!(out)?;
    writeln!(out, "  Event Counts (since log start):")?;
    writeln!(out, "   {:<10} {:>9} {:>8} {:>6} {:>6}  Notable", "Node", "Connects", "Errors", "Sent", "Recv")?;
    writeln!(out, "{}", "-".repeat(RULE_WIDTH))?;
    for node in &report.nodes {
        let notable = if node.recent_errors > options.error_threshold {
            format!("{} recent errors", node.recent_errors)
        } else {
            String::new()
        };
        writeln!(
            out,
            "   {:<10} {:>9} {:>8} {:>6} {:>6}  {}",
            node.node, node.events.connects, node.events.errors, node.events.sent, node.events.received, notable
        )?;
    }

    // External peers
    if report.stray_total() > 0 {
        writeln!(out)?;
        writeln!(out, "  External peers detected (network health proxy):")?;
        for node in report.nodes.iter().filter(|n| !n.strays.is_empty()) {
            writeln!(out, "   {}: {} external peers", node.node, node.strays.len())?;
        }
    }

    for conflict in &report.conflicts {
        let nodes: Vec<_> = conflict.nodes.iter().map(NodeName::as_str).collect();
        writeln!(out, "  Identity conflict: {} claimed by {}", conflict.id.short(), nodes.join(", "))?;
    }

    writeln!(out)?;
    match report.status {
        MeshStatus::FullMesh => writeln!(out, "  FULL MESH: all nodes visible to all peers")?,
        MeshStatus::AwaitingIdentities { unresolved } => {
            writeln!(out, "  Waiting for {} node(s) to identify themselves...", unresolved)?
        }
        MeshStatus::Partial { gaps } => {
            writeln!(out, "  Partial mesh: {} visibility gaps remaining", gaps)?
        }
    }

    Ok(())
}

/// One JSON line per refresh.
#[derive(Debug, Serialize)]
pub struct JsonFrame<'a> {
    pub uptime_secs: u64,
    pub report: &'a MeshReport,
    pub logs: &'a BTreeMap<NodeName, LogStats>,
}
