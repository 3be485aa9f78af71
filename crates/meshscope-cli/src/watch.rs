//! Refresh loop: tail every log, feed the monitor, print a report.

use std::collections::BTreeMap;
use std::io::Write;
use std::time::{Duration, Instant, SystemTime};

use meshscope_core::{MeshMonitor, MeshReport, NodeName};
use tokio::time::MissedTickBehavior;

use crate::config::WatchSetup;
use crate::render::{render_table, JsonFrame, LogStats, RenderOptions, CLEAR_SCREEN};
use crate::tail::LogTail;

/// One node's log and the tail generation the monitor last scanned.
#[derive(Debug)]
struct NodeTail {
    name: NodeName,
    tail: LogTail,
    generation: u64,
}

/// Owns the monitor and one tail per node.
#[derive(Debug)]
pub struct Watcher {
    monitor: MeshMonitor,
    tails: Vec<NodeTail>,
    options: RenderOptions,
    started: Instant,
}

impl Watcher {
    pub fn new(setup: WatchSetup, options: RenderOptions) -> Self {
        let tails = setup
            .logs
            .into_iter()
            .map(|(name, path)| NodeTail {
                name,
                tail: LogTail::new(path),
                generation: 0,
            })
            .collect();
        let monitor = MeshMonitor::new(setup.roster)
            .with_resolver(setup.resolver)
            .with_event_patterns(setup.patterns)
            .with_recent_window(setup.recent_window);

        Self {
            monitor,
            tails,
            options,
            started: Instant::now(),
        }
    }

    pub fn monitor(&self) -> &MeshMonitor {
        &self.monitor
    }

    /// One refresh: poll every tail, observe every node, then report.
    ///
    /// A log that cannot be read keeps the text it had; the failure is
    /// logged and the cycle carries on with the other nodes.
    pub async fn cycle(&mut self) -> MeshReport {
        let start = Instant::now();
        for NodeTail { name, tail, generation } in &mut self.tails {
            if let Err(e) = tail.poll().await {
                tracing::warn!(node = %name, path = %tail.path().display(), error = %e, "failed to read log");
            }
            if tail.generation() != *generation {
                if let Err(e) = self.monitor.rescan(name) {
                    tracing::warn!(node = %name, error = %e, "rescan failed");
                }
                *generation = tail.generation();
            }
            match self.monitor.observe(name, tail.text()) {
                Ok(update) => {
                    if update.scan.rescanned {
                        tracing::debug!(node = %name, "visibility rescanned");
                    }
                }
                Err(e) => tracing::warn!(node = %name, error = %e, "observe failed"),
            }
        }

        let report = self.monitor.report();
        tracing::debug!(
            status = ?report.status,
            resolved = report.matrix.resolved,
            gaps = report.matrix.gap_count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "cycle complete"
        );
        report
    }

    pub fn log_stats(&self) -> BTreeMap<NodeName, LogStats> {
        let now = SystemTime::now();
        self.tails
            .iter()
            .map(|t| {
                let stats = LogStats {
                    present: t.tail.is_present(),
                    lines: t.tail.line_count(),
                    age: t.tail.age(now),
                };
                (t.name.clone(), stats)
            })
            .collect()
    }

    /// Format `report` the way the options ask for.
    pub fn frame(&self, report: &MeshReport) -> anyhow::Result<String> {
        let logs = self.log_stats();
        let uptime = self.started.elapsed();

        if self.options.json {
            let frame = JsonFrame {
                uptime_secs: uptime.as_secs(),
                report,
                logs: &logs,
            };
            let mut line = serde_json::to_string(&frame)?;
            line.push('\n');
            return Ok(line);
        }

        let table = render_table(report, &logs, uptime, &self.options);
        if self.options.clear_screen {
            Ok(format!("{CLEAR_SCREEN}{table}"))
        } else {
            Ok(table)
        }
    }

    fn emit(&self, report: &MeshReport) -> anyhow::Result<()> {
        let frame = self.frame(report)?;
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(frame.as_bytes())?;
        stdout.flush()?;
        Ok(())
    }

    /// Refresh every `interval` until interrupted, or once when `once` is set.
    ///
    /// Returns the last report.
    pub async fn run(&mut self, interval: Duration, once: bool) -> anyhow::Result<MeshReport> {
        tracing::info!(
            nodes = self.tails.len(),
            interval_secs = interval.as_secs(),
            "watching mesh logs"
        );

        if once {
            let report = self.cycle().await;
            self.emit(&report)?;
            return Ok(report);
        }

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last = self.monitor.report();
        let mut was_full = false;
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.cycle().await;
                    if report.full_mesh && !was_full {
                        tracing::info!(elapsed_secs = self.started.elapsed().as_secs(), "full mesh reached");
                    }
                    was_full = report.full_mesh;
                    self.emit(&report)?;
                    last = report;
                }
                _ = &mut ctrl_c => {
                    tracing::info!("interrupted, stopping");
                    break;
                }
            }
        }

        Ok(last)
    }
}
