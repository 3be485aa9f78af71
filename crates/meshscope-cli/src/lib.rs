//! Meshscope Watcher
//!
//! Live terminal view of a small test mesh, driven by the nodes' log files.
//!
//! # Architecture
//!
//! - **Tail**: reads only what each log gained since the last refresh
//! - **Watch**: feeds every node's text to the monitor, once per interval
//! - **Render**: identity table, visibility matrix, event counts, verdict
//!
//! # Usage
//!
//! ```ignore
//! let cli = Cli::parse();
//! let mut watcher = Watcher::new(cli.load()?, cli.render_options());
//! watcher.run(cli.interval(), cli.once).await?;
//! ```

mod config;
mod render;
mod tail;
mod watch;

pub use config::{Cli, WatchFile, WatchSetup};
pub use render::{format_age, render_table, JsonFrame, LogStats, RenderOptions, CLEAR_SCREEN};
pub use tail::LogTail;
pub use watch::Watcher;
