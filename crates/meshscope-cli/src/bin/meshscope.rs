//! Meshscope binary
//!
//! Watch a test mesh's logs and print its visibility matrix until it converges.

use clap::Parser;
use meshscope_cli::{Cli, Watcher};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout belongs to the table.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meshscope=info,meshscope_core=info,meshscope_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let setup = cli.load()?;
    tracing::info!(log_dir = %cli.log_dir.display(), nodes = setup.roster.len(), "starting meshscope");

    let mut watcher = Watcher::new(setup, cli.render_options());
    let report = watcher.run(cli.interval(), cli.once).await?;

    if report.full_mesh {
        tracing::info!("mesh converged");
    }
    Ok(())
}
