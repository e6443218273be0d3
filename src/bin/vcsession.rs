use anyhow::{Context, Result};
use rustls::crypto::ring;
use vcsession::cli::{actions, actions::Action, start};

// Main function
#[tokio::main]
async fn main() -> Result<()> {
    ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))
        .context("TLS crypto provider initialization failed")?;

    // Start the program
    let action = start()?;

    // Handle the action
    match action {
        Action::Probe { .. } => actions::probe::handle(action).await?,
    }

    Ok(())
}
