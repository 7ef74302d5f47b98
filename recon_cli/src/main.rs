use anyhow::Result;
use clap::Parser;

mod commands;
mod render;

use commands::ReconApp;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let app = ReconApp::parse();

    app.run().await?;

    Ok(())
}
