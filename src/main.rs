use anyhow::Result;
use study_buddy::cli;

#[tokio::main]
async fn main() -> Result<()> {
    cli::run().await
}
