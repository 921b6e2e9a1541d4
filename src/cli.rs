use anyhow::Result;
use auto_shorts::app::{self, Args};
use clap::Parser;

// CI entry point: always one cycle. Exit 0 published, 1 failed, 2 invalid credentials.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let code = app::run(Args::parse(), true).await?;
    std::process::exit(code);
}
