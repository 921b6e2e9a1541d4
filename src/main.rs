use anyhow::Result;
use auto_shorts::app::{self, Args};
use clap::Parser;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let code = app::run(Args::parse(), false).await?;
    std::process::exit(code);
}
