use anyhow::Result;
use waitlist::cli::build_cli;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();
    waitlist::cli::handlers::dispatch(&matches).await
}
