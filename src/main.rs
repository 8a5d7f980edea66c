use anyhow::Result;
use taf::cli;

fn main() -> Result<()> {
    cli::handle_calls()
}
