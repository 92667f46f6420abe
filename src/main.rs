mod api;
mod cli;
mod form;
mod model;
mod orchestrator;
mod render;
mod text_summary;
#[cfg(feature = "tui")]
mod tui;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    cli::init_logging(&args);
    let is_non_tui = args.is_one_shot();

    match cli::run(args).await {
        Ok(()) => {
            // Explicitly exit with code 0 on success, especially for non-TUI modes
            if is_non_tui {
                std::process::exit(0);
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "exiting with error");
            Err(e)
        }
    }
}
