mod cli;
mod cloudwatch;
mod container;
mod helpers;
mod instrumentation;
mod parser;
mod runtime;
mod shipper;
mod tailer;

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    instrumentation::tracing::init_tracing();
    instrumentation::tracing::init_panic_handler();

    // Main entrypoint simply delegates control to CLI layer.
    // The CLI parses user commands and then calls into the appropriate logic
    cli::cli::run().await
}
