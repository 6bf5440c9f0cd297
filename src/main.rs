//! calibre-lens CLI entrypoint

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use calibre_lens::cli::{Cli, Report};

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr; stdout carries the JSON report
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    // Parse and execute CLI
    let cli = Cli::parse();
    match cli.execute().await {
        Ok(report) => {
            println!("{}", report.render());
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{:#}", e);
            println!("{}", Report::failure(&e).render());
            ExitCode::FAILURE
        }
    }
}
