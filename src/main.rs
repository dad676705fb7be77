mod cli;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    let default_directive = if args.verbose {
        "squish=debug"
    } else {
        "squish=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(default_directive.parse()?))
        .with_writer(std::io::stderr)
        .init();

    match cli::run(args).await {
        Ok(()) => {
            // Exit explicitly: a pending stdin read would otherwise keep the runtime alive.
            std::process::exit(0);
        }
        Err(e) => Err(e),
    }
}
