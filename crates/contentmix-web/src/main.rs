use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use contentmix_web::ServerError;
use tracing_subscriber::EnvFilter;

/// Serve merged content from the configured provider mix.
#[derive(Debug, Parser)]
#[command(name = "contentmix", version, about)]
struct Cli {
    /// Path to a JSON config file (defaults to $CONTENTMIX_CONFIG, then built-in mix).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address, overriding config and $CONTENTMIX_BIND.
    #[arg(long)]
    bind: Option<String>,

    /// Log filter directive, e.g. `info` or `contentmix_core=debug`.
    #[arg(long)]
    log: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log.as_deref());

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(error.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<(), ServerError> {
    let config = contentmix_web::load_config(cli.config.as_deref(), cli.bind.as_deref())?;
    contentmix_web::serve(config).await
}

fn init_tracing(directive: Option<&str>) {
    let filter = directive
        .map(EnvFilter::new)
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
