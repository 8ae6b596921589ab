use clap::Parser;
use plantree::cli::commands::Cli;
use plantree::cli::handlers;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    let cli = Cli::parse();

    let loaded = match handlers::load_cli_config(cli.project_dir.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    };

    // Logs go to stderr so --json output on stdout stays parseable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| loaded.config.log.filter.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = handlers::dispatch(cli, loaded) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
