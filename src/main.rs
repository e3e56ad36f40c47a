use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use murmur::app::AppContext;
use murmur::cli::commands::{self, ScrapeArgs};
use murmur::cli::{Cli, Commands, PatternAction};
use murmur::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays clean for JSON output
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = match cli.config {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let ctx = AppContext::new(config)?;

    match cli.command {
        Commands::Scrape {
            urls,
            urls_file,
            max_comments,
            deadline_secs,
            concurrency,
        } => {
            let urls = commands::collect_urls(urls, urls_file.as_deref())?;

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Interrupted, finishing with what was collected");
                    on_signal.cancel();
                }
            });

            let args = ScrapeArgs {
                max_comments,
                deadline_secs,
                concurrency,
            };
            let reports = commands::scrape(&ctx, urls, args, cancel).await?;
            println!("{}", commands::reports_to_json(&reports)?);
        }
        Commands::Patterns { action } => match action {
            PatternAction::List { shape } => {
                commands::list_patterns(&ctx, shape.as_deref())?;
            }
            PatternAction::Forget { shape } => {
                commands::forget_shape(&ctx, &shape)?;
            }
        },
        Commands::Shape { url } => {
            commands::print_shape(&ctx, &url).await?;
        }
    }

    Ok(())
}
