use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wiki_harvest::api::{self, AppState};
use wiki_harvest::crawlers::{PageRenderer, WebDriverRenderer};
use wiki_harvest::{Crawl, RunStatus};

mod args;
use args::{Args, Command, CrawlArgs, ServeArgs};

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::init();

    // Parse command-line arguments
    let args = Args::parse();

    let result = match args.command {
        Command::Crawl(args) => crawl(args).await,
        Command::Serve(args) => serve(args).await,
    };

    if let Err(e) = result {
        ::log::error!("{}", e);
        std::process::exit(1);
    }
}

async fn crawl(args: CrawlArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.into_config()?;

    println!("Note: crawling requires a WebDriver server (e.g., ChromeDriver).");
    println!(
        "Set WEBDRIVER_URL or --webdriver-url if not using {}",
        config.webdriver_url
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ::log::info!("Interrupted, finishing in-flight pages");
            on_signal.cancel();
        }
    });

    let summary = Crawl::with_config(config).with_cancel(cancel).run().await?;

    println!(
        "Crawl {}: {} records saved, {} characters skipped, {} character pages visited",
        summary.status,
        summary.progress.items_saved(),
        summary.progress.characters_dropped,
        summary.visited
    );

    if summary.status == RunStatus::Failed {
        return Err("no seed page could be fetched".into());
    }
    Ok(())
}

async fn serve(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.into_config()?;

    let renderer: Arc<dyn PageRenderer> = Arc::new(WebDriverRenderer::new(&config.crawl));
    let state = Arc::new(AppState::new(config, Arc::clone(&renderer)));

    let on_signal = Arc::clone(&state);
    let shutdown = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            ::log::error!("Unable to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        ::log::info!("Shutting down control API");
        on_signal.registry.stop().await;
    };

    let served = api::serve(Arc::clone(&state), shutdown).await;
    state.drain_runs().await;
    renderer.shutdown().await;
    served?;
    Ok(())
}
