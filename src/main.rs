mod app;

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use hyperlens::config::Settings;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use app::GraphSource;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Graph envelope to open. A generated demo graph is shown when omitted.
    #[arg(long)]
    graph: Option<PathBuf>,

    /// JSON settings file with layout, culling, cache and playback options.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Overrides the cache's initial page and batch size.
    #[arg(long)]
    page_size: Option<usize>,

    /// Node count of the generated demo graph.
    #[arg(long, default_value_t = 400)]
    demo_nodes: usize,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hyperlens=debug"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut settings = Settings::load(args.settings.as_deref())?;
    if let Some(page_size) = args.page_size {
        settings.cache.initial_limit = page_size.max(1);
        settings.cache.batch_size = page_size.max(1);
    }

    let source = match args.graph {
        Some(path) => GraphSource::File(path),
        None => GraphSource::Demo {
            nodes: args.demo_nodes.max(3),
        },
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("hyperlens-io")
        .enable_time()
        .build()
        .context("failed to start async runtime")?;

    let options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default().with_inner_size([1440.0, 920.0]),
        ..Default::default()
    };

    eframe::run_native(
        "hyperlens",
        options,
        Box::new(move |cc| Ok(Box::new(app::HyperlensApp::new(cc, runtime, source, settings)))),
    )
    .map_err(|error| anyhow!("viewer exited with an error: {error}"))
}
