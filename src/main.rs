use std::path::PathBuf;

use clap::Parser;

use gallery_engine::app::{GalleryApp, RunOptions};
use gallery_engine::GalleryConfig;

/// Loads, ranks and lists the gallery from the configured sources.
#[derive(Debug, Parser)]
#[command(name = "gallery", version, about)]
struct Args {
    /// Config file (defaults to the XDG config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// SQLite record store (defaults to the XDG data dir)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Collections manifest, overriding the config
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Curated manifest, overriding the config
    #[arg(long)]
    curated: Option<PathBuf>,

    /// Show this owner's library instead of the public feed
    #[arg(long)]
    owner: Option<String>,

    /// Free-text filter
    #[arg(short, long)]
    query: Option<String>,

    /// Extra pages to load past the first window
    #[arg(long, default_value_t = 0)]
    pages: usize,

    /// Fetch engagement counts for the visible window
    #[arg(long)]
    counts: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gallery_engine=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let mut config = GalleryConfig::load(args.config.as_deref())?;
    if let Some(path) = args.manifest {
        config.sources.manifest_path = Some(path);
    }
    if let Some(path) = args.curated {
        config.sources.curated_manifest_path = Some(path);
    }

    let options = RunOptions {
        db: args.db,
        owner: args.owner,
        query: args.query,
        pages: args.pages,
        with_counts: args.counts,
    };
    GalleryApp::new(config, options).run().await
}
