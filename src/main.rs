use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info, warn};
use tracing_subscriber::EnvFilter;

use photo_screensaver::cache::ImageCache;
use photo_screensaver::cascade::{SourceCascade, no_photos_guidance};
use photo_screensaver::config::Configuration;
use photo_screensaver::events::Displayed;
use photo_screensaver::sources::{PhotoLibrary, StructuredLibrarySource, UnavailableLibrary};
use photo_screensaver::tasks::{loader::ImageLoader, slideshow};

#[derive(Debug, Parser)]
#[command(
    name = "photo-screensaver",
    version,
    about = "Find local photos and cycle through them"
)]
struct Args {
    /// Path to YAML config (defaults apply when omitted)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Ask for photo library access before scanning
    #[arg(long = "request-access")]
    request_access: bool,
    /// Resolve photos, print what was found and exit
    #[arg(long = "dry-run")]
    dry_run: bool,
    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) {
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let level = match verbosity {
        0 => None,
        1 => Some(Level::DEBUG),
        _ => Some(Level::TRACE),
    };
    if let Some(level) = level
        && let Ok(directive) = format!("photo_screensaver={level}").parse()
    {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let Args {
        config,
        request_access,
        dry_run,
        verbose,
    } = Args::parse();
    init_tracing(verbose);

    let cfg = match &config {
        Some(path) => Configuration::from_yaml_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Configuration::default(),
    }
    .validated()
    .context("invalid configuration values")?;
    let home = cfg.resolve_home()?;
    info!(home = %home.display(), "configuration ready");

    let library: Arc<dyn PhotoLibrary> = Arc::new(UnavailableLibrary);
    if request_access {
        let granted = StructuredLibrarySource::new(Arc::clone(&library)).request_access();
        info!(granted, "photo library access");
    }

    let cascade = Arc::new(SourceCascade::from_config(&cfg, home, Arc::clone(&library)));
    let photos = cascade.resolve_off_thread().await;

    if !photos.has_photos() {
        println!("{}", no_photos_guidance());
        return Ok(());
    }

    if dry_run {
        println!("{} photos from {}", photos.count(), photos.source());
        for id in photos.identifiers() {
            println!("{id}");
        }
        return Ok(());
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!("ctrl-c handler failed: {err}");
                return;
            }
            info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    let (displayed_tx, mut displayed_rx) = mpsc::channel::<Displayed>(2);
    let viewer = tokio::spawn(async move {
        while let Some(shown) = displayed_rx.recv().await {
            info!(
                index = shown.index,
                id = %shown.identifier,
                w = shown.image.width(),
                h = shown.image.height(),
                "displaying"
            );
        }
    });

    let loader = ImageLoader::new(Arc::new(ImageCache::new(cfg.cache))).with_library(library);
    slideshow::run(
        photos,
        loader,
        cfg.display.target_size(),
        cfg.slideshow.options(),
        displayed_tx,
        cancel,
    )
    .await
    .context("slideshow task failed")?;

    viewer.await.context("viewer task failed")?;
    Ok(())
}
