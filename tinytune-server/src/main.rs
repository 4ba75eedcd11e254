use std::fs::File;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use bytesize::ByteSize;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tinytune_config::{Args, Config};
use tinytune_core::catalog::filter;
use tinytune_core::{scan, Builder, Catalog, Previewer, PreviewerOptions};
use tinytune_server::{routes, AppState};

/// Catalog file kept at the library root, hidden from its own crawl.
const INDEX_FILE_NAME: &str = "index.tinytune";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tinytune=info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_args(Args::parse())?;
    config.log_summary();

    let cancel = CancellationToken::new();
    watch_shutdown_signals(cancel.clone());

    let catalog = Arc::new(build_catalog(&config, &cancel).await?);
    serve(catalog, config, cancel).await
}

async fn build_catalog(config: &Config, cancel: &CancellationToken) -> Result<Catalog> {
    let index_path = config.data_dir.join(INDEX_FILE_NAME);
    let files = scan(&config.data_dir, std::slice::from_ref(&index_path))
        .context("failed to scan the data directory")?;
    info!(files = files.len(), "scan finished");

    let excluded = filter::excluded_files(
        &files,
        &config.process.includes,
        &config.process.excludes,
    );
    if !excluded.is_empty() {
        info!(count = excluded.len(), "files excluded from previews");
    }

    let previewer = Previewer::new(PreviewerOptions {
        image_enabled: config.process.image.process,
        video_enabled: config.process.video.process,
        acceleration: config.process.acceleration,
        excluded,
        max_images: config.process.image.max_items,
        max_videos: config.process.video.max_items,
        max_file_size: config.process.max_file_size,
        timeout: config.process.timeout,
    })
    .await
    .context("preview tooling probe failed")?;

    let bar = ProgressBar::new(files.len() as u64);
    if let Ok(style) = ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}") {
        bar.set_style(style);
    }
    let progress = bar.clone();
    let new_files = Arc::new(AtomicUsize::new(0));
    let new_files_counter = new_files.clone();

    let catalog = Builder::new()
        .previewer(Arc::new(previewer))
        .workers(config.process.parallel)
        .remove_stale(config.remove_stale)
        .on_progress(move || progress.inc(1))
        .on_new_file(move || {
            new_files_counter.fetch_add(1, Ordering::Relaxed);
        })
        .build(File::open(&index_path).ok(), files, cancel)
        .await
        .context("index build failed")?;
    bar.finish_and_clear();

    let stat = catalog.stat();
    info!(
        entries = stat.entries,
        new = new_files.load(Ordering::Relaxed),
        previews = stat.with_preview,
        preview_bytes = %ByteSize::b(stat.preview_bytes),
        "index ready"
    );

    if catalog.is_dirty() && config.index_save {
        let mut out = File::create(&index_path)
            .with_context(|| format!("failed to create {}", index_path.display()))?;
        let written = catalog
            .encode(&mut out)
            .context("failed to write the catalog file")?;
        info!(size = %ByteSize::b(written), path = %index_path.display(), "index saved");
    }

    Ok(catalog)
}

async fn serve(catalog: Arc<Catalog>, config: Config, cancel: CancellationToken) -> Result<()> {
    let state = AppState::new(catalog, config.streaming);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "listening");

    axum::serve(listener, routes::router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .context("server failed")?;
    info!("shut down cleanly");
    Ok(())
}

/// Cancel the root token on SIGINT or SIGTERM; both the index build and
/// the HTTP server watch it.
fn watch_shutdown_signals(cancel: CancellationToken) {
    tokio::spawn(async move {
        let interrupted = async {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};
                match signal(SignalKind::terminate()) {
                    Ok(mut terminate) => {
                        tokio::select! {
                            _ = tokio::signal::ctrl_c() => {}
                            _ = terminate.recv() => {}
                        }
                    }
                    Err(error) => {
                        warn!(%error, "failed to install SIGTERM handler");
                        let _ = tokio::signal::ctrl_c().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                let _ = tokio::signal::ctrl_c().await;
            }
        };
        interrupted.await;
        info!("shutdown signal received");
        cancel.cancel();
    });
}
