//! CLI binary for scry.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use scry::image_search::{
    build_engines, render_results, EngineContext, ImageSearch, SearchInput, SearchRequest,
};
use scry::link_preview::{LinkPreviewer, PreviewContext};
use scry::{http, logging, scry_dirs, ConfigSource, FileCache, JsonRenderer, RemoteRenderer, ScryConfig};
use scry_core::{Quality, RenderOptions, Renderer};
use tracing::info;

/// Scry: reverse image search and link previews rendered as images.
#[derive(Parser)]
#[command(name = "scry", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter, e.g. `scry=debug`. Defaults to `RUST_LOG`.
    #[arg(long)]
    log: Option<String>,

    /// Also write daily log files to the logs directory.
    #[arg(long)]
    log_file: bool,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Command,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Reverse search an image and render the merged results.
    Search {
        /// Image file to search for.
        image: PathBuf,

        /// Engine key (`saucenao`, `iqdb`, `tracemoe`, `fluffle`) or `all`.
        #[arg(short, long)]
        engine: Option<String>,

        /// Minimum similarity for unconfirmed results.
        #[arg(short, long)]
        similarity: Option<f64>,

        /// Maximum number of results.
        #[arg(short = 'c', long)]
        count: Option<usize>,

        /// Output file for the rendered results.
        #[arg(short, long, default_value = "search.jpg")]
        output: PathBuf,

        /// Print the render document as JSON instead of rendering.
        #[arg(long)]
        dry_run: bool,
    },

    /// Render a preview card for a supported link.
    Preview {
        /// Post link.
        link: String,

        /// Output file for the rendered preview.
        #[arg(short, long, default_value = "preview.jpg")]
        output: PathBuf,

        /// Print the render document as JSON instead of rendering.
        #[arg(long)]
        dry_run: bool,
    },

    /// List previewable links found in text.
    Links {
        /// Text to scan.
        text: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let log_dir = cli.log_file.then(scry_dirs::logs_dir);
    let _guard = logging::init(cli.log.as_deref(), log_dir.as_deref());

    let source = match cli.config {
        Some(ref path) => ConfigSource::new(path),
        None => ConfigSource::default(),
    };
    let config = source
        .load()
        .with_context(|| format!("loading {}", source.path().display()))?;

    match cli.command {
        Command::Search {
            image,
            engine,
            similarity,
            count,
            output,
            dry_run,
        } => {
            let request = SearchRequest {
                engine,
                min_similarity: similarity,
                max_count: count,
            };
            run_search(config, &image, &request, &output, dry_run).await
        }
        Command::Preview {
            link,
            output,
            dry_run,
        } => run_preview(config, &link, &output, dry_run).await,
        Command::Links { text } => list_links(&text.join(" ")),
    }
}

fn renderer(config: &ScryConfig, client: &reqwest::Client, dry_run: bool) -> Box<dyn Renderer> {
    if dry_run {
        Box::new(JsonRenderer)
    } else {
        Box::new(RemoteRenderer::new(client.clone(), &config.render))
    }
}

async fn emit(bytes: &[u8], output: &Path, dry_run: bool) -> anyhow::Result<()> {
    if dry_run {
        println!("{}", String::from_utf8_lossy(bytes));
        return Ok(());
    }
    tokio::fs::write(output, bytes)
        .await
        .with_context(|| format!("writing {}", output.display()))?;
    println!("{}", output.display());
    Ok(())
}

async fn run_search(
    config: ScryConfig,
    image: &Path,
    request: &SearchRequest,
    output: &Path,
    dry_run: bool,
) -> anyhow::Result<()> {
    let started_at = chrono::Local::now();
    let client = http::build_client(&config.http)?;
    let input = SearchInput::from_path(image).await?;

    let previewer = LinkPreviewer::new()?;
    let search = ImageSearch::new(build_engines(), previewer.patterns().clone());
    let ctx = EngineContext {
        client: client.clone(),
        config: config.image_search.clone(),
        scratch_dir: scry_dirs::scratch_dir(),
    };

    let merged = match search.search(input, request, ctx).await {
        Ok(merged) => merged,
        Err(e) if e.is_not_implemented() => {
            eprintln!("{e}");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    info!(results = merged.results().len(), "search finished");

    let mut options = RenderOptions::new(started_at);
    options.width = config.render.width;
    options.scale = config.render.scale;
    options.quality = Quality::Fixed(config.render.quality);

    let renderer = renderer(&config, &client, dry_run);
    match render_results(merged, renderer.as_ref(), &options).await? {
        Some(bytes) => emit(&bytes, output, dry_run).await,
        None => {
            println!("no results found");
            Ok(())
        }
    }
}

async fn run_preview(config: ScryConfig, link: &str, output: &Path, dry_run: bool) -> anyhow::Result<()> {
    let client = http::build_client(&config.http)?;
    let previewer = LinkPreviewer::new()?;
    let ctx = Arc::new(PreviewContext {
        client: client.clone(),
        cache: FileCache::new(scry_dirs::preview_cache_dir()),
        config: config.link_preview.clone(),
    });

    let outcome = match previewer.preview(link, ctx) {
        Ok(task) => task.execute().await,
        Err(e) => Err(e),
    };
    let preview = match outcome {
        Ok(preview) => preview,
        Err(e) if e.is_skip() => {
            info!(link, reason = %e, "preview skipped");
            return Ok(());
        }
        Err(e) if e.is_not_implemented() => {
            eprintln!("no preview available for {link}");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let renderer = renderer(&config, &client, dry_run);
    let card = preview.render_card(renderer.as_ref(), &config.render).await?;
    emit(&card.image, output, dry_run).await?;
    for media in &card.extra_media {
        println!("{media}");
    }
    Ok(())
}

fn list_links(text: &str) -> anyhow::Result<()> {
    let previewer = LinkPreviewer::new()?;
    for link in previewer.extract(text) {
        println!("{link}");
    }
    Ok(())
}
