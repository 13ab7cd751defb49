use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};

use pixel_queue::config::Config;
use pixel_queue::error::AppError;
use pixel_queue::grid::frame::gen_unique_frame_id;
use pixel_queue::grid::import::{collect_uploads, import_uploads, ImportError, Upload};
use pixel_queue::state::collection::LoadOutcome;
use pixel_queue::state::data::FrameMap;
use pixel_queue::state::legacy::LegacyDocuments;
use pixel_queue::state::library::Library;
use pixel_queue::{RepeatCount, SamplingMode, Workspace};

#[derive(Parser, Debug)]
#[command(name = "pixel-queue", version, about = "16×16 pixel animation queue")]
struct Cli {
    /// Use this config file instead of the per-user one
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import images and GIFs as one new animation at the front of the queue
    Import(ImportArgs),
    /// Show the active queue
    List,
    /// Show saved animations that are not queued
    Catalog,
    /// Move a saved animation from the catalog into the queue
    QueueAdd { animation_id: String },
    /// Take an animation out of the queue (it stays in the catalog)
    Remove { animation_id: String },
    /// Archive a saved animation so it no longer shows anywhere
    Archive { animation_id: String },
    /// Move the animation at one queue position to another
    Move { from: usize, to: usize },
    /// Write the queue as order.json and animations.json
    ExportLegacy { out: PathBuf },
    /// Add animations from an order.json / animations.json pair
    ImportLegacy { dir: PathBuf },
}

#[derive(Parser, Debug)]
struct ImportArgs {
    /// Image or GIF files, imported in the order given
    paths: Vec<PathBuf>,

    /// Also import every supported image under this folder
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Resampling technique (nearest or bilinear)
    #[arg(long)]
    technique: Option<SamplingMode>,

    /// Frame duration in milliseconds, overriding the GIF delay
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    duration: Option<u32>,

    /// Positive repeat count or "infinite"
    #[arg(long)]
    repeat: Option<RepeatCount>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {}", e);
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config.log_level);

    match run(cli.cmd, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            warn!(kind = ?e.kind(), "command failed");
            eprintln!("❌ {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Initialize logging; `RUST_LOG` wins over the configured level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("pixel_queue={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cmd: Command, config: &Config) -> Result<(), AppError> {
    match cmd {
        Command::Import(args) => cmd_import(args, config).await,
        Command::List => cmd_list(config).await,
        Command::Catalog => cmd_catalog(config),
        Command::QueueAdd { animation_id } => {
            let mut ws = open_loaded(config).await?;
            ws.refresh_catalog()?;
            ws.ensure_frames_loaded(std::slice::from_ref(&animation_id))?;
            if ws.add_catalog_animation(&animation_id)? {
                ws.save()?;
                println!("➕ Queued {}", animation_id);
            } else {
                println!("{} is already queued", animation_id);
            }
            Ok(())
        }
        Command::Remove { animation_id } => {
            let mut ws = open_loaded(config).await?;
            match ws.collection_mut().remove_animation(&animation_id) {
                Some(_) => {
                    ws.save()?;
                    println!("➖ Removed {} from the queue", animation_id);
                }
                None => println!("{} is not queued", animation_id),
            }
            Ok(())
        }
        Command::Archive { animation_id } => {
            let mut ws = open_loaded(config).await?;
            let was_queued = ws.collection().contains(&animation_id);
            ws.archive_animation(&animation_id)?;
            if was_queued {
                ws.save()?;
            }
            println!("🗄️  Archived {}", animation_id);
            Ok(())
        }
        Command::Move { from, to } => {
            let mut ws = open_loaded(config).await?;
            ws.collection_mut().move_animation(from, to)?;
            ws.save()?;
            println!("↕️  Moved position {} to {}", from, to);
            Ok(())
        }
        Command::ExportLegacy { out } => {
            let ws = open_loaded(config).await?;
            let docs = LegacyDocuments::export(ws.collection())?;
            docs.write_dir(&out)?;
            println!("📝 Exported {} animations to {}", docs.order.len(), out.display());
            Ok(())
        }
        Command::ImportLegacy { dir } => cmd_import_legacy(&dir, config).await,
    }
}

/// Open the library, load the queue and fetch every animation's frames
async fn open_loaded(config: &Config) -> Result<Workspace<Library>, AppError> {
    let mut ws = Workspace::new(Library::open(&config.database_path)?);
    ws.load()?;

    let db_path = config.database_path.clone();
    let outcomes = ws.prefetch_concurrent(move || Library::open(&db_path)).await;
    for (animation_id, outcome) in &outcomes {
        if *outcome == LoadOutcome::Failed {
            if let Some(status) = ws.collection().status(animation_id) {
                warn!(%animation_id, %status, "frames did not load");
            }
        }
    }
    Ok(ws)
}

async fn cmd_import(args: ImportArgs, config: &Config) -> Result<(), AppError> {
    let mut uploads = args
        .paths
        .iter()
        .map(|path| Upload::read(path))
        .collect::<Result<Vec<_>, _>>()?;
    if let Some(dir) = &args.dir {
        uploads.extend(collect_uploads(dir)?);
    }
    if uploads.is_empty() {
        return Err(ImportError::Empty.into());
    }

    let mut ws = open_loaded(config).await?;
    let imported = import_uploads(&uploads, &config.import_options(), ws.collection().frames())?;

    let animation_id = gen_unique_frame_id(config.frame_id_length, |id| ws.collection().contains(id))?;
    let technique = args.technique.unwrap_or(config.sampling);
    let repeat = args.repeat.unwrap_or(config.default_repeat);
    let (mut metadata, frames) = imported.into_animation(animation_id.clone(), technique, repeat);
    if let Some(duration) = args.duration {
        metadata.frame_duration_ms = duration;
    }

    let frame_count = metadata.frame_order.len();
    ws.collection_mut().add_animation(metadata, frames)?;
    ws.save()?;

    info!(%animation_id, frames = frame_count, %technique, "animation imported");
    println!("✅ Imported {} ({} frames, {})", animation_id, frame_count, technique);
    Ok(())
}

async fn cmd_list(config: &Config) -> Result<(), AppError> {
    let ws = open_loaded(config).await?;
    let collection = ws.collection();
    if collection.is_empty() {
        println!("Queue is empty.");
        return Ok(());
    }

    for (position, metadata) in collection.iter().enumerate() {
        let status = collection
            .status(&metadata.animation_id)
            .map(ToString::to_string)
            .unwrap_or_default();
        println!(
            "{:>3}  {}  {} frames  {} ms  repeat {}  [{}]",
            position,
            metadata.animation_id,
            metadata.frame_order.len(),
            metadata.frame_duration_ms,
            metadata.repeat,
            status
        );
    }
    Ok(())
}

fn cmd_catalog(config: &Config) -> Result<(), AppError> {
    let mut ws = Workspace::new(Library::open(&config.database_path)?);
    ws.load()?;
    let count = ws.refresh_catalog()?;
    if count == 0 {
        println!("Catalog is empty.");
        return Ok(());
    }

    for entry in ws.catalog().entries() {
        println!(
            "{}  {} frames  {} ms  repeat {}",
            entry.animation_id,
            entry.frame_order.len(),
            entry.frame_duration_ms,
            entry.repeat
        );
    }
    Ok(())
}

async fn cmd_import_legacy(dir: &Path, config: &Config) -> Result<(), AppError> {
    let docs = LegacyDocuments::read_dir(dir)?;
    let mut ws = open_loaded(config).await?;
    let imported = docs.import(config.frame_id_length, ws.collection().frames())?;

    // Oldest first so the documents' first animation ends up at the front
    for animation_id in imported.order().iter().rev() {
        let Some(metadata) = imported.get(animation_id) else {
            continue;
        };
        let frames: FrameMap = metadata
            .frame_order
            .iter()
            .filter_map(|id| imported.frame(id).map(|f| (id.clone(), f.clone())))
            .collect();
        ws.collection_mut().add_animation(metadata.clone(), frames)?;
    }
    ws.save()?;

    println!("📥 Imported {} legacy animations", imported.len());
    Ok(())
}
