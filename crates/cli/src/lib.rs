use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use regionmark_core::{
    AffineTransform, FrameRegions, GraphicDocument, GraphicHandle, GraphicId, GraphicModel,
    ModelContext, NullPointLog, Point, PointLog, Rect, ReplicationReport,
};
use regionmark_storage::FilePointLog;
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const POINTS_ROOT_ENV: &str = "REGIONMARK_POINTS_ROOT";

#[derive(Debug, Parser)]
#[command(name = "regionmark")]
#[command(about = "Measurement replication for multi-region ultrasound images")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, clap::Args)]
struct PointsArgs {
    /// Directory receiving replicated point logs.
    #[arg(long, value_name = "DIR", conflicts_with = "no_points")]
    points_root: Option<PathBuf>,
    /// Do not write point logs.
    #[arg(long)]
    no_points: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Replicate completed measurements across the regions of a frame.
    Replicate {
        #[arg(long, value_name = "FILE")]
        document: PathBuf,
        /// Region description of the displayed frame.
        #[arg(long, value_name = "FILE")]
        frame: PathBuf,
        #[command(flatten)]
        points: PointsArgs,
        /// Write the updated document here.
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Print the graphic under an image point.
    Hit {
        #[arg(long, value_name = "FILE")]
        document: PathBuf,
        #[arg(long, allow_negative_numbers = true)]
        x: f64,
        #[arg(long, allow_negative_numbers = true)]
        y: f64,
        /// Display zoom factor.
        #[arg(long, default_value_t = 1.0)]
        scale: f64,
    },
    /// Print the graphics intersecting an image rectangle, topmost first.
    Select {
        #[arg(long, value_name = "FILE")]
        document: PathBuf,
        /// Rectangle as x,y,width,height.
        #[arg(long, value_name = "X,Y,W,H", value_parser = parse_rect)]
        rect: Rect,
        /// Ignore graphics hidden behind others.
        #[arg(long)]
        front_only: bool,
        #[arg(long, default_value_t = 1.0)]
        scale: f64,
    },
    /// Delete graphics together with their replicas in other regions.
    DeleteSelected {
        #[arg(long, value_name = "FILE")]
        document: PathBuf,
        /// Graphic to select; repeat for several.
        #[arg(long = "id", value_name = "UUID", required = true)]
        ids: Vec<GraphicId>,
        #[command(flatten)]
        points: PointsArgs,
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplicateOutput {
    replicated: usize,
    replicas_created: usize,
    groups_updated: usize,
    skipped: usize,
    graphic_count: usize,
}

#[derive(Debug, Serialize)]
struct GraphicOutput {
    id: GraphicId,
    shape: &'static str,
}

#[derive(Debug, Serialize)]
struct HitOutput {
    hit: Option<GraphicOutput>,
}

#[derive(Debug, Serialize)]
struct SelectOutput {
    selected: Vec<GraphicOutput>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteOutput {
    deleted: usize,
    graphic_count: usize,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    match cli.command {
        Commands::Replicate { document, frame, points, output } => {
            run_replicate(&document, &frame, &points, output.as_deref())
        }
        Commands::Hit { document, x, y, scale } => run_hit(&document, Point::new(x, y), scale),
        Commands::Select { document, rect, front_only, scale } => {
            run_select(&document, &rect, front_only, scale)
        }
        Commands::DeleteSelected { document, ids, points, output } => {
            run_delete_selected(&document, &ids, &points, output.as_deref())
        }
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn run_replicate(
    document: &Path,
    frame: &Path,
    points: &PointsArgs,
    output: Option<&Path>,
) -> Result<()> {
    let model = load_model(document, point_log(points)?)?;
    let regions = load_frame(frame)?;

    let ReplicationReport { replicated, replicas_created, groups_updated, skipped } =
        model.replicate_regions(&regions);
    info!("{replicated} measurements replicated into {replicas_created} copies");

    if let Some(output) = output {
        save_document(&model, output)?;
    }
    print_json(&ReplicateOutput {
        replicated,
        replicas_created,
        groups_updated,
        skipped,
        graphic_count: model.graphic_count(),
    })
}

fn run_hit(document: &Path, point: Point, scale: f64) -> Result<()> {
    let model = load_model(document, Arc::new(NullPointLog))?;
    let transform = zoom(scale)?;
    let hit = model
        .first_graphic_intersecting(&point, &transform)
        .and_then(|handle| describe(&model, handle));
    print_json(&HitOutput { hit })
}

fn run_select(document: &Path, rect: &Rect, front_only: bool, scale: f64) -> Result<()> {
    let model = load_model(document, Arc::new(NullPointLog))?;
    let transform = zoom(scale)?;
    let selected = model
        .selected_graphics_intersecting(rect, &transform, front_only)
        .into_iter()
        .filter_map(|handle| describe(&model, handle))
        .collect();
    print_json(&SelectOutput { selected })
}

fn run_delete_selected(
    document: &Path,
    ids: &[GraphicId],
    points: &PointsArgs,
    output: Option<&Path>,
) -> Result<()> {
    let model = load_model(document, point_log(points)?)?;

    let mut handles = Vec::with_capacity(ids.len());
    for id in ids {
        let handle = model.handle_of(*id).with_context(|| format!("no graphic with id {id}"))?;
        handles.push(handle);
    }
    model.set_selected_graphics(&handles);
    let deleted = model.delete_selected_graphics(None);

    if let Some(output) = output {
        save_document(&model, output)?;
    }
    print_json(&DeleteOutput { deleted, graphic_count: model.graphic_count() })
}

fn point_log(args: &PointsArgs) -> Result<Arc<dyn PointLog>> {
    if args.no_points {
        return Ok(Arc::new(NullPointLog));
    }
    let root = args
        .points_root
        .clone()
        .or_else(|| std::env::var_os(POINTS_ROOT_ENV).map(PathBuf::from));
    let log = match root {
        Some(root) => FilePointLog::with_root(root),
        None => FilePointLog::from_default_location()
            .context("failed to resolve the point log directory")?,
    };
    info!("Point logs go to {}", log.root().display());
    Ok(Arc::new(log))
}

fn load_model(path: &Path, point_log: Arc<dyn PointLog>) -> Result<GraphicModel> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("failed to read document {}", path.display()))?;
    let document = GraphicDocument::from_json(&json)
        .with_context(|| format!("failed to parse document {}", path.display()))?;
    GraphicModel::from_document(document, ModelContext::new(point_log))
        .with_context(|| format!("failed to load document {}", path.display()))
}

fn load_frame(path: &Path) -> Result<FrameRegions> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("failed to read frame {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("failed to parse frame {}", path.display()))
}

fn save_document(model: &GraphicModel, output: &Path) -> Result<()> {
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = model.to_document().to_json()?;
    fs::write(output, json)
        .with_context(|| format!("failed to write document to {}", output.display()))
}

fn describe(model: &GraphicModel, handle: GraphicHandle) -> Option<GraphicOutput> {
    model.with_graphic(handle, |graphic| GraphicOutput {
        id: graphic.id(),
        shape: graphic.shape().name(),
    })
}

fn zoom(scale: f64) -> Result<AffineTransform> {
    if !scale.is_finite() || scale <= 0.0 {
        anyhow::bail!("--scale must be a positive number");
    }
    Ok(AffineTransform::scale(scale, scale))
}

fn print_json(value: &impl Serialize) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

fn parse_rect(value: &str) -> std::result::Result<Rect, String> {
    let parts = value
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|error| format!("invalid number: {error}"))?;
    match parts.as_slice() {
        [x, y, width, height] if *width >= 0.0 && *height >= 0.0 => Ok(Rect::new(*x, *y, *width, *height)),
        [_, _, _, _] => Err("width and height must not be negative".to_string()),
        _ => Err(format!("expected x,y,width,height, got {value:?}")),
    }
}
