//! Render composites of multiplexed images or painted cell masks.
//!
//! Usage:
//! ```text
//! cargo run --release --bin cellraster -- pixels --images data/img \
//!     --colour-by H3 --colour-by SMA -o plot.png
//! cargo run --release --bin cellraster -- cells --masks data/masks \
//!     --cells cells.json --colour-by celltype -o cells.png
//! ```

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::info;

use cellraster::{
    load_images, load_masks, plot_cells, plot_pixels, save_plots, CellTable, CellsRequest,
    Display, PixelsRequest, PlotConfig,
};

#[derive(Parser)]
#[command(name = "cellraster")]
#[command(about = "Composite and annotate multiplexed cell images")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Blend image channels into one composite per image
    Pixels(PixelsArgs),
    /// Paint segmentation masks by cell features or metadata
    Cells(CellsArgs),
}

#[derive(Args)]
struct Common {
    /// Cell table as JSON
    #[arg(long, value_name = "FILE")]
    cells: Option<PathBuf>,

    /// Metadata column used to colour cell outlines
    #[arg(long)]
    outline_by: Option<String>,

    /// Plot configuration as JSON
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output file; the extension selects png, tiff or jpeg
    #[arg(short, long, default_value = "cellraster.png")]
    output: PathBuf,

    /// Resize factor applied when saving
    #[arg(long, default_value_t = 1.0)]
    scale: f64,

    /// One canvas for all images or one per image
    #[arg(long, value_enum)]
    display: Option<DisplayArg>,
}

#[derive(Args)]
struct PixelsArgs {
    /// Directory with the multi-channel images
    #[arg(long, value_name = "DIR")]
    images: PathBuf,

    #[arg(long, default_value = "*.tiff")]
    image_pattern: String,

    /// Directory with label masks matching the images
    #[arg(long, value_name = "DIR")]
    masks: Option<PathBuf>,

    #[arg(long, default_value = "*.tiff")]
    mask_pattern: String,

    /// Channel names in file order, replacing ch1, ch2, ...
    #[arg(long, value_delimiter = ',')]
    channel_names: Option<Vec<String>>,

    /// Channels to blend
    #[arg(long)]
    colour_by: Vec<String>,

    #[command(flatten)]
    common: Common,
}

#[derive(Args)]
struct CellsArgs {
    /// Directory with label masks
    #[arg(long, value_name = "DIR")]
    masks: PathBuf,

    #[arg(long, default_value = "*.tiff")]
    mask_pattern: String,

    /// Features or a single metadata column
    #[arg(long)]
    colour_by: Vec<String>,

    /// Assay slot holding the features
    #[arg(long, default_value = "counts")]
    exprs_slot: String,

    #[command(flatten)]
    common: Common,
}

#[derive(Clone, Copy, ValueEnum)]
enum DisplayArg {
    All,
    Single,
}

impl From<DisplayArg> for Display {
    fn from(arg: DisplayArg) -> Self {
        match arg {
            DisplayArg::All => Display::All,
            DisplayArg::Single => Display::Single,
        }
    }
}

fn load_config(common: &Common) -> Result<PlotConfig> {
    let mut config = match &common.config {
        Some(path) => PlotConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PlotConfig::default(),
    };
    if let Some(display) = common.display {
        config.display = display.into();
    }
    Ok(config)
}

fn load_cell_table(path: &Path) -> Result<CellTable> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse cell table {}", path.display()))
}

fn run_pixels(args: PixelsArgs) -> Result<()> {
    let mut images = load_images(&args.images, &args.image_pattern)
        .with_context(|| format!("Failed to load images from {}", args.images.display()))?;
    if let Some(names) = &args.channel_names {
        images = images.set_channel_names(names)?;
    }
    let masks = args
        .masks
        .as_ref()
        .map(|dir| load_masks(dir, &args.mask_pattern))
        .transpose()
        .context("Failed to load masks")?;
    let table = args.common.cells.as_deref().map(load_cell_table).transpose()?;

    let mut request = PixelsRequest::new(&images)
        .colour_by(args.colour_by.clone())
        .config(load_config(&args.common)?);
    request.masks = masks.as_ref();
    request.cell_table = table.as_ref();
    request.outline_by = args.common.outline_by.clone();
    request.return_images = false;

    let output = plot_pixels(&request)?;
    save(output.plot, &args.common)
}

fn run_cells(args: CellsArgs) -> Result<()> {
    let masks = load_masks(&args.masks, &args.mask_pattern)
        .with_context(|| format!("Failed to load masks from {}", args.masks.display()))?;
    let table_path = args
        .common
        .cells
        .as_deref()
        .context("The cells command needs a cell table (--cells)")?;
    let table = load_cell_table(table_path)?;

    let mut request = CellsRequest::new(&masks, &table)
        .colour_by(args.colour_by.clone())
        .exprs_slot(args.exprs_slot.clone())
        .config(load_config(&args.common)?);
    request.outline_by = args.common.outline_by.clone();
    request.return_images = false;

    let output = plot_cells(&request)?;
    save(output.plot, &args.common)
}

fn save(plot: Option<Vec<image::RgbImage>>, common: &Common) -> Result<()> {
    let plot = plot.context("No plot was rendered")?;
    let written = save_plots(&plot, &common.output, common.scale)
        .with_context(|| format!("Failed to save {}", common.output.display()))?;
    for path in written {
        println!("Wrote {}", path.display());
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Command::Pixels(args) => run_pixels(args),
        Command::Cells(args) => run_cells(args),
    }?;
    info!("done");
    Ok(())
}
