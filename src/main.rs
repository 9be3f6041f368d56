use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{ArgGroup, Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use planet_clip::batch::{self, AoiSource};
use planet_clip::client::PlanetClient;
use planet_clip::config::Config;
use planet_clip::filter::SearchParams;
use planet_clip::geometry::DEFAULT_SQUARE_SIZE;
use planet_clip::image_selection::ImageSelection;
use planet_clip::item_type::ItemType;
use planet_clip::search;

#[derive(Parser, Debug)]
#[command(
    name = "planet-clip",
    version,
    about = "Search the Planet catalog and download scenes clipped to an area of interest"
)]
struct Cli {
    /// TOML config file; PL_API_KEY overrides its api_key
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search the catalog and save scene metadata to CSV
    Search(SearchArgs),
    /// Order scenes clipped to the area of interest and download them
    Clip(ClipArgs),
}

#[derive(Args, Debug)]
struct SearchArgs {
    #[arg(long)]
    item_type: ItemType,

    /// Inclusive start, e.g. 2019-07-01T16:00:00.000Z
    #[arg(long)]
    start: DateTime<Utc>,

    /// Inclusive end, e.g. 2019-08-30T23:59:59.999Z
    #[arg(long)]
    end: DateTime<Utc>,

    /// Maximum cloud cover, between 0 and 1
    #[arg(long, default_value_t = 0.0)]
    cloud_cover: f64,

    #[arg(long, default_value = "reg_search")]
    name: String,

    #[arg(long)]
    save_dir: PathBuf,

    #[command(flatten)]
    aoi: AoiArgs,
}

#[derive(Args, Debug)]
#[command(group(
    ArgGroup::new("scenes")
        .required(true)
        .args(["ids", "ids_csv", "selection"])
))]
struct ClipArgs {
    #[arg(long, required_unless_present = "selection")]
    item_type: Option<ItemType>,

    /// Comma separated scene ids
    #[arg(long, value_delimiter = ',')]
    ids: Vec<String>,

    /// CSV written by `search`; every id in it is ordered
    #[arg(long)]
    ids_csv: Option<PathBuf>,

    /// TOML selection file with feature_name, item_type and ids_to_download
    #[arg(long)]
    selection: Option<PathBuf>,

    #[arg(long, default_value = "clip")]
    feature_name: String,

    #[arg(long)]
    save_dir: PathBuf,

    /// Download again even when the files already exist
    #[arg(long)]
    overwrite: bool,

    /// Clip every feature of the GeoJSON file, one order each
    #[arg(long, requires = "geojson")]
    all_features: bool,

    #[command(flatten)]
    aoi: AoiArgs,
}

#[derive(Args, Debug)]
struct AoiArgs {
    /// GeoJSON FeatureCollection holding the area of interest
    #[arg(long, required_unless_present = "point", conflicts_with = "point")]
    geojson: Option<PathBuf>,

    /// Zero based index of the feature to use
    #[arg(long, default_value_t = 0)]
    feature_index: usize,

    /// LAT,LON of the upper-left corner of a square area
    #[arg(long, value_parser = parse_point, allow_hyphen_values = true)]
    point: Option<LatLon>,

    /// Side of the square in decimal degrees
    #[arg(long, default_value_t = DEFAULT_SQUARE_SIZE)]
    size: f64,
}

#[derive(Clone, Copy, Debug)]
struct LatLon {
    lat: f64,
    lon: f64,
}

fn parse_point(value: &str) -> Result<LatLon> {
    let (lat, lon) = value
        .split_once(',')
        .ok_or(anyhow!("Expected LAT,LON but got '{}'", value))?;
    Ok(LatLon {
        lat: lat.trim().parse().context("Invalid latitude")?,
        lon: lon.trim().parse().context("Invalid longitude")?,
    })
}

impl AoiArgs {
    fn source(&self) -> Result<AoiSource> {
        match (&self.geojson, self.point) {
            (Some(path), _) => Ok(AoiSource::GeoJson {
                path: path.clone(),
                feature_index: self.feature_index,
            }),
            (None, Some(point)) => Ok(AoiSource::Square {
                lat: point.lat,
                lon: point.lon,
                size: self.size,
            }),
            (None, None) => bail!("An area of interest is required (--geojson or --point)"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    let client = PlanetClient::new(&config)?;

    match cli.command {
        Command::Search(args) => run_search(&client, args).await,
        Command::Clip(args) => run_clip(&client, args).await,
    }
}

async fn run_search(client: &PlanetClient, args: SearchArgs) -> Result<()> {
    let params = SearchParams {
        item_type: args.item_type,
        start: args.start,
        end: args.end,
        aoi: args.aoi.source()?.geometry()?,
        cloud_cover: args.cloud_cover,
        search_name: args.name,
    };
    search::run_search(client, &params, &args.save_dir).await?;
    Ok(())
}

fn selection_from_args(args: &ClipArgs) -> Result<ImageSelection> {
    if let Some(path) = &args.selection {
        return ImageSelection::read(path)
            .with_context(|| format!("Unable to read selection {}", path.display()));
    }

    let item_type = args
        .item_type
        .ok_or(anyhow!("--item-type is required without --selection"))?;
    match &args.ids_csv {
        Some(path) => ImageSelection::from_search_csv(path, &args.feature_name, item_type),
        None => Ok(ImageSelection::new(
            &args.feature_name,
            item_type,
            args.ids.clone(),
        )),
    }
}

async fn run_clip(client: &PlanetClient, args: ClipArgs) -> Result<()> {
    let selection = selection_from_args(&args)?;
    let aoi = args.aoi.source()?;
    let summary = batch::clip_all(
        client,
        &selection,
        &aoi,
        args.all_features,
        &args.save_dir,
        args.overwrite,
    )
    .await?;
    tracing::info!(
        downloaded = summary.downloaded,
        skipped = summary.skipped,
        "All clips finished"
    );
    Ok(())
}
