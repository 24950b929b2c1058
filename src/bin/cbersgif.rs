use std::path::PathBuf;

use anyhow::Context as _;
use cbersgif::core::{parse_band_list, parse_percentiles};
use cbersgif::{GifPipeline, GifRequest, LevelFilter, PipelineConfig, SearchMode, Sensor};
use clap::{Parser, ValueEnum};

/// Create an animated GIF from CBERS-4 data
#[derive(Parser, Debug)]
#[command(name = "cbersgif", version)]
struct Cli {
    /// Latitude of the query, between 90 and -90.
    #[arg(long, allow_hyphen_values = true)]
    lat: f64,

    /// Longitude of the query, between 180 and -180.
    #[arg(long, allow_hyphen_values = true)]
    lon: f64,

    /// CBERS-4 path (path/row search mode).
    #[arg(long)]
    path: Option<u32>,

    /// CBERS-4 row (path/row search mode).
    #[arg(long)]
    row: Option<u32>,

    /// Scene search backend.
    #[arg(long, value_enum, default_value_t = ModeChoice::Stac)]
    mode: ModeChoice,

    /// Sensor.
    #[arg(long, value_enum, default_value_t = SensorChoice::Mux)]
    sensor: SensorChoice,

    /// Levels to be used (L2, L4 or all).
    #[arg(long, default_value = "L4")]
    level: String,

    /// Start date of the query in the format YYYY-MM-DD.
    #[arg(long, short = 's', default_value = "2013-01-01")]
    start_date: String,

    /// End date of the query in the format YYYY-MM-DD (default: today).
    #[arg(long, short = 'e')]
    end_date: Option<String>,

    /// Output resolution (meters/pixel).
    #[arg(long, default_value_t = 20.0)]
    res: f64,

    /// Comma separated list of RGB bands, in that order.
    #[arg(long, default_value = "7,6,5")]
    bands: String,

    /// Buffer size around the lat/lon point (meters).
    #[arg(long, short = 'b', default_value_t = 10_000.0)]
    buffer_size: f64,

    /// Output filename.
    #[arg(long, short = 'o', default_value = "cbers.gif")]
    output: PathBuf,

    /// Save intermediate frames as BMP.
    #[arg(long)]
    save_intermediate: bool,

    /// Maximum number of images to be used.
    #[arg(long, default_value_t = 100)]
    max_images: usize,

    /// Comma separated scene positions to skip.
    #[arg(long, value_delimiter = ',')]
    taboo: Vec<usize>,

    /// Disable the percentile stretch.
    #[arg(long)]
    no_stretch: bool,

    /// Comma separated low,high stretch percentiles.
    #[arg(long, default_value = "2,98")]
    percentiles: String,

    /// Use the first scene's stretch for the whole animation.
    #[arg(long)]
    lock_stretch: bool,

    /// Contrast enhancement factor (1.0 keeps the image).
    #[arg(long, default_value_t = 1.0)]
    contrast: f64,

    /// Brightness enhancement factor (1.0 keeps the image).
    #[arg(long, default_value_t = 1.0)]
    brightness: f64,

    /// Seconds each frame is displayed.
    #[arg(long, default_value_t = 0.5)]
    duration: f64,

    /// STAC search endpoint.
    #[arg(long)]
    stac_endpoint: Option<String>,

    /// TrueType font for frame labels (default: bundled DejaVu Sans Mono).
    #[arg(long)]
    font: Option<PathBuf>,

    /// Label text height in pixels.
    #[arg(long, default_value_t = 12.0)]
    font_size: f32,

    /// Frame cache directory.
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Bypass the frame cache.
    #[arg(long)]
    no_cache: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeChoice {
    PathRow,
    Stac,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SensorChoice {
    Mux,
    Awfi,
    Pan5m,
    Pan10m,
}

impl From<SensorChoice> for Sensor {
    fn from(choice: SensorChoice) -> Self {
        match choice {
            SensorChoice::Mux => Sensor::MUX,
            SensorChoice::Awfi => Sensor::AWFI,
            SensorChoice::Pan5m => Sensor::PAN5M,
            SensorChoice::Pan10m => Sensor::PAN10M,
        }
    }
}

fn build_request(cli: &Cli) -> anyhow::Result<GifRequest> {
    let mode = match cli.mode {
        ModeChoice::PathRow => {
            let path = cli.path.context("--path is required in path-row mode")?;
            let row = cli.row.context("--row is required in path-row mode")?;
            SearchMode::PathRow { path, row }
        }
        ModeChoice::Stac => SearchMode::Stac {
            lon: cli.lon,
            lat: cli.lat,
        },
    };

    let end_date = cli
        .end_date
        .clone()
        .unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%d").to_string());

    Ok(GifRequest {
        lon: cli.lon,
        lat: cli.lat,
        buffer_meters: Some(cli.buffer_size),
        sensor: cli.sensor.into(),
        level: cli.level.parse::<LevelFilter>()?,
        start_date: Some(cli.start_date.clone()),
        end_date: Some(end_date),
        mode,
        resolution: cli.res,
        bands: parse_band_list(&cli.bands)?,
        output: cli.output.clone(),
        max_images: cli.max_images,
        taboo: cli.taboo.clone(),
        stretch: !cli.no_stretch,
        percentiles: parse_percentiles(&cli.percentiles)?,
        lock_stretch: cli.lock_stretch,
        contrast: cli.contrast,
        brightness: cli.brightness,
        frame_duration: cli.duration,
        save_intermediate: cli.save_intermediate,
    })
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let request = build_request(&cli)?;

    let mut config = PipelineConfig::default();
    if let Some(endpoint) = &cli.stac_endpoint {
        config.stac_endpoint = endpoint.clone();
    }
    if let Some(dir) = &cli.cache_dir {
        config.cache_dir = dir.clone();
    }
    config.cache_enabled = !cli.no_cache;
    config.font_path = cli.font.clone();
    config.font_size = cli.font_size;

    let pipeline = GifPipeline::from_config(config).context("initialize pipeline")?;

    if matches!(request.mode, SearchMode::Stac { .. }) {
        let catalog = pipeline.catalog().transport();
        if !catalog.is_online() {
            anyhow::bail!("STAC endpoint {} is not reachable", catalog.stac_endpoint());
        }
    }
    let outcome = pipeline
        .run(&request)
        .with_context(|| format!("create {}", request.output.display()))?;

    match &outcome.output {
        Some(path) => println!(
            "{} scenes found, {} frames written to {}",
            outcome.scenes_found,
            outcome.frames_written,
            path.display()
        ),
        None => println!("{} scenes found, no frames to write", outcome.scenes_found),
    }
    Ok(())
}
