use crate::config::PipelineConfig;
use crate::core::aoi::build_aoi;
use crate::core::composite::{frame_label, FrameCompositor, LabelFont};
use crate::core::extract::BandExtractor;
use crate::core::scene::{SceneCatalog, SearchMode, SearchRequest};
use crate::core::stretch::{StretchMode, Stretcher};
use crate::io::animation::{AnimationAssembler, DEFAULT_FRAME_DURATION};
use crate::io::cache::{CacheKey, FrameCache};
use crate::io::catalog::{CatalogTransport, HttpCatalog};
use crate::io::raster::{GdalRasterReader, RasterReader};
use crate::types::{
    AreaOfInterest, BandMatrix, CbersError, CbersResult, Frame, LevelFilter, SceneDescriptor, Sensor,
};
use std::collections::HashSet;
use std::path::PathBuf;

/// Split a comma separated band list, which must name exactly three bands
pub fn parse_band_list(bands: &str) -> CbersResult<Vec<String>> {
    let list: Vec<String> = bands.split(',').map(|b| b.trim().to_string()).collect();
    validate_bands(&list)?;
    Ok(list)
}

fn validate_bands(bands: &[String]) -> CbersResult<[String; 3]> {
    if bands.len() != 3 || bands.iter().any(|b| b.is_empty()) {
        return Err(CbersError::InvalidInput(format!(
            "Exactly 3 bands must be defined, got {:?}",
            bands
        )));
    }
    Ok([bands[0].clone(), bands[1].clone(), bands[2].clone()])
}

/// Split a comma separated percentile pair such as `2,98`
pub fn parse_percentiles(percentiles: &str) -> CbersResult<Vec<f64>> {
    let values = percentiles
        .split(',')
        .map(|p| {
            p.trim()
                .parse::<f64>()
                .map_err(|e| CbersError::InvalidInput(format!("Invalid percentile '{}': {}", p, e)))
        })
        .collect::<CbersResult<Vec<_>>>()?;
    validate_percentile_pair(&values)?;
    Ok(values)
}

fn validate_percentile_pair(values: &[f64]) -> CbersResult<(f64, f64)> {
    match values {
        [low, high] => Ok((*low, *high)),
        _ => Err(CbersError::InvalidInput(format!(
            "Exactly 2 percentiles must be defined, got {:?}",
            values
        ))),
    }
}

/// Drop tabooed positions, then keep at most `max_images` scenes.
/// Returned indices are positions in `scenes`.
pub fn select_scenes(
    scenes: &[SceneDescriptor],
    taboo: &[usize],
    max_images: usize,
) -> Vec<(usize, SceneDescriptor)> {
    let taboo: HashSet<usize> = taboo.iter().copied().collect();
    scenes
        .iter()
        .enumerate()
        .filter(|(i, _)| !taboo.contains(i))
        .take(max_images)
        .map(|(i, scene)| (i, scene.clone()))
        .collect()
}

/// One animation request
#[derive(Debug, Clone)]
pub struct GifRequest {
    pub lon: f64,
    pub lat: f64,
    /// Square buffer around the point (meters)
    pub buffer_meters: Option<f64>,
    pub sensor: Sensor,
    pub level: LevelFilter,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub mode: SearchMode,
    /// Output ground resolution (meters/pixel)
    pub resolution: f64,
    /// Bands in R, G, B order
    pub bands: Vec<String>,
    pub output: PathBuf,
    pub max_images: usize,
    /// Scene positions to skip, counted after catalog filtering
    pub taboo: Vec<usize>,
    pub stretch: bool,
    pub percentiles: Vec<f64>,
    pub lock_stretch: bool,
    pub contrast: f64,
    pub brightness: f64,
    /// Seconds each frame is displayed
    pub frame_duration: f64,
    pub save_intermediate: bool,
}

impl Default for GifRequest {
    fn default() -> Self {
        Self {
            lon: 0.0,
            lat: 0.0,
            buffer_meters: Some(10_000.0),
            sensor: Sensor::MUX,
            level: LevelFilter::Exact("L4".to_string()),
            start_date: None,
            end_date: None,
            mode: SearchMode::Stac { lon: 0.0, lat: 0.0 },
            resolution: 20.0,
            bands: vec!["7".to_string(), "6".to_string(), "5".to_string()],
            output: PathBuf::from("cbers.gif"),
            max_images: 100,
            taboo: Vec::new(),
            stretch: true,
            percentiles: vec![2.0, 98.0],
            lock_stretch: false,
            contrast: 1.0,
            brightness: 1.0,
            frame_duration: DEFAULT_FRAME_DURATION,
            save_intermediate: false,
        }
    }
}

/// Request after validation, ready to drive the per-scene loop
struct PreparedRequest {
    bands: [String; 3],
    stretch_mode: StretchMode,
    compositor: FrameCompositor,
    assembler: AnimationAssembler,
    aoi: AreaOfInterest,
}

impl GifRequest {
    /// Check every input that does not need the network
    fn prepare(&self, font: &LabelFont) -> CbersResult<PreparedRequest> {
        let bands = validate_bands(&self.bands)?;
        let percentiles = validate_percentile_pair(&self.percentiles)?;
        let stretch_mode = StretchMode::new(self.stretch, self.lock_stretch, percentiles)?;
        let compositor = FrameCompositor::new(self.contrast, self.brightness, font.clone())?;
        let assembler = AnimationAssembler::new(self.frame_duration)?;

        let aoi = build_aoi(self.lon, self.lat, self.buffer_meters, self.resolution)?;
        if aoi.is_degenerate() {
            return Err(CbersError::InvalidInput(format!(
                "Output grid is {}x{}; use a positive buffer larger than the resolution",
                aoi.width, aoi.height
            )));
        }

        Ok(PreparedRequest {
            bands,
            stretch_mode,
            compositor,
            assembler,
            aoi,
        })
    }
}

/// Summary of a pipeline run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    pub scenes_found: usize,
    pub frames_written: usize,
    /// `None` when no frame was produced
    pub output: Option<PathBuf>,
}

/// Scene discovery, extraction, stretching, compositing and GIF assembly
pub struct GifPipeline<C: CatalogTransport, R: RasterReader> {
    config: PipelineConfig,
    catalog: SceneCatalog<C>,
    extractor: BandExtractor<R>,
    cache: FrameCache,
    label_font: LabelFont,
}

impl GifPipeline<HttpCatalog, GdalRasterReader> {
    /// Pipeline talking to the real catalog and reading rasters through GDAL
    pub fn from_config(config: PipelineConfig) -> CbersResult<Self> {
        let transport = HttpCatalog::new(&config)?;
        let reader = GdalRasterReader::new(config.requester_pays)?;
        Self::new(config, transport, reader)
    }
}

impl<C: CatalogTransport, R: RasterReader> GifPipeline<C, R> {
    /// Fails only when the configured label font cannot be loaded
    pub fn new(config: PipelineConfig, transport: C, reader: R) -> CbersResult<Self> {
        let label_font = LabelFont::from_config(&config)?;
        let catalog = SceneCatalog::new(transport, config.stac_limit);
        let extractor = BandExtractor::new(reader, config.target_epsg);
        let cache = FrameCache::from_config(&config);
        Ok(Self {
            config,
            catalog,
            extractor,
            cache,
            label_font,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &SceneCatalog<C> {
        &self.catalog
    }

    pub fn extractor(&self) -> &BandExtractor<R> {
        &self.extractor
    }

    /// Run the whole request and write the animation
    pub fn run(&self, request: &GifRequest) -> CbersResult<PipelineOutcome> {
        let prepared = request.prepare(&self.label_font)?;
        let (scenes_found, frames) = self.render(request, &prepared)?;
        let output = prepared.assembler.assemble(&frames, &request.output)?;

        Ok(PipelineOutcome {
            scenes_found,
            frames_written: frames.len(),
            output,
        })
    }

    /// Produce the labelled frames without encoding them
    pub fn render_frames(&self, request: &GifRequest) -> CbersResult<Vec<Frame>> {
        let prepared = request.prepare(&self.label_font)?;
        Ok(self.render(request, &prepared)?.1)
    }

    fn render(&self, request: &GifRequest, prepared: &PreparedRequest) -> CbersResult<(usize, Vec<Frame>)> {
        let scenes = self.catalog.search(&SearchRequest {
            sensor: request.sensor,
            level: request.level.clone(),
            start_date: request.start_date.clone(),
            end_date: request.end_date.clone(),
            mode: request.mode.clone(),
        })?;

        let selected = select_scenes(&scenes, &request.taboo, request.max_images);
        log::info!(
            "Processing {} of {} scenes on a {}x{} grid",
            selected.len(),
            scenes.len(),
            prepared.aoi.width,
            prepared.aoi.height
        );

        let mut stretcher = Stretcher::new(prepared.stretch_mode);
        let mut frames = Vec::with_capacity(selected.len());
        if request.save_intermediate && !selected.is_empty() {
            std::fs::create_dir_all(&self.config.intermediate_dir)?;
        }

        for (scene_no, scene) in &selected {
            log::info!("Scene {}: {}", scene_no, scene.scene_id);
            let frame = self.render_scene(*scene_no, scene, prepared, &mut stretcher)?;

            if request.save_intermediate {
                let path = self.config.intermediate_dir.join(format!("{}.bmp", scene_no));
                frame.image.save(&path)?;
                log::debug!("Saved intermediate frame {}", path.display());
            }
            frames.push(frame);
        }

        Ok((scenes.len(), frames))
    }

    fn render_scene(
        &self,
        scene_no: usize,
        scene: &SceneDescriptor,
        prepared: &PreparedRequest,
        stretcher: &mut Stretcher,
    ) -> CbersResult<Frame> {
        let aoi = &prepared.aoi;
        let source_key = format!(
            "{}/{}",
            self.config.raster_prefix.trim_end_matches('/'),
            scene.source_key
        );

        let mut channels: Vec<BandMatrix> = Vec::with_capacity(3);
        for (slot, band) in prepared.bands.iter().enumerate() {
            let key = CacheKey {
                source_key: source_key.clone(),
                band: band.clone(),
                scene: scene.clone(),
                aoi_bounds: aoi.bounds,
                width: aoi.width,
                height: aoi.height,
            };
            let raw = self.cache.get_or_compute(&key, || {
                self.extractor
                    .extract(&source_key, band, scene, &aoi.bounds, aoi.width, aoi.height)
            })?;

            let (stretched, params) = stretcher.stretch_band(slot, raw)?;
            if let Some(params) = params {
                log::debug!("Band {} stretch domain: {:?}", band, params);
            }
            channels.push(stretched);
        }

        let channels: [BandMatrix; 3] = channels
            .try_into()
            .map_err(|_| CbersError::Processing("Expected three channels".to_string()))?;
        prepared
            .compositor
            .compose(&channels, &frame_label(scene_no, &scene.acquisition_date))
    }
}
