use crate::io::catalog::{CatalogTransport, StacQuery};
use crate::types::{CbersError, CbersResult, LevelFilter, SceneDescriptor, Sensor};
use chrono::NaiveDate;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// First date with CBERS-4 data in the archive
pub const DEFAULT_START_DATE: &str = "2013-01-01";

/// Identifier grammar: FAMILY_SATELLITE_CAMERA_YYYYMMDD_PPP_RRR_L#
fn scene_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?P<family>[A-Z]+)_(?P<satellite>[0-9])_(?P<camera>[A-Z0-9]+)_(?P<date>[0-9]{8})_(?P<path>[0-9]{3})_(?P<row>[0-9]{3})_L(?P<level>[0-9])$",
        )
        .expect("scene identifier pattern is valid")
    })
}

/// Parse a catalog item identifier into a scene descriptor.
///
/// `CBERS_4_PAN5M_20181231_156_107_L2` becomes a scene keyed under
/// `CBERS4/PAN5M/156/107/CBERS_4_PAN5M_20181231_156_107_L2`.
pub fn parse_scene_id(scene_id: &str) -> CbersResult<SceneDescriptor> {
    let caps = scene_id_regex()
        .captures(scene_id)
        .ok_or_else(|| CbersError::SceneIdentifier(scene_id.to_string()))?;

    let family = &caps["family"];
    let satellite = &caps["satellite"];
    let camera = &caps["camera"];
    let path = &caps["path"];
    let row = &caps["row"];

    // Fixed-width digit groups always fit
    let path_no = path
        .parse::<u32>()
        .map_err(|_| CbersError::SceneIdentifier(scene_id.to_string()))?;
    let row_no = row
        .parse::<u32>()
        .map_err(|_| CbersError::SceneIdentifier(scene_id.to_string()))?;

    Ok(SceneDescriptor {
        source_key: format!(
            "{}{}/{}/{}/{}/{}",
            family, satellite, camera, path, row, scene_id
        ),
        scene_id: scene_id.to_string(),
        acquisition_date: caps["date"].to_string(),
        processing_level: format!("L{}", &caps["level"]),
        satellite: format!("{}{}", family, satellite),
        sensor: camera.to_string(),
        path: path_no,
        row: row_no,
    })
}

/// Normalize a `YYYY-MM-DD` (or already compact `YYYYMMDD`) date into
/// its 8-digit form, rejecting anything that is not a calendar date.
pub fn normalize_date(date: &str) -> CbersResult<String> {
    let parsed = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(date, "%Y%m%d"))
        .map_err(|e| CbersError::InvalidInput(format!("Invalid date '{}': {}", date, e)))?;
    Ok(parsed.format("%Y%m%d").to_string())
}

fn hyphenated(compact: &str) -> String {
    format!("{}-{}-{}", &compact[0..4], &compact[4..6], &compact[6..8])
}

/// Inclusive date window plus optional level equality
#[derive(Debug, Clone, Default)]
pub struct SceneFilter {
    /// Normalized YYYYMMDD
    pub start_date: Option<String>,
    /// Normalized YYYYMMDD
    pub end_date: Option<String>,
    pub level: Option<String>,
}

impl SceneFilter {
    pub fn new(
        start_date: Option<&str>,
        end_date: Option<&str>,
        level: &LevelFilter,
    ) -> CbersResult<Self> {
        Ok(Self {
            start_date: start_date.map(normalize_date).transpose()?,
            end_date: end_date.map(normalize_date).transpose()?,
            level: level.as_level().map(str::to_string),
        })
    }

    /// Fixed-width zero padded dates compare correctly as strings
    pub fn accepts(&self, scene: &SceneDescriptor) -> bool {
        let date = scene.acquisition_date.as_str();
        if let Some(start) = &self.start_date {
            if date < start.as_str() {
                return false;
            }
        }
        if let Some(end) = &self.end_date {
            if date > end.as_str() {
                return false;
            }
        }
        match &self.level {
            Some(level) => scene.processing_level == *level,
            None => true,
        }
    }
}

/// Stable ascending sort by acquisition date
pub fn sort_by_date(scenes: &mut [SceneDescriptor]) {
    scenes.sort_by(|a, b| a.acquisition_date.cmp(&b.acquisition_date));
}

/// Keep the first scene seen for every acquisition date
pub fn dedup_by_date(scenes: Vec<SceneDescriptor>) -> Vec<SceneDescriptor> {
    let mut seen = HashSet::new();
    scenes
        .into_iter()
        .filter(|scene| seen.insert(scene.acquisition_date.clone()))
        .collect()
}

/// Backend selector for a scene search
#[derive(Debug, Clone, PartialEq)]
pub enum SearchMode {
    /// Tile-grid index lookup
    PathRow { path: u32, row: u32 },
    /// Spatio-temporal query around a point, through a STAC endpoint
    Stac { lon: f64, lat: f64 },
}

/// Everything needed to run a catalog search
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub sensor: Sensor,
    pub level: LevelFilter,
    /// YYYY-MM-DD or YYYYMMDD
    pub start_date: Option<String>,
    /// YYYY-MM-DD or YYYYMMDD
    pub end_date: Option<String>,
    pub mode: SearchMode,
}

/// Normalizes both catalog backends into ordered, de-duplicated scene lists
pub struct SceneCatalog<T: CatalogTransport> {
    transport: T,
    stac_limit: usize,
}

impl<T: CatalogTransport> SceneCatalog<T> {
    pub fn new(transport: T, stac_limit: usize) -> Self {
        Self {
            transport,
            stac_limit,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Search scenes, returning them sorted by date with one scene per date
    pub fn search(&self, request: &SearchRequest) -> CbersResult<Vec<SceneDescriptor>> {
        let filter = SceneFilter::new(
            request.start_date.as_deref(),
            request.end_date.as_deref(),
            &request.level,
        )?;

        let ids = match &request.mode {
            SearchMode::PathRow { path, row } => {
                log::info!(
                    "Searching {} scenes for path {:03} row {:03}",
                    request.sensor, path, row
                );
                self.transport.list_path_row(request.sensor, *path, *row)?
            }
            SearchMode::Stac { lon, lat } => {
                let start = filter
                    .start_date
                    .clone()
                    .unwrap_or_else(|| DEFAULT_START_DATE.replace('-', ""));
                let end = filter
                    .end_date
                    .clone()
                    .unwrap_or_else(|| chrono::Utc::now().format("%Y%m%d").to_string());
                let query = StacQuery {
                    instrument: request.sensor,
                    start_date: hyphenated(&start),
                    end_date: hyphenated(&end),
                    bbox: [*lon, *lat, *lon, *lat],
                    level: filter.level.clone(),
                    limit: self.stac_limit,
                };
                log::info!("Searching {} scenes through STAC at ({}, {})", request.sensor, lon, lat);
                self.transport.stac_search(&query)?
            }
        };

        let mut scenes = ids
            .iter()
            .map(|id| parse_scene_id(id))
            .collect::<CbersResult<Vec<_>>>()?;
        scenes.retain(|scene| filter.accepts(scene));
        sort_by_date(&mut scenes);
        let scenes = dedup_by_date(scenes);

        log::info!("{} scenes found", scenes.len());
        Ok(scenes)
    }
}
