use crate::config::TARGET_EPSG;
use crate::types::{AreaOfInterest, Bounds, CbersError, CbersResult};
use std::f64::consts::FRAC_PI_4;

/// WGS84 semi-major axis used by spherical Web Mercator
const EARTH_RADIUS: f64 = 6_378_137.0;

/// Latitude limit of Web Mercator (degrees); the projection diverges at the poles
pub const MAX_MERCATOR_LATITUDE: f64 = 85.051_128_78;

/// Geographic (degrees) to Web Mercator (meters)
pub fn lonlat_to_mercator(lon: f64, lat: f64) -> (f64, f64) {
    let x = EARTH_RADIUS * lon.to_radians();
    let y = EARTH_RADIUS * (FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln();
    (x, y)
}

/// Web Mercator (meters) back to geographic (degrees)
pub fn mercator_to_lonlat(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / EARTH_RADIUS).to_degrees();
    let lat = (2.0 * (y / EARTH_RADIUS).exp().atan() - 2.0 * FRAC_PI_4).to_degrees();
    (lon, lat)
}

/// Build the projected AOI around a point.
///
/// The buffer uses a square cap, so the box is the point extended by
/// `buffer_meters` on each side. Without a buffer the box collapses to the
/// point and the grid is 0x0; extraction refuses such grids.
pub fn build_aoi(
    lon: f64,
    lat: f64,
    buffer_meters: Option<f64>,
    resolution_meters: f64,
) -> CbersResult<AreaOfInterest> {
    if !(-180.0..=180.0).contains(&lon) || !(-90.0..=90.0).contains(&lat) {
        return Err(CbersError::InvalidInput(format!(
            "Point ({}, {}) is outside the geographic range",
            lon, lat
        )));
    }
    if lat.abs() > MAX_MERCATOR_LATITUDE {
        return Err(CbersError::InvalidInput(format!(
            "Latitude {} is beyond the Web Mercator limit of +/-{} degrees",
            lat, MAX_MERCATOR_LATITUDE
        )));
    }
    if !(resolution_meters > 0.0) {
        return Err(CbersError::InvalidInput(format!(
            "Resolution must be positive, got {}",
            resolution_meters
        )));
    }

    let buffer = buffer_meters.unwrap_or(0.0);
    if buffer < 0.0 {
        return Err(CbersError::InvalidInput(format!(
            "Buffer must not be negative, got {}",
            buffer
        )));
    }

    let (x, y) = lonlat_to_mercator(lon, lat);
    let bounds = Bounds {
        minx: x - buffer,
        miny: y - buffer,
        maxx: x + buffer,
        maxy: y + buffer,
    };

    let width = (bounds.width() / resolution_meters).floor() as usize;
    let height = (bounds.height() / resolution_meters).floor() as usize;
    log::debug!("AOI bounds {:?}, grid {}x{}", bounds, width, height);

    Ok(AreaOfInterest {
        center: (lon, lat),
        bounds,
        epsg: TARGET_EPSG,
        width,
        height,
    })
}

impl AreaOfInterest {
    /// Geographic geometry of the AOI as GeoJSON, for inspection
    pub fn to_geojson(&self) -> serde_json::Value {
        if self.bounds.width() == 0.0 || self.bounds.height() == 0.0 {
            return serde_json::json!({
                "type": "Point",
                "coordinates": [self.center.0, self.center.1],
            });
        }

        let b = &self.bounds;
        let ring: Vec<[f64; 2]> = [
            (b.maxx, b.maxy),
            (b.maxx, b.miny),
            (b.minx, b.miny),
            (b.minx, b.maxy),
            (b.maxx, b.maxy),
        ]
        .iter()
        .map(|&(x, y)| {
            let (lon, lat) = mercator_to_lonlat(x, y);
            [lon, lat]
        })
        .collect();

        serde_json::json!({
            "type": "Polygon",
            "coordinates": [ring],
        })
    }
}
