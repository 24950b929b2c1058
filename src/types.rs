use image::RgbImage;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Single-band sample grid (rows x columns), raw or stretched
pub type BandMatrix = Array2<u8>;

/// Imaging cameras carried by CBERS-4
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sensor {
    MUX,
    AWFI,
    PAN5M,
    PAN10M,
}

impl std::fmt::Display for Sensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sensor::MUX => write!(f, "MUX"),
            Sensor::AWFI => write!(f, "AWFI"),
            Sensor::PAN5M => write!(f, "PAN5M"),
            Sensor::PAN10M => write!(f, "PAN10M"),
        }
    }
}

impl std::str::FromStr for Sensor {
    type Err = CbersError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "MUX" => Ok(Sensor::MUX),
            "AWFI" => Ok(Sensor::AWFI),
            "PAN5M" => Ok(Sensor::PAN5M),
            "PAN10M" => Ok(Sensor::PAN10M),
            _ => Err(CbersError::InvalidInput(format!(
                "{} is not a valid instrument",
                s
            ))),
        }
    }
}

/// Processing level selector used when querying the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LevelFilter {
    /// Only scenes with this exact processing level (e.g. "L2")
    Exact(String),
    /// No level filtering
    All,
}

impl LevelFilter {
    pub fn as_level(&self) -> Option<&str> {
        match self {
            LevelFilter::Exact(level) => Some(level.as_str()),
            LevelFilter::All => None,
        }
    }
}

impl std::str::FromStr for LevelFilter {
    type Err = CbersError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" | "ALL" => Ok(LevelFilter::All),
            "L2" | "L4" => Ok(LevelFilter::Exact(s.to_string())),
            _ => Err(CbersError::InvalidInput(format!(
                "Invalid processing level selector: {} (expected L2, L4 or all)",
                s
            ))),
        }
    }
}

/// One satellite acquisition as returned by the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneDescriptor {
    /// Prefix of the scene's band files, e.g. CBERS4/MUX/151/126/<scene_id>
    pub source_key: String,
    pub scene_id: String,
    /// YYYYMMDD
    pub acquisition_date: String,
    /// "L2", "L4", ...
    pub processing_level: String,
    pub satellite: String,
    pub sensor: String,
    pub path: u32,
    pub row: u32,
}

/// Axis-aligned box in projected coordinates (meters)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub minx: f64,
    pub miny: f64,
    pub maxx: f64,
    pub maxy: f64,
}

impl Bounds {
    pub fn width(&self) -> f64 {
        self.maxx - self.minx
    }

    pub fn height(&self) -> f64 {
        self.maxy - self.miny
    }

    /// True when the two boxes share a region of non-zero area
    pub fn intersects(&self, other: &Bounds) -> bool {
        self.minx < other.maxx
            && other.minx < self.maxx
            && self.miny < other.maxy
            && other.miny < self.maxy
    }
}

/// Region of analysis: projected box plus the output pixel grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaOfInterest {
    /// Center point (longitude, latitude) in degrees
    pub center: (f64, f64),
    pub bounds: Bounds,
    /// EPSG code of `bounds`
    pub epsg: u32,
    pub width: usize,
    pub height: usize,
}

impl AreaOfInterest {
    /// A grid with no pixels cannot be extracted
    pub fn is_degenerate(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Linear stretch domain for one band
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StretchParameters {
    pub lower: f64,
    pub upper: f64,
}

/// Composited RGB frame with its overlay label
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub label: String,
}

/// Error types for GIF generation
#[derive(Debug, thiserror::Error)]
pub enum CbersError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unrecognized scene identifier: {0}")]
    SceneIdentifier(String),

    #[error("Service returned {status} code, msg: {body}")]
    Catalog { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Scene listing failed: {0}")]
    Listing(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Raster error: {0}")]
    Raster(String),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Font error: {0}")]
    Font(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for GIF generation
pub type CbersResult<T> = Result<T, CbersError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_parsing() {
        assert_eq!("mux".parse::<Sensor>().unwrap(), Sensor::MUX);
        assert_eq!("PAN10M".parse::<Sensor>().unwrap(), Sensor::PAN10M);
        assert!("WFI".parse::<Sensor>().is_err());
    }

    #[test]
    fn test_level_filter_parsing() {
        assert_eq!("all".parse::<LevelFilter>().unwrap(), LevelFilter::All);
        assert_eq!("L4".parse::<LevelFilter>().unwrap().as_level(), Some("L4"));
        assert!("L3".parse::<LevelFilter>().is_err());
    }

    #[test]
    fn test_bounds_intersection() {
        let a = Bounds { minx: 0.0, miny: 0.0, maxx: 10.0, maxy: 10.0 };
        let b = Bounds { minx: 5.0, miny: 5.0, maxx: 15.0, maxy: 15.0 };
        let c = Bounds { minx: 10.0, miny: 0.0, maxx: 20.0, maxy: 10.0 };
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c)); // touching edges only
    }
}
