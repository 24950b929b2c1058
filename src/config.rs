//! Process-wide settings handed to the pipeline at construction time

use crate::core::composite::DEFAULT_FONT_SIZE;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Web Mercator, the projection every AOI and extracted window is expressed in
pub const TARGET_EPSG: u32 = 3857;

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory holding cached band matrices
    pub cache_dir: PathBuf,
    /// When false the cache is neither read nor written
    pub cache_enabled: bool,
    /// Prefix joined with a scene's source key to locate its band files
    pub raster_prefix: String,
    /// Ask GDAL to send the requester-pays header for S3 reads and listings
    pub requester_pays: bool,
    /// STAC search endpoint
    pub stac_endpoint: String,
    /// Maximum number of items requested from STAC
    pub stac_limit: usize,
    /// HTTP timeout for catalog requests (seconds)
    pub http_timeout_secs: u64,
    /// Projection of the AOI and the extracted windows
    pub target_epsg: u32,
    /// Where intermediate BMP frames are written when requested
    pub intermediate_dir: PathBuf,
    /// Label font file; the bundled DejaVu Sans Mono when unset
    pub font_path: Option<PathBuf>,
    /// Label text height (pixels)
    pub font_size: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            cache_enabled: true,
            raster_prefix: "/vsis3/cbers-pds".to_string(),
            requester_pays: true,
            stac_endpoint: "https://stac.amskepler.com/v100/search".to_string(),
            stac_limit: 300,
            http_timeout_secs: 60,
            target_epsg: TARGET_EPSG,
            intermediate_dir: PathBuf::from("."),
            font_path: None,
            font_size: DEFAULT_FONT_SIZE,
        }
    }
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("cbersgif"))
        .unwrap_or_else(|| PathBuf::from("./.cbersgif_cache"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert!(config.cache_enabled);
        assert_eq!(config.target_epsg, 3857);
        assert!(config.cache_dir.ends_with("cbersgif") || config.cache_dir.ends_with(".cbersgif_cache"));
    }
}
