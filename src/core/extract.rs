use crate::io::raster::RasterReader;
use crate::types::{BandMatrix, Bounds, CbersError, CbersResult, SceneDescriptor};

/// Remote file holding one band of a scene
pub fn band_locator(source_key: &str, scene_id: &str, band: &str) -> String {
    format!(
        "{}/{}_BAND{}.tif",
        source_key.trim_end_matches('/'),
        scene_id,
        band
    )
}

/// Pulls one band of one scene onto the AOI grid
pub struct BandExtractor<R: RasterReader> {
    reader: R,
    epsg: u32,
}

impl<R: RasterReader> BandExtractor<R> {
    pub fn new(reader: R, epsg: u32) -> Self {
        Self { reader, epsg }
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    /// Extract `band` of `scene` resampled to exactly `height` x `width`.
    ///
    /// A 0-sized grid is rejected before any raster access.
    pub fn extract(
        &self,
        source_key: &str,
        band: &str,
        scene: &SceneDescriptor,
        aoi_bounds: &Bounds,
        width: usize,
        height: usize,
    ) -> CbersResult<BandMatrix> {
        if width == 0 || height == 0 {
            return Err(CbersError::InvalidInput(format!(
                "Degenerate output grid {}x{}; a positive buffer is required",
                width, height
            )));
        }
        if band.is_empty() || !band.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CbersError::InvalidInput(format!("Invalid band name: '{}'", band)));
        }

        let locator = band_locator(source_key, &scene.scene_id, band);
        log::info!("Extracting band {} from {}", band, locator);

        let matrix = self
            .reader
            .read_window(&locator, self.epsg, aoi_bounds, width, height)?;

        if matrix.dim() != (height, width) {
            return Err(CbersError::Raster(format!(
                "{} returned a {:?} window, expected {:?}",
                locator,
                matrix.dim(),
                (height, width)
            )));
        }
        Ok(matrix)
    }
}
