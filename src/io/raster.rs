use crate::types::{BandMatrix, Bounds, CbersError, CbersResult};
use gdal::spatial_ref::{CoordTransform, SpatialRef};
use gdal::{Dataset, DriverManager};

/// Windowed raster access: open a single-band raster, warp it to a
/// projection and read the pixels covering `bounds` on a fixed grid.
pub trait RasterReader {
    fn read_window(
        &self,
        locator: &str,
        epsg: u32,
        bounds: &Bounds,
        width: usize,
        height: usize,
    ) -> CbersResult<BandMatrix>;
}

/// GDAL-backed reader; locators are anything GDAL can open
/// (`/vsis3/...`, `/vsicurl/...`, local paths).
pub struct GdalRasterReader;

impl GdalRasterReader {
    pub fn new(requester_pays: bool) -> CbersResult<Self> {
        if requester_pays {
            gdal::config::set_config_option("AWS_REQUEST_PAYER", "requester")?;
        }
        Ok(Self)
    }

    /// Source extent reprojected to `epsg`, from the four raster corners
    fn footprint(dataset: &Dataset, epsg: u32) -> CbersResult<Bounds> {
        let gt = dataset.geo_transform()?;
        let (width, height) = dataset.raster_size();
        let (w, h) = (width as f64, height as f64);

        let corners = [(0.0, 0.0), (w, 0.0), (0.0, h), (w, h)];
        let mut xs: Vec<f64> = corners.iter().map(|&(px, py)| gt[0] + px * gt[1] + py * gt[2]).collect();
        let mut ys: Vec<f64> = corners.iter().map(|&(px, py)| gt[3] + px * gt[4] + py * gt[5]).collect();
        let mut zs = vec![0.0; corners.len()];

        let source_srs = dataset.spatial_ref()?;
        let target_srs = SpatialRef::from_epsg(epsg)?;
        let transform = CoordTransform::new(&source_srs, &target_srs)?;
        transform.transform_coords(&mut xs, &mut ys, &mut zs)?;

        Ok(Bounds {
            minx: xs.iter().cloned().fold(f64::INFINITY, f64::min),
            miny: ys.iter().cloned().fold(f64::INFINITY, f64::min),
            maxx: xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            maxy: ys.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        })
    }
}

impl RasterReader for GdalRasterReader {
    fn read_window(
        &self,
        locator: &str,
        epsg: u32,
        bounds: &Bounds,
        width: usize,
        height: usize,
    ) -> CbersResult<BandMatrix> {
        log::debug!("Opening {}", locator);
        let source = Dataset::open(locator)
            .map_err(|e| CbersError::Raster(format!("Failed to open {}: {}", locator, e)))?;

        let footprint = Self::footprint(&source, epsg)?;
        if !footprint.intersects(bounds) {
            return Err(CbersError::Raster(format!(
                "AOI {:?} does not intersect {} (footprint {:?})",
                bounds, locator, footprint
            )));
        }

        // In-memory target grid covering exactly the AOI
        let driver = DriverManager::get_driver_by_name("MEM")?;
        let mut target = driver.create_with_band_type::<u8, _>(
            "",
            width as isize,
            height as isize,
            1,
        )?;
        target.set_geo_transform(&[
            bounds.minx,
            bounds.width() / width as f64,
            0.0,
            bounds.maxy,
            0.0,
            -bounds.height() / height as f64,
        ])?;
        target.set_spatial_ref(&SpatialRef::from_epsg(epsg)?)?;

        // Bilinear warp of the source onto the target grid
        gdal::raster::reproject(&source, &target)?;

        let band = target.rasterband(1)?;
        let buffer = band.read_as::<u8>((0, 0), (width, height), (width, height), None)?;

        BandMatrix::from_shape_vec((height, width), buffer.data)
            .map_err(|e| CbersError::Raster(format!("Failed to reshape window of {}: {}", locator, e)))
    }
}
